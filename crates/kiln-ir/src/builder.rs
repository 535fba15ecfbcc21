//! Programmatic graph construction
//!
//! Used by the front end for user functions and by the JIT for stub and
//! inline cache bodies.

use kiln_heap::MapKind;

use crate::constant::{Cond, Const};
use crate::error::IrResult;
use crate::graph::{BlockId, Graph, Input, InstrId};
use crate::op::{Op, PrimOp};

/// Appends instructions to the current block of a graph
#[derive(Debug)]
pub struct Builder {
    graph: Graph,
    current: BlockId,
}

fn raw(n: usize) -> Input {
    Input::Const(Const::Raw(n as i64))
}

impl Builder {
    /// Start a graph with an empty entry block
    pub fn new(name: impl Into<String>) -> Self {
        let mut graph = Graph::new(name);
        let current = graph.add_block();
        Self { graph, current }
    }

    /// The graph built so far
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The graph built so far, mutably
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Finish building
    pub fn finish(self) -> Graph {
        self.graph
    }

    /// Block receiving new instructions
    pub fn current(&self) -> BlockId {
        self.current
    }

    /// Create a block without switching to it
    pub fn new_block(&mut self) -> BlockId {
        self.graph.add_block()
    }

    /// Continue in `block`
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Append `op` to the current block
    pub fn emit(
        &mut self,
        op: impl Into<Op>,
        inputs: impl IntoIterator<Item = Input>,
    ) -> IrResult<InstrId> {
        self.graph.append(self.current, op, inputs)
    }

    // ==================== Control flow ====================

    /// End the current block with an unconditional edge to `target`
    pub fn jump(&mut self, target: BlockId) -> IrResult<()> {
        self.graph.set_successors(self.current, &[target])
    }

    /// End the current block with a two-way edge on the pending condition
    pub fn branch(&mut self, if_true: BlockId, if_false: BlockId) -> IrResult<()> {
        self.graph.set_successors(self.current, &[if_true, if_false])
    }

    /// Return `value`
    pub fn ret(&mut self, value: impl Into<Input>) -> IrResult<InstrId> {
        self.emit(PrimOp::Ret, [value.into()])
    }

    /// Add a phi at the head of `block`
    pub fn phi(&mut self, block: BlockId) -> IrResult<InstrId> {
        self.graph.append(block, PrimOp::Phi, [])
    }

    /// Feed `value` into `phi` along the current block's outgoing edge
    pub fn to_phi(&mut self, phi: InstrId, value: impl Into<Input>) -> IrResult<InstrId> {
        self.emit(PrimOp::ToPhi, [Input::Value(phi), value.into()])
    }

    // ==================== Values ====================

    /// Materialise a constant
    pub fn literal(&mut self, value: Const) -> IrResult<InstrId> {
        self.emit(PrimOp::Literal, [Input::Const(value)])
    }

    /// Read the tagged word at `offset` of `object`
    pub fn read(&mut self, object: impl Into<Input>, offset: usize) -> IrResult<InstrId> {
        self.emit(PrimOp::ReadTagged, [object.into(), raw(offset)])
    }

    /// Write `value` at `offset` of `object`
    pub fn write(
        &mut self,
        object: impl Into<Input>,
        offset: usize,
        value: impl Into<Input>,
    ) -> IrResult<InstrId> {
        self.emit(PrimOp::WriteTagged, [object.into(), raw(offset), value.into()])
    }

    /// Unchecked stub argument `index`
    pub fn stub_arg(&mut self, index: usize) -> IrResult<InstrId> {
        self.emit(PrimOp::LoadStubArg, [raw(index)])
    }

    /// Unchecked IC argument `index`
    pub fn ic_arg(&mut self, index: usize) -> IrResult<InstrId> {
        self.emit(PrimOp::LoadIcArg, [raw(index)])
    }

    /// Checked argument `index` of a user function
    pub fn arg(&mut self, index: usize) -> IrResult<InstrId> {
        self.emit(PrimOp::LoadArg, [raw(index)])
    }

    // ==================== Conditions ====================

    /// Condition: `value` is a Smi
    pub fn is_smi(&mut self, value: impl Into<Input>) -> IrResult<InstrId> {
        self.emit(PrimOp::IsSmi, [value.into()])
    }

    /// Condition: `a cond b` on raw words or pointers
    pub fn pointer_compare(
        &mut self,
        a: impl Into<Input>,
        b: impl Into<Input>,
        cond: Cond,
    ) -> IrResult<InstrId> {
        self.emit(
            PrimOp::PointerCompare,
            [a.into(), b.into(), Input::Const(Const::Cond(cond))],
        )
    }

    /// Condition: `a cond b` on Smis
    pub fn smi_compare(
        &mut self,
        a: impl Into<Input>,
        b: impl Into<Input>,
        cond: Cond,
    ) -> IrResult<InstrId> {
        self.emit(
            PrimOp::SmiCompare,
            [a.into(), b.into(), Input::Const(Const::Cond(cond))],
        )
    }

    /// Condition: `value & mask != 0`
    pub fn smi_test(&mut self, value: impl Into<Input>, mask: i64) -> IrResult<InstrId> {
        self.emit(PrimOp::SmiTest, [value.into(), Input::Const(Const::Raw(mask))])
    }

    // ==================== Calls ====================

    /// Push `args` (first argument first) and call stub `name`
    pub fn call_stub(&mut self, name: &str, args: &[Input]) -> IrResult<InstrId> {
        self.push_args(args)?;
        self.emit(
            PrimOp::CallStub,
            [Input::Const(Const::Stub(name.to_owned())), raw(args.len())],
        )
    }

    /// Call runtime callback `name` through the trampoline stub
    pub fn call_runtime(&mut self, name: &str, args: &[Input]) -> IrResult<InstrId> {
        self.push_args(args)?;
        let id = self.literal(Const::Runtime(name.to_owned()))?;
        self.emit(PrimOp::PushArg, [Input::Value(id)])?;
        self.emit(
            PrimOp::CallStub,
            [Input::Const(Const::Stub("runtime".into())), raw(args.len() + 1)],
        )
    }

    /// Allocate `size` bytes tagged with the root map `kind`
    pub fn alloc_tagged(&mut self, kind: MapKind, size: impl Into<Input>) -> IrResult<InstrId> {
        self.call_stub(&format!("allocTagged/{}", kind.name()), &[size.into()])
    }

    fn push_args(&mut self, args: &[Input]) -> IrResult<()> {
        for arg in args.iter().rev() {
            self.emit(PrimOp::PushArg, [arg.clone()])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_stub_pushes_in_reverse() {
        let mut b = Builder::new("t");
        let a = b.literal(Const::Smi(1)).expect("literal");
        let c = b.literal(Const::Smi(2)).expect("literal");
        let call = b
            .call_stub("binary/+", &[Input::Value(a), Input::Value(c)])
            .expect("call");
        let g = b.finish();
        let instrs = g.block_instrs(BlockId(0)).expect("entry");
        let pushes: Vec<_> = instrs
            .iter()
            .map(|id| g.instr(*id).expect("instr"))
            .filter(|i| i.op == Op::Prim(PrimOp::PushArg))
            .map(|i| i.value_input(0).expect("value"))
            .collect();
        assert_eq!(pushes, vec![c, a]);
        assert_eq!(g.instr(call).expect("instr").raw_input(1).expect("argc"), 2);
    }

    #[test]
    fn runtime_calls_push_the_id_last() {
        let mut b = Builder::new("t");
        let v = b.literal(Const::Undefined).expect("literal");
        let call = b.call_runtime("log", &[Input::Value(v)]).expect("call");
        let g = b.finish();
        let call = g.instr(call).expect("instr");
        assert_eq!(call.raw_input(1).expect("argc"), 2);
        assert_eq!(
            call.const_input(0).expect("stub"),
            &Const::Stub("runtime".into())
        );
    }
}
