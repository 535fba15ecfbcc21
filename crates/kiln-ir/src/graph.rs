//! Instruction graph
//!
//! A [`Graph`] owns every block and instruction of one function. Blocks hold
//! ordered instruction ids; instructions are stored once in an arena, so a
//! lowering pass can rewrite an instruction in place and every reference to
//! its id keeps pointing at the (new) result.

use std::fmt;

use smallvec::SmallVec;

use crate::constant::Const;
use crate::error::{IrError, IrResult};
use crate::op::{Op, PrimOp};

/// Instruction id, unique within its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InstrId(pub u32);

impl InstrId {
    /// Get index value
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Block id, unique within its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Get index value
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// One instruction input
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Result of another instruction
    Value(InstrId),
    /// Embedded constant
    Const(Const),
}

impl Input {
    /// Referenced instruction, if any
    pub fn as_value(&self) -> Option<InstrId> {
        match self {
            Input::Value(id) => Some(*id),
            Input::Const(_) => None,
        }
    }

    /// Embedded constant, if any
    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Input::Const(c) => Some(c),
            Input::Value(_) => None,
        }
    }
}

impl From<InstrId> for Input {
    fn from(id: InstrId) -> Self {
        Input::Value(id)
    }
}

impl From<Const> for Input {
    fn from(c: Const) -> Self {
        Input::Const(c)
    }
}

/// Instruction inputs
pub type Inputs = SmallVec<[Input; 3]>;

/// An instruction
#[derive(Debug, Clone)]
pub struct Instr {
    /// Stable id
    pub id: InstrId,
    /// Operation kind
    pub op: Op,
    /// Ordered inputs
    pub inputs: Inputs,
    /// Owning block
    pub block: BlockId,
}

impl Instr {
    /// Input `index`
    pub fn input(&self, index: usize) -> IrResult<&Input> {
        self.inputs.get(index).ok_or(IrError::MissingInput {
            instr: self.id,
            index,
        })
    }

    /// Input `index` as an instruction reference
    pub fn value_input(&self, index: usize) -> IrResult<InstrId> {
        self.input(index)?.as_value().ok_or(IrError::MissingInput {
            instr: self.id,
            index,
        })
    }

    /// Input `index` as a constant
    pub fn const_input(&self, index: usize) -> IrResult<&Const> {
        self.input(index)?.as_const().ok_or(IrError::MissingInput {
            instr: self.id,
            index,
        })
    }

    /// Input `index` as a raw integer constant
    pub fn raw_input(&self, index: usize) -> IrResult<i64> {
        self.const_input(index)?
            .as_raw()
            .ok_or(IrError::MissingInput {
                instr: self.id,
                index,
            })
    }
}

/// A basic block
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Instructions in order
    pub instrs: Vec<InstrId>,
    /// Successors; with two, the first is taken when the pending condition holds
    pub successors: SmallVec<[BlockId; 2]>,
}

/// One function's instruction graph
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    params: usize,
    instrs: Vec<Instr>,
    blocks: Vec<Block>,
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: 0,
            instrs: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Function name, used for symbols and traces
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter count
    pub fn params(&self) -> usize {
        self.params
    }

    /// Set the declared parameter count
    pub fn set_params(&mut self, params: usize) {
        self.params = params;
    }

    /// Add an empty block
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    /// All blocks, entry first
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of instructions ever created
    pub fn instr_count(&self) -> usize {
        self.instrs.len()
    }

    /// A block
    pub fn block(&self, id: BlockId) -> IrResult<&Block> {
        self.blocks.get(id.index()).ok_or(IrError::UnknownBlock(id))
    }

    fn block_mut(&mut self, id: BlockId) -> IrResult<&mut Block> {
        self.blocks.get_mut(id.index()).ok_or(IrError::UnknownBlock(id))
    }

    /// An instruction
    pub fn instr(&self, id: InstrId) -> IrResult<&Instr> {
        self.instrs.get(id.index()).ok_or(IrError::UnknownInstr(id))
    }

    /// An instruction, mutably
    pub fn instr_mut(&mut self, id: InstrId) -> IrResult<&mut Instr> {
        self.instrs.get_mut(id.index()).ok_or(IrError::UnknownInstr(id))
    }

    /// Snapshot of a block's instruction list
    pub fn block_instrs(&self, id: BlockId) -> IrResult<Vec<InstrId>> {
        Ok(self.block(id)?.instrs.clone())
    }

    /// Set the successors of a block
    pub fn set_successors(&mut self, id: BlockId, successors: &[BlockId]) -> IrResult<()> {
        self.block_mut(id)?.successors = SmallVec::from_slice(successors);
        Ok(())
    }

    fn new_instr(&mut self, block: BlockId, op: Op, inputs: Inputs) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(Instr {
            id,
            op,
            inputs,
            block,
        });
        id
    }

    /// Append an instruction to `block`
    pub fn append(
        &mut self,
        block: BlockId,
        op: impl Into<Op>,
        inputs: impl IntoIterator<Item = Input>,
    ) -> IrResult<InstrId> {
        self.block(block)?;
        let id = self.new_instr(block, op.into(), inputs.into_iter().collect());
        self.block_mut(block)?.instrs.push(id);
        Ok(id)
    }

    /// Insert an instruction immediately before `anchor`, in the same block
    pub fn insert_before(
        &mut self,
        anchor: InstrId,
        op: impl Into<Op>,
        inputs: impl IntoIterator<Item = Input>,
    ) -> IrResult<InstrId> {
        let block = self.instr(anchor)?.block;
        let position = self
            .block(block)?
            .instrs
            .iter()
            .position(|i| *i == anchor)
            .ok_or(IrError::Detached(anchor))?;
        let id = self.new_instr(block, op.into(), inputs.into_iter().collect());
        self.block_mut(block)?.instrs.insert(position, id);
        Ok(id)
    }

    /// Rewrite `id` in place, keeping its identity as a result
    pub fn replace(
        &mut self,
        id: InstrId,
        op: impl Into<Op>,
        inputs: impl IntoIterator<Item = Input>,
    ) -> IrResult<()> {
        let instr = self.instr_mut(id)?;
        instr.op = op.into();
        instr.inputs = inputs.into_iter().collect();
        Ok(())
    }

    /// Phi instructions at the head of `block`, in order
    pub fn phis(&self, block: BlockId) -> IrResult<Vec<InstrId>> {
        let mut phis = Vec::new();
        for id in &self.block(block)?.instrs {
            if self.instr(*id)?.op == Op::Prim(PrimOp::Phi) {
                phis.push(*id);
            }
        }
        Ok(phis)
    }

    /// First instruction that is still a high-level op
    pub fn first_unlowered(&self) -> Option<&Instr> {
        self.blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter_map(|id| self.instrs.get(id.index()))
            .find(|instr| matches!(instr.op, Op::High(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::HighOp;

    #[test]
    fn insert_before_keeps_order() {
        let mut g = Graph::new("t");
        let b = g.add_block();
        let a = g
            .append(b, PrimOp::Literal, [Input::Const(Const::Smi(1))])
            .expect("append should succeed");
        let r = g
            .append(b, PrimOp::Ret, [Input::Value(a)])
            .expect("append should succeed");
        let mid = g
            .insert_before(r, PrimOp::Brk, [])
            .expect("insert should succeed");
        assert_eq!(g.block_instrs(b).expect("block exists"), vec![a, mid, r]);
    }

    #[test]
    fn replace_preserves_identity() {
        let mut g = Graph::new("t");
        let b = g.add_block();
        let obj = g
            .append(b, HighOp::Object, [])
            .expect("append should succeed");
        let ret = g
            .append(b, PrimOp::Ret, [Input::Value(obj)])
            .expect("append should succeed");
        g.replace(
            obj,
            PrimOp::CallStub,
            [
                Input::Const(Const::Stub("allocObject".into())),
                Input::Const(Const::Raw(0)),
            ],
        )
        .expect("replace should succeed");
        assert_eq!(
            g.instr(ret).expect("exists").value_input(0).expect("input"),
            obj
        );
        assert!(g.first_unlowered().is_none());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let g = Graph::new("t");
        assert!(matches!(g.instr(InstrId(3)), Err(IrError::UnknownInstr(_))));
        assert!(matches!(g.block(BlockId(0)), Err(IrError::UnknownBlock(_))));
    }
}
