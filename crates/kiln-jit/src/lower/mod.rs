//! Platform lowering
//!
//! Rewrites the high-level ops of a graph into stub calls and primitive
//! ops. Passes run block by block in a fixed order; each one relies on the
//! shapes the previous passes produced. A rewritten instruction keeps its
//! id, so every use elsewhere in the graph still refers to its result.

mod calls;
mod globals;
mod objects;
mod operators;
mod properties;

use kiln_ir::{BlockId, Const, Graph, Input, InstrId, IrResult, PrimOp};
use tracing::trace;

use crate::error::{JitError, JitResult};

type Pass = fn(&mut Graph, BlockId) -> JitResult<()>;

const PASSES: [(&str, Pass); 7] = [
    ("globals", globals::lower),
    ("functions", objects::lower_functions),
    ("objects", objects::lower_objects),
    ("properties", properties::lower),
    ("operators", operators::lower),
    ("branches", operators::lower_branches),
    ("calls", calls::lower),
];

/// Lower every block of `graph`
pub(crate) fn lower(graph: &mut Graph) -> JitResult<()> {
    let blocks: Vec<BlockId> = graph.blocks().map(|(id, _)| id).collect();
    for (name, pass) in PASSES {
        for block in &blocks {
            pass(graph, *block)?;
        }
        trace!(pass = name, function = graph.name(), instrs = graph.instr_count(), "lowering pass done");
    }

    if let Some(instr) = graph.first_unlowered() {
        return Err(JitError::internal(
            instr.op.to_string(),
            format!("{} survived lowering", instr.id),
        ));
    }
    Ok(())
}

// ==================== Helpers ====================

fn raw(n: usize) -> Input {
    Input::Const(Const::Raw(n as i64))
}

fn stub(name: impl Into<String>) -> Input {
    Input::Const(Const::Stub(name.into()))
}

/// Insert `pushArg value` before `anchor`
fn push(graph: &mut Graph, anchor: InstrId, value: Input) -> IrResult<InstrId> {
    graph.insert_before(anchor, PrimOp::PushArg, [value])
}

/// Turn `id` into a call of stub `name` taking `argc` pushed arguments
fn call_stub(graph: &mut Graph, id: InstrId, name: impl Into<String>, argc: usize) -> IrResult<()> {
    graph.replace(id, PrimOp::CallStub, [stub(name), raw(argc)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::{Op, PrimOp};

    fn lowered(source: &str) -> Vec<Graph> {
        let mut graphs = kiln_frontend::construct(source).expect("construct should succeed");
        for graph in &mut graphs {
            lower(graph).expect("lowering should succeed");
        }
        graphs
    }

    fn ops(graph: &Graph) -> Vec<Op> {
        graph
            .blocks()
            .flat_map(|(_, b)| b.instrs.clone())
            .map(|id| graph.instr(id).expect("instruction exists").op)
            .collect()
    }

    fn stubs(graph: &Graph) -> Vec<String> {
        graph
            .blocks()
            .flat_map(|(_, b)| b.instrs.clone())
            .filter_map(|id| {
                let instr = graph.instr(id).expect("instruction exists");
                match (instr.op, instr.inputs.first()) {
                    (Op::Prim(PrimOp::CallStub), Some(Input::Const(Const::Stub(name)))) => {
                        Some(name.clone())
                    }
                    (Op::Prim(PrimOp::CallStub), Some(Input::Const(Const::Ic(kind)))) => {
                        Some(kind.name().to_owned())
                    }
                    _ => None,
                }
            })
            .collect()
    }

    #[test]
    fn lowering_removes_every_high_op() {
        let graphs = lowered(
            "function f(a) { return a ? {x: a} : [1, 2]; } var o = new f(1); o.x = -o.x; delete o.y; f(2) < 3",
        );
        for graph in &graphs {
            assert!(graph.first_unlowered().is_none());
        }
    }

    #[test]
    fn global_read_becomes_fixed_ic_and_slot_load() {
        let graphs = lowered("ohai");
        assert_eq!(
            stubs(&graphs[0]),
            vec!["getFixedPropertySlot".to_owned(), "loadPropertySlot".to_owned()]
        );
        assert!(ops(&graphs[0]).contains(&Op::Prim(PrimOp::Global)));
    }

    #[test]
    fn computed_keys_use_the_normal_ic() {
        let graphs = lowered("function f(o, k) { return o[k]; }");
        assert!(stubs(&graphs[1]).contains(&"getPropertySlot".to_owned()));
    }

    #[test]
    fn array_literal_elements_skip_the_ic() {
        let graphs = lowered("function f() { return [1, , 3]; }");
        let names = stubs(&graphs[1]);
        assert_eq!(names.iter().filter(|n| *n == "storePropertySlot").count(), 2);
        assert!(!names.iter().any(|n| n.ends_with("PropertySlot") && n.starts_with("get")));
    }

    #[test]
    fn array_accesses_after_the_literal_use_the_ic() {
        let graphs = lowered("function f() { var a = [1, 2]; a[0] = a[1]; return a; }");
        let names = stubs(&graphs[1]);
        assert_eq!(names.iter().filter(|n| *n == "getFixedPropertySlot").count(), 2);
        assert_eq!(names.iter().filter(|n| *n == "storePropertySlot").count(), 3);
    }

    #[test]
    fn arithmetic_and_branches_call_stubs() {
        let graphs = lowered("function f(a, b) { if (a) { return -a; } return a * b; }");
        let names = stubs(&graphs[1]);
        assert!(names.contains(&"coerce/boolean".to_owned()));
        assert!(names.contains(&"unary/-".to_owned()));
        assert!(names.contains(&"binary/*".to_owned()));
        assert!(ops(&graphs[1]).contains(&Op::Prim(PrimOp::IsTrue)));
    }

    #[test]
    fn every_call_gets_an_aligned_area() {
        let graphs = lowered("f(1, 2, 3)");
        let graph = &graphs[0];
        let ops = ops(graph);

        let mut areas = 0usize;
        let mut calls = 0usize;
        for op in &ops {
            match op {
                Op::Prim(PrimOp::AlignStack) => areas += 1,
                Op::Prim(PrimOp::Call | PrimOp::CallStub) => calls += 1,
                _ => {}
            }
        }
        assert_eq!(areas, calls);
        assert!(stubs(graph).contains(&"checkFunction".to_owned()));
    }

    #[test]
    fn call_uses_checked_callee() {
        let graphs = lowered("f()");
        let graph = &graphs[0];
        let call = graph
            .blocks()
            .flat_map(|(_, b)| b.instrs.clone())
            .map(|id| graph.instr(id).expect("instruction exists"))
            .find(|i| i.op == Op::Prim(PrimOp::Call))
            .expect("call present");
        let callee = graph
            .instr(call.value_input(0).expect("callee"))
            .expect("callee exists");
        assert_eq!(callee.op, Op::Prim(PrimOp::CallStub));
        assert_eq!(
            callee.const_input(0).expect("target"),
            &Const::Stub("checkFunction".into())
        );
    }
}
