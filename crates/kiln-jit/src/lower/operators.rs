//! Operators and branch conditions become stub calls

use kiln_ir::{BlockId, Const, Graph, HighOp, Input, Op, PrimOp};

use super::{call_stub, push};
use crate::error::{JitError, JitResult};

/// `unary op v` -> `unary/<op>`, `binary op l r` -> `binary/<op>`
pub(super) fn lower(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    for id in graph.block_instrs(block)? {
        let instr = graph.instr(id)?;
        match instr.op {
            Op::High(HighOp::Unary) => {
                let Const::UnOp(op) = instr.const_input(0)? else {
                    return Err(JitError::internal("unary", "operator input is not a unary op"));
                };
                let name = format!("unary/{}", op.symbol());
                let operand = instr.input(1)?.clone();
                push(graph, id, operand)?;
                call_stub(graph, id, name, 1)?;
            }

            Op::High(HighOp::Binary) => {
                let Const::BinOp(op) = instr.const_input(0)? else {
                    return Err(JitError::internal("binary", "operator input is not a binary op"));
                };
                let name = format!("binary/{}", op.symbol());
                let left = instr.input(1)?.clone();
                let right = instr.input(2)?.clone();
                push(graph, id, right)?;
                push(graph, id, left)?;
                call_stub(graph, id, name, 2)?;
            }

            _ => {}
        }
    }
    Ok(())
}

/// `branch v` -> `pushArg v; b = callStub coerce/boolean 1; isTrue b`
pub(super) fn lower_branches(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    for id in graph.block_instrs(block)? {
        let instr = graph.instr(id)?;
        if instr.op != Op::High(HighOp::Branch) {
            continue;
        }
        let value = instr.input(0)?.clone();
        push(graph, id, value)?;
        let boolean = graph.insert_before(
            id,
            PrimOp::CallStub,
            [
                Input::Const(Const::Stub("coerce/boolean".into())),
                Input::Const(Const::Raw(1)),
            ],
        )?;
        graph.replace(id, PrimOp::IsTrue, [Input::Value(boolean)])?;
    }
    Ok(())
}
