//! Call prologues
//!
//! Walks a block backwards. A call opens an "expecting N pushes" state;
//! every `pushArg` counts one down, and when the count reaches zero the
//! prologue goes in front of that push, which is the first one of the
//! sequence. Calls to user functions also get their callee checked.

use kiln_ir::{BlockId, Graph, Input, InstrId, Op, PrimOp};

use super::{push, raw, stub};
use crate::error::{JitError, JitResult};

struct Pending {
    call: InstrId,
    remaining: usize,
}

pub(super) fn lower(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    let mut pending: Vec<Pending> = Vec::new();

    for id in graph.block_instrs(block)?.into_iter().rev() {
        let instr = graph.instr(id)?;
        match instr.op {
            Op::Prim(PrimOp::Call) | Op::Prim(PrimOp::CallStub) => {
                let index = if instr.op == Op::Prim(PrimOp::Call) { 2 } else { 1 };
                let argc = usize::try_from(instr.raw_input(index)?)
                    .map_err(|_| JitError::internal(instr.op.to_string(), "negative argument count"))?;
                if argc == 0 {
                    prologue(graph, id, id)?;
                } else {
                    pending.push(Pending {
                        call: id,
                        remaining: argc,
                    });
                }
            }

            Op::Prim(PrimOp::PushArg) => {
                let top = pending.last_mut().ok_or_else(|| {
                    JitError::internal("pushArg", format!("{id} is not followed by a call"))
                })?;
                top.remaining -= 1;
                if top.remaining == 0 {
                    let call = top.call;
                    pending.pop();
                    prologue(graph, call, id)?;
                }
            }

            _ => {}
        }
    }

    match pending.last() {
        Some(p) => Err(JitError::internal(
            "call",
            format!("{} is missing {} argument pushes", p.call, p.remaining),
        )),
        None => Ok(()),
    }
}

/// Insert the prologue of `call` before `anchor`
fn prologue(graph: &mut Graph, call: InstrId, anchor: InstrId) -> JitResult<()> {
    let instr = graph.instr(call)?.clone();
    match instr.op {
        Op::Prim(PrimOp::Call) => {
            let argc = instr.raw_input(2)? as usize;
            let callee = instr.input(0)?.clone();
            graph.insert_before(anchor, PrimOp::AlignStack, [raw(1)])?;
            push(graph, anchor, callee)?;
            let checked = graph.insert_before(
                anchor,
                PrimOp::CallStub,
                [stub("checkFunction"), raw(1)],
            )?;
            graph.insert_before(anchor, PrimOp::AlignStack, [raw(argc)])?;

            let mut inputs = instr.inputs.clone();
            inputs[0] = Input::Value(checked);
            graph.replace(call, PrimOp::Call, inputs)?;
        }
        _ => {
            let argc = instr.raw_input(1)? as usize;
            graph.insert_before(anchor, PrimOp::AlignStack, [raw(argc)])?;
        }
    }
    Ok(())
}
