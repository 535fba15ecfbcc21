//! Function, object, array and `new` allocation

use kiln_ir::{BlockId, Const, Graph, HighOp, Input, InstrId, IrResult, Op, PrimOp};

use super::{call_stub, push};
use crate::error::{JitError, JitResult};

/// `fn [index]` -> `code; pushArg; callStub allocFn 1`
pub(super) fn lower_functions(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    for id in graph.block_instrs(block)? {
        let instr = graph.instr(id)?;
        if instr.op != Op::High(HighOp::Fn) {
            continue;
        }
        let index = instr.input(0)?.clone();
        let code = graph.insert_before(id, PrimOp::Code, [index])?;
        push(graph, id, Input::Value(code))?;
        call_stub(graph, id, "allocFn", 1)?;
    }
    Ok(())
}

pub(super) fn lower_objects(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    for id in graph.block_instrs(block)? {
        let instr = graph.instr(id)?;
        match instr.op {
            Op::High(HighOp::Object) => call_stub(graph, id, "allocObject", 0)?,

            Op::High(HighOp::Array) => {
                let count = instr.raw_input(0)?;
                let len = graph.insert_before(id, PrimOp::Literal, [Input::Const(Const::Smi(count))])?;
                push(graph, id, Input::Value(len))?;
                call_stub(graph, id, "allocArray", 1)?;
                lower_element_stores(graph, block, id, count)?;
            }

            // The argument pushes already precede the instruction; the stub
            // receives `vargc, fn, args...`.
            Op::High(HighOp::New) => {
                let callee = instr.input(0)?.clone();
                let argc = usize::try_from(instr.raw_input(1)?)
                    .map_err(|_| JitError::internal("new", "negative argument count"))?;
                let count = graph.insert_before(
                    id,
                    PrimOp::Literal,
                    [Input::Const(Const::Smi(argc as i64))],
                )?;
                push(graph, id, callee)?;
                push(graph, id, Input::Value(count))?;
                call_stub(graph, id, "new", argc + 2)?;
            }

            _ => {}
        }
    }
    Ok(())
}

/// Stores of literal elements into a fresh array write their slot directly.
///
/// Dense slots are indices, so a constant index below the literal's length
/// needs no inline cache. The scan stops at the first other use of the
/// array, after which its storage may have changed.
fn lower_element_stores(graph: &mut Graph, block: BlockId, array: InstrId, len: i64) -> JitResult<()> {
    let instrs = graph.block_instrs(block)?;
    let Some(start) = instrs.iter().position(|id| *id == array) else {
        return Ok(());
    };

    for &id in &instrs[start + 1..] {
        let instr = graph.instr(id)?;
        if !instr.inputs.iter().any(|input| input.as_value() == Some(array)) {
            continue;
        }
        if instr.op != Op::High(HighOp::StoreProperty) || instr.input(0)?.as_value() != Some(array) {
            break;
        }
        let key = instr.input(1)?.clone();
        let value = instr.input(2)?.clone();
        let Some(index) = smi_literal(graph, &key)?.filter(|i| (0..len).contains(i)) else {
            break;
        };

        let slot = graph.insert_before(id, PrimOp::Literal, [Input::Const(Const::Smi(index))])?;
        push(graph, id, value)?;
        push(graph, id, Input::Value(slot))?;
        push(graph, id, key)?;
        push(graph, id, Input::Value(array))?;
        call_stub(graph, id, "storePropertySlot", 4)?;
    }
    Ok(())
}

fn smi_literal(graph: &Graph, input: &Input) -> IrResult<Option<i64>> {
    let constant = match input {
        Input::Const(c) => c,
        Input::Value(id) => {
            let instr = graph.instr(*id)?;
            if instr.op != Op::Prim(PrimOp::Literal) {
                return Ok(None);
            }
            instr.const_input(0)?
        }
    };
    Ok(match constant {
        Const::Smi(n) => Some(*n),
        _ => None,
    })
}
