//! Property access through inline caches
//!
//! A load or store first calls the site's IC, which answers with the
//! property's slot (or `undefined`), then a slot stub that reads or writes
//! the slot directly and falls back to the runtime when it cannot.

use kiln_ir::{BlockId, Const, Graph, HighOp, IcKind, Input, InstrId, Op, PrimOp};

use super::{call_stub, push, raw};
use crate::error::JitResult;

pub(super) fn lower(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    for id in graph.block_instrs(block)? {
        let instr = graph.instr(id)?;
        match instr.op {
            Op::High(HighOp::LoadProperty) => {
                let obj = instr.input(0)?.clone();
                let key = instr.input(1)?.clone();
                let slot = slot_lookup(graph, id, &obj, &key, false)?;
                push(graph, id, Input::Value(slot))?;
                push(graph, id, key)?;
                push(graph, id, obj)?;
                call_stub(graph, id, "loadPropertySlot", 3)?;
            }

            Op::High(HighOp::StoreProperty) => {
                let obj = instr.input(0)?.clone();
                let key = instr.input(1)?.clone();
                let value = instr.input(2)?.clone();
                let slot = slot_lookup(graph, id, &obj, &key, true)?;
                push(graph, id, value)?;
                push(graph, id, Input::Value(slot))?;
                push(graph, id, key)?;
                push(graph, id, obj)?;
                call_stub(graph, id, "storePropertySlot", 4)?;
            }

            Op::High(HighOp::DeleteProperty) => {
                let obj = instr.input(0)?.clone();
                let key = instr.input(1)?.clone();
                push(graph, id, key)?;
                push(graph, id, obj)?;
                call_stub(graph, id, "deletePropertySlot", 2)?;
            }

            _ => {}
        }
    }
    Ok(())
}

/// Emit the IC call before `anchor` and return its result
fn slot_lookup(
    graph: &mut Graph,
    anchor: InstrId,
    obj: &Input,
    key: &Input,
    update: bool,
) -> JitResult<InstrId> {
    let kind = if literal_key(graph, key)? {
        IcKind::Fixed
    } else {
        IcKind::Normal
    };
    let update = graph.insert_before(anchor, PrimOp::Literal, [Input::Const(Const::Bool(update))])?;
    push(graph, anchor, Input::Value(update))?;
    push(graph, anchor, key.clone())?;
    push(graph, anchor, obj.clone())?;
    Ok(graph.insert_before(
        anchor,
        PrimOp::CallStub,
        [Input::Const(Const::Ic(kind)), raw(3)],
    )?)
}

fn literal_key(graph: &Graph, key: &Input) -> JitResult<bool> {
    Ok(match key {
        Input::Const(_) => true,
        Input::Value(id) => graph.instr(*id)?.op == Op::Prim(PrimOp::Literal),
    })
}
