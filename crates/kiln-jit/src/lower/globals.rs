//! Global variables become properties of the global object

use kiln_ir::{BlockId, Graph, HighOp, Input, Op, PrimOp};

use crate::error::JitResult;

pub(super) fn lower(graph: &mut Graph, block: BlockId) -> JitResult<()> {
    for id in graph.block_instrs(block)? {
        let instr = graph.instr(id)?;
        let target = match instr.op {
            Op::High(HighOp::LoadGlobal) => HighOp::LoadProperty,
            Op::High(HighOp::StoreGlobal) => HighOp::StoreProperty,
            Op::High(HighOp::DeleteGlobal) => HighOp::DeleteProperty,
            _ => continue,
        };
        let name = instr.input(0)?.clone();
        let rest: Vec<Input> = instr.inputs.iter().skip(1).cloned().collect();

        let global = graph.insert_before(id, PrimOp::Global, [])?;
        let key = graph.insert_before(id, PrimOp::Literal, [name])?;
        let inputs = [Input::Value(global), Input::Value(key)]
            .into_iter()
            .chain(rest);
        graph.replace(id, target, inputs)?;
    }
    Ok(())
}
