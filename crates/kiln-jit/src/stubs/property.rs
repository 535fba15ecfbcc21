//! Property access stubs
//!
//! Slots come from the site's inline cache: a Smi is a slot in the
//! receiver's field, anything else means the property was not found and
//! the runtime handles the access.

use kiln_heap::MapFlags;
use kiln_heap::layout::{self, base, field, key_store, map as map_layout, object};
use kiln_ir::{BlockId, Builder, Cond, Const, Graph, InstrId, IrResult, PrimOp};

use super::{StubLibrary, flag_mask, raw};
use crate::error::JitResult;

pub(super) fn declare(library: &mut StubLibrary) -> JitResult<()> {
    library.declare_stub("getPropertySlot_Miss", miss)?;
    library.declare_stub("loadPropertySlot", load)?;
    library.declare_stub("storePropertySlot", store)?;
    library.declare_stub("deletePropertySlot", delete)?;
    Ok(())
}

/// IC miss handler: `(obj, key, update) -> slot | undefined`.
///
/// Reached by a tail call from the IC, so `self` is the IC function.
fn miss() -> IrResult<Graph> {
    let mut b = Builder::new("getPropertySlot_Miss");
    let ic = b.emit(PrimOp::SelfFn, [])?;
    let obj = b.stub_arg(0)?;
    let key = b.stub_arg(1)?;
    let update = b.stub_arg(2)?;
    let slot = b.call_runtime(
        "getPropertySlot",
        &[ic.into(), obj.into(), key.into(), update.into()],
    )?;
    b.ret(slot)?;
    Ok(b.finish())
}

/// Blocks reached once the slot is known to be usable directly
struct SlotDispatch {
    field: InstrId,
    slot: InstrId,
    dense: BlockId,
    keyed: BlockId,
    slow: BlockId,
}

/// Check the slot and the receiver's map, and split on its storage kind
fn dispatch(b: &mut Builder, obj: InstrId, slot: InstrId) -> IrResult<SlotDispatch> {
    let slow = b.new_block();
    b.is_smi(slot)?;
    let found = b.new_block();
    b.branch(found, slow)?;

    // Accessor maps (functions) keep their own store semantics.
    b.switch_to(found);
    let map = b.read(obj, base::MAP)?;
    let flags = b.read(map, map_layout::FLAGS)?;
    b.smi_test(flags, flag_mask(MapFlags::ACCESSOR.bits()))?;
    let plain = b.new_block();
    b.branch(slow, plain)?;

    b.switch_to(plain);
    let storage = b.read(obj, object::FIELD)?;
    b.smi_test(flags, flag_mask(MapFlags::DENSE.bits()))?;
    let dense = b.new_block();
    let keyed = b.new_block();
    b.branch(dense, keyed)?;

    Ok(SlotDispatch {
        field: storage,
        slot,
        dense,
        keyed,
        slow,
    })
}

const KEYED_BASE: usize = field::ITEMS + key_store::VALUE;
const KEYED_SCALE: usize = key_store::ITEM_WORDS * layout::WORD;

/// `(obj, key, slot) -> value`
fn load() -> IrResult<Graph> {
    let mut b = Builder::new("loadPropertySlot");
    let obj = b.stub_arg(0)?;
    let key = b.stub_arg(1)?;
    let slot = b.stub_arg(2)?;
    let d = dispatch(&mut b, obj, slot)?;

    // Holes in dense storage may be found on the prototype chain.
    b.switch_to(d.dense);
    let value = b.emit(
        PrimOp::SmiReadTagged,
        [d.field.into(), d.slot.into(), raw(field::ITEMS), raw(layout::WORD)],
    )?;
    let hole = b.literal(Const::Hole)?;
    b.pointer_compare(value, hole, Cond::Eq)?;
    let present = b.new_block();
    b.branch(d.slow, present)?;
    b.switch_to(present);
    b.ret(value)?;

    b.switch_to(d.keyed);
    let value = b.emit(
        PrimOp::SmiReadTagged,
        [d.field.into(), d.slot.into(), raw(KEYED_BASE), raw(KEYED_SCALE)],
    )?;
    b.ret(value)?;

    b.switch_to(d.slow);
    let value = b.call_runtime("loadProperty", &[obj.into(), key.into()])?;
    b.ret(value)?;
    Ok(b.finish())
}

/// `(obj, key, slot, value) -> value`
fn store() -> IrResult<Graph> {
    let mut b = Builder::new("storePropertySlot");
    let obj = b.stub_arg(0)?;
    let key = b.stub_arg(1)?;
    let slot = b.stub_arg(2)?;
    let value = b.stub_arg(3)?;
    let d = dispatch(&mut b, obj, slot)?;

    b.switch_to(d.dense);
    b.emit(
        PrimOp::SmiWriteTagged,
        [
            d.field.into(),
            d.slot.into(),
            raw(field::ITEMS),
            raw(layout::WORD),
            value.into(),
        ],
    )?;
    b.ret(value)?;

    b.switch_to(d.keyed);
    b.emit(
        PrimOp::SmiWriteTagged,
        [
            d.field.into(),
            d.slot.into(),
            raw(KEYED_BASE),
            raw(KEYED_SCALE),
            value.into(),
        ],
    )?;
    b.ret(value)?;

    b.switch_to(d.slow);
    b.call_runtime("storeProperty", &[obj.into(), key.into(), value.into()])?;
    b.ret(value)?;
    Ok(b.finish())
}

/// `(obj, key) -> boolean`
fn delete() -> IrResult<Graph> {
    let mut b = Builder::new("deletePropertySlot");
    let obj = b.stub_arg(0)?;
    let key = b.stub_arg(1)?;
    let result = b.call_runtime("deleteProperty", &[obj.into(), key.into()])?;
    b.ret(result)?;
    Ok(b.finish())
}
