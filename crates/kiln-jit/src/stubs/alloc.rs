//! Allocation stubs
//!
//! `allocTagged/<kind>` bumps the young-space cursor and tags the result
//! with the root map of `kind`; the other stubs build objects out of it.

use kiln_heap::MapKind;
use kiln_heap::layout::{base, field, function, key_store, object};
use kiln_ir::{Builder, Cond, Const, Graph, IrResult, PrimOp};

use super::{StubLibrary, raw, smi};
use crate::error::JitResult;

/// Heap types generated code allocates directly
const TAGGED_KINDS: [MapKind; 4] = [
    MapKind::Field,
    MapKind::Object,
    MapKind::Array,
    MapKind::Function,
];

pub(super) fn declare(library: &mut StubLibrary) -> JitResult<()> {
    for kind in TAGGED_KINDS {
        library.declare_stub(format!("allocTagged/{}", kind.name()), move || {
            alloc_tagged(kind)
        })?;
    }
    library.declare_stub("allocField", alloc_field)?;
    library.declare_stub("allocObject", alloc_object)?;
    library.declare_stub("allocArray", alloc_array)?;
    library.declare_stub("allocFn", alloc_fn)?;
    library.declare_stub("new", new)?;
    Ok(())
}

/// `(size: smi) -> tagged`
fn alloc_tagged(kind: MapKind) -> IrResult<Graph> {
    let mut b = Builder::new(format!("allocTagged/{}", kind.name()));
    let size = b.stub_arg(0)?;
    let map = b.literal(Const::Map(kind))?;
    let bytes = b.emit(PrimOp::SmiUntag, [size.into()])?;
    let bytes = b.emit(PrimOp::HeapAlignSize, [bytes.into()])?;
    let top = b.emit(PrimOp::HeapCurrent, [])?;
    let new_top = b.emit(PrimOp::PointerAdd, [top.into(), bytes.into()])?;
    let limit = b.emit(PrimOp::HeapLimit, [])?;
    b.pointer_compare(new_top, limit, Cond::Gt)?;
    let slow = b.new_block();
    let fast = b.new_block();
    b.branch(slow, fast)?;

    b.switch_to(fast);
    b.emit(PrimOp::HeapSetCurrent, [new_top.into()])?;
    let tagged = b.emit(PrimOp::Pointer, [top.into()])?;
    b.write(tagged, base::MAP, map)?;
    b.ret(tagged)?;

    // Page exhausted: the runtime switches or maps a page.
    b.switch_to(slow);
    let result = b.call_runtime("allocTagged", &[map.into(), size.into()])?;
    b.ret(result)?;
    Ok(b.finish())
}

/// `(words: smi) -> field` filled with holes
fn alloc_field() -> IrResult<Graph> {
    let mut b = Builder::new("allocField");
    let words = b.stub_arg(0)?;
    // size = ITEMS + words * 8, computed on Smis
    let bytes = b.emit(PrimOp::SmiMul, [words.into(), smi(8)])?;
    let size = b.emit(PrimOp::SmiAdd, [bytes.into(), smi(field::ITEMS)])?;
    let storage = b.alloc_tagged(MapKind::Field, size)?;
    b.write(storage, field::SIZE, words)?;
    let count = b.emit(PrimOp::SmiUntag, [words.into()])?;
    let hole = b.literal(Const::Hole)?;
    b.emit(
        PrimOp::PointerFill,
        [storage.into(), raw(field::ITEMS), count.into(), hole.into()],
    )?;
    b.ret(storage)?;
    Ok(b.finish())
}

/// `() -> {}`
fn alloc_object() -> IrResult<Graph> {
    let mut b = Builder::new("allocObject");
    let storage = b.call_stub("allocField", &[smi(object::MIN_ITEMS * key_store::ITEM_WORDS)])?;
    let obj = b.alloc_tagged(MapKind::Object, smi(object::SIZE))?;
    b.write(obj, object::FIELD, storage)?;
    b.ret(obj)?;
    Ok(b.finish())
}

/// `(len: smi) -> array of holes`
fn alloc_array() -> IrResult<Graph> {
    let mut b = Builder::new("allocArray");
    let len = b.stub_arg(0)?;
    let storage = b.call_stub("allocField", &[len.into()])?;
    let array = b.alloc_tagged(MapKind::Array, smi(object::SIZE))?;
    b.write(array, object::FIELD, storage)?;
    b.ret(array)?;
    Ok(b.finish())
}

/// `(code) -> function` with a fresh `prototype` object
fn alloc_fn() -> IrResult<Graph> {
    let mut b = Builder::new("allocFn");
    let code = b.stub_arg(0)?;
    let storage = b.call_stub("allocField", &[smi(object::MIN_ITEMS * key_store::ITEM_WORDS)])?;
    let func = b.alloc_tagged(MapKind::Function, smi(function::SIZE))?;
    b.write(func, function::FIELD, storage)?;
    b.write(func, function::CODE, code)?;
    let instance_map = b.literal(Const::Map(MapKind::Object))?;
    b.write(func, function::INSTANCE_MAP, instance_map)?;

    // Storing `prototype` also installs the instance map.
    let proto = b.call_stub("allocObject", &[])?;
    let key = b.literal(Const::Str("prototype".into()))?;
    b.call_runtime("storeProperty", &[func.into(), key.into(), proto.into()])?;
    b.ret(func)?;
    Ok(b.finish())
}

/// `(vargc: smi, fn, args...) -> object`
fn new() -> IrResult<Graph> {
    let mut b = Builder::new("new");
    let vargc = b.stub_arg(0)?;
    let callee = b.stub_arg(1)?;
    let callee = b.call_stub("checkFunction", &[callee.into()])?;
    let instance_map = b.read(callee, function::INSTANCE_MAP)?;
    let obj = b.call_stub("allocObject", &[])?;
    b.write(obj, base::MAP, instance_map)?;

    let argc = b.emit(PrimOp::SmiUntag, [vargc.into()])?;
    b.emit(PrimOp::RepushArgs, [argc.into(), raw(2)])?;
    b.emit(PrimOp::SmiCall, [callee.into(), obj.into()])?;
    b.ret(obj)?;
    Ok(b.finish())
}
