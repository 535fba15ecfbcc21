//! Coercion, callable checks and operator stubs
//!
//! Operators take a Smi fast path and call the runtime for everything else:
//! overflow, doubles, strings and objects.

use kiln_heap::layout::base;
use kiln_heap::layout::map as map_layout;
use kiln_heap::{MapFlags, MapKind};
use kiln_ir::{BinOp, BlockId, Builder, Cond, Const, Graph, InstrId, IrResult, PrimOp};

use super::{StubLibrary, flag_mask, ret_literal, smi};
use crate::error::JitResult;

pub(super) fn declare(library: &mut StubLibrary) -> JitResult<()> {
    library.declare_stub("checkFunction", check_function)?;
    library.declare_stub("coerce/boolean", coerce_boolean)?;
    library.declare_stub("unary/-", negate)?;
    library.declare_stub("unary/!", not)?;
    for op in BinOp::ALL {
        library.declare_stub(format!("binary/{}", op.symbol()), move || binary(op))?;
    }
    Ok(())
}

/// `(fn) -> fn`, or the `noop` function after recording a TypeError
fn check_function() -> IrResult<Graph> {
    let mut b = Builder::new("checkFunction");
    let callee = b.stub_arg(0)?;
    b.is_smi(callee)?;
    let bad = b.new_block();
    let heap = b.new_block();
    b.branch(bad, heap)?;

    b.switch_to(heap);
    let map = b.read(callee, base::MAP)?;
    let flags = b.read(map, map_layout::FLAGS)?;
    b.smi_test(flags, flag_mask(MapFlags::FUNCTION.bits()))?;
    let ok = b.new_block();
    b.branch(ok, bad)?;

    b.switch_to(ok);
    b.ret(callee)?;

    b.switch_to(bad);
    let replacement = b.call_runtime("typeError", &[callee.into()])?;
    b.ret(replacement)?;
    Ok(b.finish())
}

/// `(v) -> true | false`
fn coerce_boolean() -> IrResult<Graph> {
    let mut b = Builder::new("coerce/boolean");
    let value = b.stub_arg(0)?;
    let yes = b.new_block();
    let no = b.new_block();
    let same = b.new_block();

    b.is_smi(value)?;
    let small = b.new_block();
    let boxed = b.new_block();
    b.branch(small, boxed)?;

    b.switch_to(small);
    b.smi_compare(value, smi(0), Cond::Eq)?;
    b.branch(no, yes)?;

    b.switch_to(boxed);
    let t = b.literal(Const::Bool(true))?;
    b.pointer_compare(value, t, Cond::Eq)?;
    let not_true = b.new_block();
    b.branch(same, not_true)?;

    b.switch_to(not_true);
    let f = b.literal(Const::Bool(false))?;
    b.pointer_compare(value, f, Cond::Eq)?;
    let slow = b.new_block();
    b.branch(same, slow)?;

    b.switch_to(same);
    b.ret(value)?;
    b.switch_to(yes);
    ret_literal(&mut b, Const::Bool(true))?;
    b.switch_to(no);
    ret_literal(&mut b, Const::Bool(false))?;

    b.switch_to(slow);
    let result = b.call_runtime("coerce/boolean", &[value.into()])?;
    b.ret(result)?;
    Ok(b.finish())
}

/// `(v) -> -v`
fn negate() -> IrResult<Graph> {
    let mut b = Builder::new("unary/-");
    let value = b.stub_arg(0)?;
    b.is_smi(value)?;
    let fast = b.new_block();
    let slow = b.new_block();
    b.branch(fast, slow)?;

    b.switch_to(fast);
    let result = b.emit(PrimOp::SmiNeg, [value.into()])?;
    b.emit(PrimOp::CheckOverflow, [])?;
    let done = b.new_block();
    b.branch(slow, done)?;

    b.switch_to(done);
    b.ret(result)?;

    b.switch_to(slow);
    let generic = b.call_runtime("unary/-", &[value.into()])?;
    b.ret(generic)?;
    Ok(b.finish())
}

/// `(v) -> !v`
fn not() -> IrResult<Graph> {
    let mut b = Builder::new("unary/!");
    let value = b.stub_arg(0)?;
    let boolean = b.call_stub("coerce/boolean", &[value.into()])?;
    b.emit(PrimOp::IsTrue, [boolean.into()])?;
    let truthy = b.new_block();
    let falsy = b.new_block();
    b.branch(truthy, falsy)?;

    b.switch_to(truthy);
    ret_literal(&mut b, Const::Bool(false))?;
    b.switch_to(falsy);
    ret_literal(&mut b, Const::Bool(true))?;
    Ok(b.finish())
}

/// `(l, r) -> l op r`
fn binary(op: BinOp) -> IrResult<Graph> {
    let name = format!("binary/{}", op.symbol());
    let mut b = Builder::new(name.clone());
    let left = b.stub_arg(0)?;
    let right = b.stub_arg(1)?;

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            let slow = both_smis(&mut b, left, right)?;
            let prim = match op {
                BinOp::Add => PrimOp::SmiAdd,
                BinOp::Sub => PrimOp::SmiSub,
                _ => PrimOp::SmiMul,
            };
            let result = b.emit(prim, [left.into(), right.into()])?;
            b.emit(PrimOp::CheckOverflow, [])?;
            let done = b.new_block();
            b.branch(slow, done)?;
            b.switch_to(done);
            b.ret(result)?;
            generic(&mut b, slow, &name, left, right)?;
        }

        BinOp::Lt | BinOp::Le => {
            let slow = both_smis(&mut b, left, right)?;
            let cond = if op == BinOp::Lt { Cond::Lt } else { Cond::Le };
            b.smi_compare(left, right, cond)?;
            let (yes, no) = (b.new_block(), b.new_block());
            b.branch(yes, no)?;
            b.switch_to(yes);
            ret_literal(&mut b, Const::Bool(true))?;
            b.switch_to(no);
            ret_literal(&mut b, Const::Bool(false))?;
            generic(&mut b, slow, &name, left, right)?;
        }

        BinOp::StrictEq | BinOp::StrictNe => strict_equality(&mut b, &name, op, left, right)?,

        BinOp::InstanceOf => {
            let result = b.call_runtime(&name, &[left.into(), right.into()])?;
            b.ret(result)?;
        }
    }
    Ok(b.finish())
}

/// Continue in a block where both operands are Smis; returns the block
/// taken otherwise
fn both_smis(b: &mut Builder, left: InstrId, right: InstrId) -> IrResult<BlockId> {
    let slow = b.new_block();
    b.is_smi(left)?;
    let check_right = b.new_block();
    b.branch(check_right, slow)?;

    b.switch_to(check_right);
    b.is_smi(right)?;
    let fast = b.new_block();
    b.branch(fast, slow)?;

    b.switch_to(fast);
    Ok(slow)
}

fn generic(
    b: &mut Builder,
    slow: BlockId,
    name: &str,
    left: InstrId,
    right: InstrId,
) -> IrResult<()> {
    b.switch_to(slow);
    let result = b.call_runtime(name, &[left.into(), right.into()])?;
    b.ret(result)?;
    Ok(())
}

/// Identical words are equal unless they are the same boxed NaN; a Smi
/// never equals a different word, since numbers that fit a Smi are never
/// boxed. Everything else goes to the runtime.
fn strict_equality(
    b: &mut Builder,
    name: &str,
    op: BinOp,
    left: InstrId,
    right: InstrId,
) -> IrResult<()> {
    let (equal, unequal) = (b.new_block(), b.new_block());
    let slow = b.new_block();

    b.pointer_compare(left, right, Cond::Eq)?;
    let same = b.new_block();
    let different = b.new_block();
    b.branch(same, different)?;

    b.switch_to(same);
    b.is_smi(left)?;
    let boxed = b.new_block();
    b.branch(equal, boxed)?;

    b.switch_to(boxed);
    let map = b.read(left, base::MAP)?;
    let number = b.literal(Const::Map(MapKind::Number))?;
    b.pointer_compare(map, number, Cond::Eq)?;
    b.branch(slow, equal)?;

    b.switch_to(different);
    b.is_smi(left)?;
    let left_boxed = b.new_block();
    b.branch(unequal, left_boxed)?;

    b.switch_to(left_boxed);
    b.is_smi(right)?;
    b.branch(unequal, slow)?;

    let (on_equal, on_unequal) = if op == BinOp::StrictEq {
        (true, false)
    } else {
        (false, true)
    };
    b.switch_to(equal);
    ret_literal(b, Const::Bool(on_equal))?;
    b.switch_to(unequal);
    ret_literal(b, Const::Bool(on_unequal))?;

    generic(b, slow, name, left, right)
}
