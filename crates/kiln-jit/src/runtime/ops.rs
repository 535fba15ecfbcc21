//! Runtime callbacks: the slow paths of the stub library

use std::cmp::Ordering;
use std::io::Write;

use kiln_heap::{Heap, Value};
use tracing::warn;

use super::RuntimeInner;
use super::trampoline::{Callback, Callbacks};
use crate::error::{JitError, JitResult, RuntimeError};
use crate::ic;

type OpResult = Result<Value, RuntimeError>;

pub(crate) fn register(callbacks: &mut Callbacks) -> JitResult<()> {
    let table: [(&'static str, Callback); 17] = [
        ("loadProperty", load_property),
        ("storeProperty", store_property),
        ("deleteProperty", delete_property),
        ("getPropertySlot", ic::get_property_slot),
        ("allocTagged", alloc_tagged),
        ("coerce/boolean", coerce_boolean),
        ("unary/-", negate),
        ("binary/+", add),
        ("binary/-", sub),
        ("binary/*", mul),
        ("binary/<", less_than),
        ("binary/<=", less_equal),
        ("binary/===", strict_eq),
        ("binary/!==", strict_ne),
        ("binary/instanceof", instance_of),
        ("typeError", type_error),
        ("log", log),
    ];
    for (name, callback) in table {
        callbacks.register(name, callback)?;
    }
    Ok(())
}

fn arg(args: &[Value], index: usize) -> Result<Value, RuntimeError> {
    args.get(index).copied().ok_or_else(|| {
        JitError::internal("runtime", format!("missing callback argument {index}")).into()
    })
}

// ==================== Properties ====================

fn load_property(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (obj, key) = (arg(args, 0)?, arg(args, 1)?);
    Ok(rt.heap()?.get_property(obj, key)?)
}

fn store_property(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (obj, key, value) = (arg(args, 0)?, arg(args, 1)?, arg(args, 2)?);
    rt.heap()?.set_property(obj, key, value)?;
    Ok(value)
}

fn delete_property(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (obj, key) = (arg(args, 0)?, arg(args, 1)?);
    let mut heap = rt.heap()?;
    let deleted = heap.delete_property(obj, key)?;
    Ok(heap.boolean(deleted))
}

// ==================== Allocation ====================

/// The young page is exhausted: allocate through the heap, which moves on
/// to a fresh page and resets the cursor generated code bumps.
fn alloc_tagged(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let map = arg(args, 0)?;
    let size = arg(args, 1)?
        .as_smi()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| JitError::internal("allocTagged", "size is not a Smi"))?;
    Ok(rt.heap()?.alloc_young(map, size)?)
}

// ==================== Coercions ====================

/// Numeric value used by arithmetic and relational operators
pub(crate) fn to_number(heap: &Heap, value: Value) -> f64 {
    if let Some(n) = heap.number_value(value) {
        return n;
    }
    if value == heap.true_value() {
        return 1.0;
    }
    if value == heap.false_value() || value == heap.null() {
        return 0.0;
    }
    if let Some(s) = heap.str_of(value) {
        let s = s.trim();
        if s.is_empty() {
            return 0.0;
        }
        return s.parse().unwrap_or(f64::NAN);
    }
    f64::NAN
}

fn coerce_boolean(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let value = arg(args, 0)?;
    let heap = rt.heap()?;
    Ok(heap.boolean(heap.to_boolean(value)))
}

fn negate(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let value = arg(args, 0)?;
    let mut heap = rt.heap()?;
    let n = to_number(&heap, value);
    Ok(heap.number(-n)?)
}

// ==================== Binary operators ====================

fn arithmetic(rt: &RuntimeInner, args: &[Value], op: fn(f64, f64) -> f64) -> OpResult {
    let (left, right) = (arg(args, 0)?, arg(args, 1)?);
    let mut heap = rt.heap()?;
    let result = op(to_number(&heap, left), to_number(&heap, right));
    Ok(heap.number(result)?)
}

fn add(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (left, right) = (arg(args, 0)?, arg(args, 1)?);
    {
        let mut heap = rt.heap()?;
        if heap.str_of(left).is_some() || heap.str_of(right).is_some() {
            let joined = format!(
                "{}{}",
                heap.to_display_string(left),
                heap.to_display_string(right)
            );
            return Ok(heap.string(&joined)?);
        }
    }
    arithmetic(rt, args, |a, b| a + b)
}

fn sub(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    arithmetic(rt, args, |a, b| a - b)
}

fn mul(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    arithmetic(rt, args, |a, b| a * b)
}

/// `left <=> right`; `None` when either side is NaN
fn compare(heap: &Heap, left: Value, right: Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (heap.str_of(left), heap.str_of(right)) {
        return Some(a.cmp(b));
    }
    to_number(heap, left).partial_cmp(&to_number(heap, right))
}

fn less_than(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (left, right) = (arg(args, 0)?, arg(args, 1)?);
    let heap = rt.heap()?;
    let result = compare(&heap, left, right) == Some(Ordering::Less);
    Ok(heap.boolean(result))
}

fn less_equal(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (left, right) = (arg(args, 0)?, arg(args, 1)?);
    let heap = rt.heap()?;
    let result = matches!(
        compare(&heap, left, right),
        Some(Ordering::Less | Ordering::Equal)
    );
    Ok(heap.boolean(result))
}

/// `===`: numbers by value (NaN is unequal to itself), strings by content,
/// everything else by identity
pub(crate) fn strict_equals(heap: &Heap, left: Value, right: Value) -> bool {
    if let (Some(a), Some(b)) = (heap.number_value(left), heap.number_value(right)) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (heap.str_of(left), heap.str_of(right)) {
        return a == b;
    }
    left == right
}

fn strict_eq(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (left, right) = (arg(args, 0)?, arg(args, 1)?);
    let heap = rt.heap()?;
    Ok(heap.boolean(strict_equals(&heap, left, right)))
}

fn strict_ne(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (left, right) = (arg(args, 0)?, arg(args, 1)?);
    let heap = rt.heap()?;
    Ok(heap.boolean(!strict_equals(&heap, left, right)))
}

fn instance_of(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let (obj, ctor) = (arg(args, 0)?, arg(args, 1)?);
    let mut heap = rt.heap()?;
    match heap.instance_of(obj, ctor)? {
        Some(result) => Ok(heap.boolean(result)),
        None => Err(RuntimeError::TypeError(format!(
            "right-hand side of 'instanceof' is not callable: {}",
            heap.to_display_string(ctor)
        ))),
    }
}

// ==================== Errors and builtins ====================

/// A non-function was called. The error is parked on the runtime and the
/// call proceeds with a function that does nothing.
fn type_error(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let callee = arg(args, 0)?;
    let message = format!("{} is not a function", rt.heap()?.to_display_string(callee));
    warn!(%message, "call of a non-function");
    rt.record_error(RuntimeError::TypeError(message));
    Ok(rt.stub("noop")?.function())
}

fn log(rt: &RuntimeInner, args: &[Value]) -> OpResult {
    let value = arg(args, 0)?;
    let line = rt.heap()?.to_display_string(value);
    let mut output = rt
        .output
        .try_borrow_mut()
        .map_err(|_| JitError::internal("log", "output sink is busy"))?;
    if let Err(err) = writeln!(output, "{line}") {
        warn!(error = %err, "failed to write log output");
    }
    Ok(rt.undefined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_from_primitives() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        assert_eq!(to_number(&heap, Value::smi(-4)), -4.0);
        assert_eq!(to_number(&heap, heap.true_value()), 1.0);
        assert_eq!(to_number(&heap, heap.null()), 0.0);
        assert!(to_number(&heap, heap.undefined()).is_nan());
        let s = heap.string(" 2.5 ").expect("string");
        assert_eq!(to_number(&heap, s), 2.5);
        let junk = heap.string("abc").expect("string");
        assert!(to_number(&heap, junk).is_nan());
    }

    #[test]
    fn strict_equality_compares_numbers_by_value() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        let a = heap.number(0.5).expect("number");
        let b = heap.number(0.5).expect("number");
        assert_ne!(a, b);
        assert!(strict_equals(&heap, a, b));
        let nan = heap.number(f64::NAN).expect("number");
        assert!(!strict_equals(&heap, nan, nan));
        assert!(!strict_equals(&heap, Value::smi(1), heap.true_value()));
        assert!(strict_equals(&heap, heap.null(), heap.null()));
    }

    #[test]
    fn strings_compare_lexically() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        let a = heap.string("apple").expect("string");
        let b = heap.string("banana").expect("string");
        assert_eq!(compare(&heap, a, b), Some(Ordering::Less));
        let nan = heap.number(f64::NAN).expect("number");
        assert_eq!(compare(&heap, nan, Value::smi(1)), None);
    }
}
