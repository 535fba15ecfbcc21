//! Host entry point shared by every runtime callback

use std::slice;

use kiln_heap::Value;
use rustc_hash::FxHashMap;

use crate::context::RuntimeContext;
use crate::error::{JitError, JitResult, RuntimeError};
use crate::runtime::RuntimeInner;

/// A host callback invoked from generated code
pub(crate) type Callback = fn(&RuntimeInner, &[Value]) -> Result<Value, RuntimeError>;

/// Callbacks by id; generated code embeds the id as a Smi
#[derive(Default)]
pub(crate) struct Callbacks {
    ids: FxHashMap<&'static str, usize>,
    entries: Vec<(&'static str, Callback)>,
}

impl Callbacks {
    pub(crate) fn register(&mut self, name: &'static str, callback: Callback) -> JitResult<()> {
        if self.ids.contains_key(name) {
            return Err(JitError::internal(
                "registerRuntime",
                format!("runtime callback '{name}' registered twice"),
            ));
        }
        self.ids.insert(name, self.entries.len());
        self.entries.push((name, callback));
        Ok(())
    }

    pub(crate) fn id(&self, name: &str) -> JitResult<usize> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| JitError::UnknownRuntime(name.to_owned()))
    }

    fn get(&self, id: usize) -> Option<(&'static str, Callback)> {
        self.entries.get(id).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Code entry of the `runtime` stub.
///
/// `argv[0]` is the callback id; the remaining arguments are handed to the
/// callback. Errors cannot unwind through generated code, so they are parked
/// on the runtime and `undefined` is returned in their place.
pub(crate) extern "C" fn runtime_entry(
    ctx: *const RuntimeContext,
    _callee: u64,
    _this: u64,
    argv: *const u64,
    argc: u64,
) -> u64 {
    // SAFETY: generated code always passes the context it was entered with,
    // and the runtime outlives every call into its code.
    let rt = unsafe { &*((*ctx).runtime() as *const RuntimeInner) };
    let args: &[u64] = if argc == 0 || argv.is_null() {
        &[]
    } else {
        // SAFETY: `argv` points at `argc` words pushed by the caller.
        unsafe { slice::from_raw_parts(argv, argc as usize) }
    };

    match dispatch(rt, args) {
        Ok(value) => value.raw(),
        Err(err) => {
            tracing::debug!(error = %err, "runtime callback failed");
            rt.record_error(err);
            rt.undefined.raw()
        }
    }
}

fn dispatch(rt: &RuntimeInner, args: &[u64]) -> Result<Value, RuntimeError> {
    let (id, rest) = args
        .split_first()
        .ok_or_else(|| JitError::internal("runtime", "called without a callback id"))?;
    let id = Value::from_raw(*id)
        .as_smi()
        .and_then(|id| usize::try_from(id).ok())
        .ok_or_else(|| JitError::internal("runtime", format!("bad callback id {id:#x}")))?;
    let (name, callback) = rt
        .callbacks
        .get(id)
        .ok_or_else(|| JitError::UnknownRuntime(format!("#{id}")))?;

    let values: Vec<Value> = rest.iter().copied().map(Value::from_raw).collect();
    tracing::trace!(callback = name, argc = values.len(), "runtime call");
    callback(rt, &values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nothing(_: &RuntimeInner, _: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::smi(0))
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut callbacks = Callbacks::default();
        callbacks.register("a", nothing).expect("register should succeed");
        callbacks.register("b", nothing).expect("register should succeed");
        assert_eq!(callbacks.id("a").expect("a is registered"), 0);
        assert_eq!(callbacks.id("b").expect("b is registered"), 1);
        assert_eq!(callbacks.len(), 2);
        assert!(matches!(callbacks.id("c"), Err(JitError::UnknownRuntime(_))));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut callbacks = Callbacks::default();
        callbacks.register("a", nothing).expect("register should succeed");
        assert!(callbacks.register("a", nothing).is_err());
    }
}
