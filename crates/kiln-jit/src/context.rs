//! Execution and compilation contexts
//!
//! [`RuntimeContext`] is the `ctx` argument every generated function
//! receives. [`CompileContext`] describes the unit being compiled; nested
//! compiles (stubs, inline cache regeneration) push their own context and
//! the guard restores the outer one when they finish.

use std::cell::{Cell, RefCell};
use std::fmt;

use kiln_heap::Value;

/// State shared by all generated code, passed as the first argument
#[repr(C)]
#[derive(Debug)]
pub struct RuntimeContext {
    global: Cell<u64>,
    young: Cell<usize>,
    runtime: Cell<usize>,
}

impl RuntimeContext {
    /// Offset of the global object
    pub const GLOBAL: i32 = 0;
    /// Offset of the young-space cursor pointer
    pub const YOUNG: i32 = 8;
    /// Offset of the runtime back-pointer
    pub const RUNTIME: i32 = 16;

    pub(crate) fn new(global: Value, young: usize) -> Self {
        Self {
            global: Cell::new(global.raw()),
            young: Cell::new(young),
            runtime: Cell::new(0),
        }
    }

    /// The global object
    pub fn global(&self) -> Value {
        Value::from_raw(self.global.get())
    }

    pub(crate) fn set_runtime(&self, runtime: usize) {
        self.runtime.set(runtime);
    }

    pub(crate) fn runtime(&self) -> usize {
        self.runtime.get()
    }
}

/// What is being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A user function or script
    Function,
    /// A stub body
    Stub,
    /// Inline cache dispatch code
    Ic,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Function => write!(f, "function"),
            UnitKind::Stub => write!(f, "stub"),
            UnitKind::Ic => write!(f, "ic"),
        }
    }
}

/// One compile in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileContext {
    /// Name of the unit
    pub unit: String,
    /// Kind of the unit
    pub kind: UnitKind,
}

/// Stack of compiles in progress, innermost last
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: RefCell<Vec<CompileContext>>,
}

impl ContextStack {
    /// Make `context` current until the guard drops
    pub(crate) fn enter(&self, context: CompileContext) -> ContextGuard<'_> {
        let mut frames = self.frames.borrow_mut();
        frames.push(context);
        ContextGuard {
            stack: self,
            depth: frames.len(),
        }
    }

    pub(crate) fn current(&self) -> Option<CompileContext> {
        self.frames.borrow().last().cloned()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Restores the enclosing compile context when dropped
#[must_use = "the context is left as soon as the guard is dropped"]
pub(crate) struct ContextGuard<'a> {
    stack: &'a ContextStack,
    depth: usize,
}

impl ContextGuard<'_> {
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let mut frames = self.stack.frames.borrow_mut();
        if frames.len() != self.depth {
            tracing::error!(
                expected = self.depth,
                actual = frames.len(),
                "compile contexts released out of order"
            );
        }
        frames.truncate(self.depth.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, kind: UnitKind) -> CompileContext {
        CompileContext {
            unit: name.into(),
            kind,
        }
    }

    #[test]
    fn nested_compiles_restore_outer_context() {
        let stack = ContextStack::default();
        let outer = stack.enter(unit("script", UnitKind::Function));
        {
            let inner = stack.enter(unit("allocObject", UnitKind::Stub));
            assert_eq!(inner.depth(), 2);
            assert_eq!(stack.current().map(|c| c.kind), Some(UnitKind::Stub));
        }
        assert_eq!(stack.current().map(|c| c.unit), Some("script".to_owned()));
        drop(outer);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn context_layout_matches_offsets() {
        assert_eq!(std::mem::offset_of!(RuntimeContext, global), RuntimeContext::GLOBAL as usize);
        assert_eq!(std::mem::offset_of!(RuntimeContext, young), RuntimeContext::YOUNG as usize);
        assert_eq!(std::mem::offset_of!(RuntimeContext, runtime), RuntimeContext::RUNTIME as usize);
    }
}
