//! GC root scopes
//!
//! Objects allocated while a compile is in flight are not reachable from any
//! other object until the compile links them together. They are recorded in
//! the current scope instead. Scopes nest: leaving a scope releases only its
//! own roots and makes the enclosing scope current again. A persistent scope
//! redirects roots to the process-lifetime root set (used by stub and inline
//! cache compiles).

use std::cell::RefCell;

use crate::error::{HeapError, HeapResult};
use crate::heap::Heap;
use crate::value::Value;

/// Where roots recorded inside a scope end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Roots live until the scope is left
    Temporary,
    /// Roots live for the lifetime of the heap
    Persistent,
}

struct Frame {
    id: usize,
    kind: ScopeKind,
    roots: Vec<Value>,
}

#[derive(Default)]
pub(crate) struct Scopes {
    persistent: Vec<Value>,
    frames: Vec<Frame>,
    next_id: usize,
}

impl Scopes {
    pub(crate) fn enter(&mut self, kind: ScopeKind) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            kind,
            roots: Vec::new(),
        });
        id
    }

    pub(crate) fn leave(&mut self, id: usize) -> HeapResult<()> {
        match self.frames.last() {
            Some(frame) if frame.id == id => {
                self.frames.pop();
                Ok(())
            }
            Some(frame) => Err(HeapError::ScopeMismatch {
                expected: id,
                actual: frame.id,
            }),
            None => Err(HeapError::ScopeMismatch {
                expected: id,
                actual: usize::MAX,
            }),
        }
    }

    pub(crate) fn root(&mut self, value: Value) {
        if value.is_smi() {
            return;
        }
        match self.frames.last_mut() {
            Some(frame) if frame.kind == ScopeKind::Temporary => frame.roots.push(value),
            _ => self.persistent.push(value),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn root_count(&self) -> usize {
        self.persistent.len() + self.frames.iter().map(|f| f.roots.len()).sum::<usize>()
    }

    pub(crate) fn current_kind(&self) -> Option<ScopeKind> {
        self.frames.last().map(|f| f.kind)
    }
}

/// Leaves its scope when dropped
#[must_use = "the scope is left as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    heap: &'a RefCell<Heap>,
    id: usize,
}

impl<'a> ScopeGuard<'a> {
    /// Enter a scope of `kind` on `heap`
    pub fn enter(heap: &'a RefCell<Heap>, kind: ScopeKind) -> Self {
        let id = heap.borrow_mut().scopes_mut().enter(kind);
        Self { heap, id }
    }

    /// Enter a temporary scope
    pub fn temporary(heap: &'a RefCell<Heap>) -> Self {
        Self::enter(heap, ScopeKind::Temporary)
    }

    /// Enter a persistent scope
    pub fn persistent(heap: &'a RefCell<Heap>) -> Self {
        Self::enter(heap, ScopeKind::Persistent)
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        match self.heap.try_borrow_mut() {
            Ok(mut heap) => {
                if let Err(e) = heap.scopes_mut().leave(self.id) {
                    tracing::error!(error = %e, "unbalanced heap scope");
                }
            }
            Err(_) => tracing::error!(scope = self.id, "heap borrowed while leaving scope"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_keep_outer_roots() {
        let mut scopes = Scopes::default();
        let outer = scopes.enter(ScopeKind::Temporary);
        scopes.root(Value::from_address(0x10));
        let inner = scopes.enter(ScopeKind::Temporary);
        scopes.root(Value::from_address(0x20));
        assert_eq!(scopes.root_count(), 2);

        scopes.leave(inner).expect("inner leave should succeed");
        assert_eq!(scopes.root_count(), 1);
        assert_eq!(scopes.current_kind(), Some(ScopeKind::Temporary));

        scopes.leave(outer).expect("outer leave should succeed");
        assert_eq!(scopes.depth(), 0);
    }

    #[test]
    fn persistent_scope_redirects_roots() {
        let mut scopes = Scopes::default();
        let outer = scopes.enter(ScopeKind::Temporary);
        let persistent = scopes.enter(ScopeKind::Persistent);
        scopes.root(Value::from_address(0x10));
        scopes.leave(persistent).expect("leave should succeed");
        scopes.leave(outer).expect("leave should succeed");
        assert_eq!(scopes.root_count(), 1);
    }

    #[test]
    fn out_of_order_leave_is_rejected() {
        let mut scopes = Scopes::default();
        let outer = scopes.enter(ScopeKind::Temporary);
        let _inner = scopes.enter(ScopeKind::Temporary);
        assert!(matches!(
            scopes.leave(outer),
            Err(HeapError::ScopeMismatch { .. })
        ));
    }

    #[test]
    fn smis_are_never_rooted() {
        let mut scopes = Scopes::default();
        scopes.root(Value::smi(7));
        assert_eq!(scopes.root_count(), 0);
    }
}
