//! Stub library
//!
//! Stubs are small functions written against the primitive op set and
//! called from generated code. Bodies are declared up front as graph
//! builders and compiled the first time something asks for them; the
//! compiled function is memoized by name for the lifetime of the runtime.

mod alloc;
mod operators;
mod property;

use std::cell::RefCell;

use kiln_heap::Value;
use kiln_ir::{Builder, Const, Graph, Input, InstrId, IrResult};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{JitError, JitResult};

/// Builds the body of a stub
pub(crate) type StubBody = Box<dyn Fn() -> IrResult<Graph>>;

/// Where a stub's code comes from
pub(crate) enum StubSource {
    /// Compiled from a graph on first use
    Graph(StubBody),
    /// A host function with the generated-code signature
    Native(usize),
}

/// A compiled stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stub {
    function: Value,
    code: Value,
}

impl Stub {
    pub(crate) fn new(function: Value, code: Value) -> Self {
        Self { function, code }
    }

    /// Tagged Function pointer embedded by generated code
    pub fn ptr(&self) -> u64 {
        self.function.raw()
    }

    /// The stub's Function object
    pub fn function(&self) -> Value {
        self.function
    }

    /// The stub's Code object
    pub fn code(&self) -> Value {
        self.code
    }
}

/// Named stub bodies and their compiled functions
#[derive(Default)]
pub(crate) struct StubLibrary {
    declared: FxHashMap<String, StubSource>,
    compiled: RefCell<FxHashMap<String, Stub>>,
    in_progress: RefCell<FxHashSet<String>>,
}

impl StubLibrary {
    /// Library with every stub generated code may call
    pub(crate) fn standard(runtime_entry: usize) -> JitResult<Self> {
        let mut library = Self::default();
        library.declare_native("runtime", runtime_entry)?;
        alloc::declare(&mut library)?;
        operators::declare(&mut library)?;
        property::declare(&mut library)?;
        library.declare_stub("noop", noop)?;
        library.declare_stub("log", log)?;
        Ok(library)
    }

    /// Register a graph body under `name`
    pub(crate) fn declare_stub(
        &mut self,
        name: impl Into<String>,
        body: impl Fn() -> IrResult<Graph> + 'static,
    ) -> JitResult<()> {
        self.declare(name.into(), StubSource::Graph(Box::new(body)))
    }

    /// Register a host entry point under `name`
    pub(crate) fn declare_native(&mut self, name: impl Into<String>, entry: usize) -> JitResult<()> {
        self.declare(name.into(), StubSource::Native(entry))
    }

    fn declare(&mut self, name: String, source: StubSource) -> JitResult<()> {
        if self.declared.contains_key(&name) {
            return Err(JitError::internal("declareStub", format!("stub '{name}' declared twice")));
        }
        self.declared.insert(name, source);
        Ok(())
    }

    pub(crate) fn source(&self, name: &str) -> JitResult<&StubSource> {
        self.declared
            .get(name)
            .ok_or_else(|| JitError::UnknownStub(name.to_owned()))
    }

    pub(crate) fn compiled(&self, name: &str) -> Option<Stub> {
        self.compiled.borrow().get(name).copied()
    }

    /// Mark `name` as being compiled; a stub may not need itself
    pub(crate) fn begin(&self, name: &str) -> JitResult<()> {
        if !self.in_progress.borrow_mut().insert(name.to_owned()) {
            return Err(JitError::internal(
                "getStub",
                format!("stub '{name}' depends on itself"),
            ));
        }
        Ok(())
    }

    /// Memoize the result of a compile started with [`StubLibrary::begin`]
    pub(crate) fn finish(&self, name: &str, stub: Option<Stub>) {
        self.in_progress.borrow_mut().remove(name);
        if let Some(stub) = stub {
            self.compiled.borrow_mut().insert(name.to_owned(), stub);
        }
    }

    pub(crate) fn declared_count(&self) -> usize {
        self.declared.len()
    }

    pub(crate) fn compiled_count(&self) -> usize {
        self.compiled.borrow().len()
    }
}

// ==================== Body helpers ====================

fn raw(n: usize) -> Input {
    Input::Const(Const::Raw(n as i64))
}

fn smi(n: usize) -> Input {
    Input::Const(Const::Smi(n as i64))
}

/// Mask selecting map flag `bits` in the Smi-encoded FLAGS word
fn flag_mask(bits: u64) -> i64 {
    (bits << 1) as i64
}

/// `ret <literal>`
fn ret_literal(b: &mut Builder, value: Const) -> IrResult<InstrId> {
    let v = b.literal(value)?;
    b.ret(v)
}

fn noop() -> IrResult<Graph> {
    let mut b = Builder::new("noop");
    ret_literal(&mut b, Const::Undefined)?;
    Ok(b.finish())
}

/// The builtin `log(value)` global
fn log() -> IrResult<Graph> {
    let mut b = Builder::new("log");
    let value = b.arg(0)?;
    b.call_runtime("log", &[value.into()])?;
    ret_literal(&mut b, Const::Undefined)?;
    Ok(b.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_library_declares_every_category() {
        let library = StubLibrary::standard(0).expect("declare should succeed");
        for name in [
            "runtime",
            "allocTagged/object",
            "allocField",
            "allocObject",
            "allocArray",
            "allocFn",
            "new",
            "checkFunction",
            "coerce/boolean",
            "unary/-",
            "unary/!",
            "binary/+",
            "binary/instanceof",
            "getPropertySlot_Miss",
            "loadPropertySlot",
            "storePropertySlot",
            "deletePropertySlot",
            "noop",
            "log",
        ] {
            assert!(library.source(name).is_ok(), "{name} should be declared");
        }
        assert_eq!(library.compiled_count(), 0);
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let mut library = StubLibrary::default();
        library.declare_stub("noop", noop).expect("declare should succeed");
        assert!(matches!(
            library.declare_stub("noop", noop),
            Err(JitError::Internal { .. })
        ));
    }

    #[test]
    fn unknown_stub_is_reported() {
        let library = StubLibrary::default();
        assert!(matches!(library.source("nope"), Err(JitError::UnknownStub(_))));
    }

    #[test]
    fn self_dependency_is_detected() {
        let library = StubLibrary::default();
        library.begin("allocField").expect("first begin should succeed");
        assert!(library.begin("allocField").is_err());
        library.finish("allocField", None);
        library.begin("allocField").expect("begin after finish should succeed");
    }

    #[test]
    fn bodies_build() {
        let library = StubLibrary::standard(0).expect("declare should succeed");
        for (name, source) in &library.declared {
            if let StubSource::Graph(body) = source {
                let graph = body().expect("stub body should build");
                assert!(graph.block_count() > 0, "{name} has no blocks");
                assert!(graph.first_unlowered().is_none(), "{name} uses high-level ops");
            }
        }
    }
}
