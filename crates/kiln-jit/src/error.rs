//! JIT and runtime errors

use cranelift_module::ModuleError;
use kiln_frontend::CompileError;
use kiln_heap::HeapError;
use kiln_ir::IrError;

/// Errors produced while compiling
#[derive(Debug, thiserror::Error)]
pub enum JitError {
    /// Cranelift module-level error.
    #[error("cranelift module error: {0}")]
    Module(Box<ModuleError>),

    /// Failed to create the JIT builder.
    #[error("jit builder initialization failed: {0}")]
    Builder(String),

    /// The front end rejected the source
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Heap allocation or object access failed
    #[error("heap error: {0}")]
    Heap(#[from] HeapError),

    /// A graph was malformed
    #[error("ir error: {0}")]
    Ir(#[from] IrError),

    /// A stub name has no declared body
    #[error("unknown stub: {0}")]
    UnknownStub(String),

    /// A runtime callback name was not registered
    #[error("unknown runtime callback: {0}")]
    UnknownRuntime(String),

    /// A `fn`/`code` instruction referenced a graph outside the compile unit
    #[error("unknown function #{0}")]
    UnknownFunction(usize),

    /// An instruction reached a stage that cannot handle it
    #[error("internal error in {op}: {reason}")]
    Internal {
        /// Operation being processed
        op: String,
        /// What went wrong
        reason: String,
    },

    /// Code generation failed inside Cranelift
    #[error("codegen error: {0}")]
    Codegen(String),
}

impl From<ModuleError> for JitError {
    fn from(value: ModuleError) -> Self {
        Self::Module(Box::new(value))
    }
}

impl JitError {
    /// Internal error for `op`
    pub fn internal(op: impl Into<String>, reason: impl Into<String>) -> Self {
        let err = Self::Internal {
            op: op.into(),
            reason: reason.into(),
        };
        tracing::error!(error = %err, "internal compiler error");
        err
    }
}

/// Result type for compilation
pub type JitResult<T> = Result<T, JitError>;

/// Errors raised while running generated code
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A non-callable value was called, or `instanceof` got a non-function
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A runtime callback failed to allocate or access the heap
    #[error("heap error: {0}")]
    Heap(#[from] HeapError),

    /// A runtime callback had to compile and failed
    #[error(transparent)]
    Jit(#[from] JitError),
}
