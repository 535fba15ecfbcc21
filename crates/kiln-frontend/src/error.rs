//! Compilation errors

use kiln_ir::IrError;
use thiserror::Error;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// Parse error, one message per diagnostic
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid assignment target
    #[error("Invalid assignment target")]
    InvalidAssignmentTarget,

    /// Graph construction failed
    #[error("Internal error: {0}")]
    Ir(#[from] IrError),
}

impl CompileError {
    /// Create an unsupported error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
