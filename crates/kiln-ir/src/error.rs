//! IR errors

use thiserror::Error;

use crate::graph::{BlockId, InstrId};

/// Malformed graph access
#[derive(Debug, Error)]
pub enum IrError {
    /// Instruction id outside the graph
    #[error("unknown instruction {0}")]
    UnknownInstr(InstrId),

    /// Block id outside the graph
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    /// Instruction no longer listed in its block
    #[error("instruction {0} is not in its block")]
    Detached(InstrId),

    /// Input missing or of the wrong kind
    #[error("instruction {instr} has no suitable input {index}")]
    MissingInput {
        /// Instruction
        instr: InstrId,
        /// Input position
        index: usize,
    },
}

/// Result type for graph operations
pub type IrResult<T> = std::result::Result<T, IrError>;
