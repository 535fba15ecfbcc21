//! Heap errors

use thiserror::Error;

/// Errors raised by heap allocation and object access
#[derive(Debug, Error)]
pub enum HeapError {
    /// The system allocator refused to map a page
    #[error("failed to map a {size} byte page")]
    PageAllocation {
        /// Requested page size in bytes
        size: usize,
    },

    /// A page size could not be turned into a valid layout
    #[error("invalid page layout for {size} bytes")]
    InvalidLayout {
        /// Requested page size in bytes
        size: usize,
    },

    /// A property operation reached a value without property storage
    #[error("value {0:#x} is not an object")]
    NotAnObject(u64),

    /// A code operation reached a value that is not a Code object
    #[error("value {0:#x} is not a code object")]
    NotCode(u64),

    /// Scope guards were released out of order
    #[error("scope {expected} released while scope {actual} is current")]
    ScopeMismatch {
        /// Scope the caller tried to leave
        expected: usize,
        /// Scope that is actually on top of the stack
        actual: usize,
    },
}

/// Result type for heap operations
pub type HeapResult<T> = std::result::Result<T, HeapError>;
