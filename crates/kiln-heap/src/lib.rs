//! # kiln heap
//!
//! Tagged-pointer object model shared by the compiler, the stub library and
//! generated code.
//!
//! ## Design
//!
//! - **Values**: one machine word; small integers are shifted left by one,
//!   heap pointers carry the low tag bit
//! - **Spaces**: bump allocation over page-aligned pages, with page reuse
//! - **Maps**: hidden classes with a transition tree keyed by property name
//! - **Scopes**: nested root sets covering objects that are not linked yet

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod heap;
pub mod inspect;
pub mod layout;
pub mod map;
pub mod object;
pub mod scope;
pub mod space;
pub mod value;

pub use error::{HeapError, HeapResult};
pub use heap::{CodeRecord, Heap, HeapConfig};
pub use inspect::HostValue;
pub use map::{MapFlags, MapKind};
pub use scope::{ScopeGuard, ScopeKind};
pub use space::{Page, Space, SpaceCursor};
pub use value::Value;
