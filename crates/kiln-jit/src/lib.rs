//! # kiln JIT
//!
//! Cranelift-backed compiler and runtime for kiln scripts.
//!
//! ## Design
//!
//! - **Pipeline**: front-end graphs are lowered to primitive ops and handed
//!   to Cranelift one function at a time, innermost first
//! - **Stubs**: allocation, operators and property access are small graphs
//!   compiled on first use and shared by all generated code
//! - **Inline caches**: every property access site owns a function whose
//!   code is regenerated as receiver maps are observed
//! - **Runtime calls**: slow paths enter the host through a single
//!   trampoline; errors are parked and surfaced when the outermost call
//!   returns
//!
//! ```no_run
//! use kiln_jit::{JitConfig, Runtime};
//!
//! let runtime = Runtime::new(JitConfig::default())?;
//! let value = runtime.eval("var x = 20; x + 22")?;
//! assert_eq!(runtime.display(value)?, "42");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

mod codegen;
mod compiler;
pub mod config;
pub mod context;
pub mod error;
mod ic;
mod lower;
mod runtime;
mod stubs;

pub use config::{DEFAULT_IC_PROBE_LIMIT, JitConfig, OptLevel, TraceStages};
pub use context::{CompileContext, RuntimeContext, UnitKind};
pub use error::{JitError, JitResult, RuntimeError};
pub use ic::IcStats;
pub use kiln_heap::{HostValue, Value};
pub use kiln_ir::IcKind;
pub use runtime::{Function, Runtime};
pub use stubs::Stub;
