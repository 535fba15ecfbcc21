//! # kiln front end
//!
//! Parses a script with oxc and builds one SSA instruction graph per
//! function, ready for platform lowering.
//!
//! Supported: numbers, strings, booleans, `null`, `undefined`, globals and
//! locals, property access and assignment, object and array literals,
//! function expressions and declarations, calls (including method calls),
//! `new`, `+ - * < <= > >= === !== instanceof`, unary `-` and `!`,
//! `&&`/`||`, conditional expressions, `if`, `delete` and `debugger`.
//! Loops are rejected.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod construct;
pub mod error;
mod expression;

pub use construct::construct;
pub use error::{CompileError, CompileResult};
