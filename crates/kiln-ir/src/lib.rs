//! # kiln IR
//!
//! Block/instruction graph consumed by platform lowering and the code
//! generator.
//!
//! ## Design
//!
//! - **Arena**: instructions live in one vector per graph and are named by
//!   [`InstrId`]; rewriting an instruction in place keeps its id
//! - **Two levels**: [`HighOp`]s come from the front end and are rewritten
//!   by lowering into [`PrimOp`]s, the only ops code generation accepts
//! - **Descriptors**: every op has a static [`OpInfo`] entry

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod constant;
pub mod display;
pub mod error;
pub mod graph;
pub mod op;

pub use builder::Builder;
pub use constant::{BinOp, Cond, Const, IcKind, UnOp};
pub use error::{IrError, IrResult};
pub use graph::{Block, BlockId, Graph, Input, Inputs, Instr, InstrId};
pub use op::{HighOp, Op, OpInfo, PrimOp};
