//! Structured generation schemas
//!
//! Compiles JSON-Schema documents into the constraint nodes the model runtime
//! enforces during structured generation.

pub mod compiler;
pub mod node;

pub use compiler::{compile, compile_str};
pub use node::{CompiledSchema, ConstraintNode, Property};
