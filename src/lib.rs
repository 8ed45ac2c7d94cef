//! locallm - integration layer for an on-device language model
//!
//! Compiles JSON-Schema into generation constraints, bridges the runtime's
//! streaming callbacks into a pull-based stream, and recovers tool calls
//! from free-form model output. The model itself sits behind
//! [`runtime::ModelRuntime`].

pub mod client;
pub mod config;
pub mod error;
pub mod id;
pub mod runtime;
pub mod schema;
pub mod stream;
pub mod tools;
pub mod transcript;

pub use client::{DefaultProvider, LocalModel, StructuredResponse, ToolStream};
pub use error::{ErrorKind, LocalLmError, Result};
pub use runtime::{Availability, AvailabilityReason, GenerationOptions, GenerationRequest, ModelRuntime};
