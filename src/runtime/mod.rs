//! Model runtime boundary
//!
//! Everything that actually runs the model lives behind [`ModelRuntime`]:
//! loading, sampling, memory. Implementations that wrap a native library copy
//! every returned buffer into an owned `String` and release the native one
//! before returning, so nothing crossing this trait needs manual freeing.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LocalLmError, Result};
use crate::schema::CompiledSchema;
use crate::stream::StreamSink;
use crate::transcript::TranscriptEntry;

pub use mock::MockRuntime;

/// Why the model is or is not usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityReason {
    Ok,
    DeviceNotEligible,
    FeatureDisabled,
    ModelNotReady,
    Unknown,
}

/// Result of an availability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    pub reason: AvailabilityReason,
    /// Human-readable, often with remediation steps
    pub message: String,
}

impl Availability {
    pub fn ready() -> Self {
        Self {
            available: true,
            reason: AvailabilityReason::Ok,
            message: "Available".to_string(),
        }
    }

    pub fn unavailable(reason: AvailabilityReason, message: impl Into<String>) -> Self {
        Self {
            available: false,
            reason,
            message: message.into(),
        }
    }

    /// `Unavailable` error carrying the runtime's message verbatim
    pub fn into_result(self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(LocalLmError::Unavailable {
                reason: self.reason,
                message: self.message,
            })
        }
    }
}

/// Sampling knobs passed through to the runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// In [0, 1]; absent or 0 means the runtime default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Absent or <= 0 means no cap from this layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Fill unset fields from `defaults`
    pub fn or(self, defaults: GenerationOptions) -> Self {
        Self {
            temperature: self.temperature.or(defaults.temperature),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature
            && !(0.0..=1.0).contains(&t)
        {
            return Err(LocalLmError::InvalidInput(format!(
                "temperature must be between 0 and 1, got {}",
                t
            )));
        }
        Ok(())
    }

    /// Temperature to request, `None` for the runtime default
    pub fn effective_temperature(&self) -> Option<f64> {
        self.temperature.filter(|t| *t > 0.0)
    }

    /// Token cap to request, `None` for unlimited
    pub fn effective_max_tokens(&self) -> Option<u32> {
        self.max_tokens.filter(|n| *n > 0).map(|n| n as u32)
    }
}

/// Everything needed for one generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Prior turns; empty for a one-shot prompt
    pub history: Vec<TranscriptEntry>,
    pub prompt: String,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<TranscriptEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// The opaque model runtime
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Whether the model can be used, and why not
    async fn check_availability(&self) -> Availability;

    /// Display names of the languages the model supports
    async fn supported_languages(&self) -> Result<Vec<String>>;

    /// Generate a complete response
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Generate JSON text constrained by `schema`
    async fn generate_structured(&self, request: &GenerationRequest, schema: &CompiledSchema) -> Result<String>;

    /// Generate incrementally, pushing cumulative payloads into `sink`.
    ///
    /// Returning without a terminal payload ends the stream; returning `Err`
    /// fails it. Implementations may stop early once `sink.is_cancelled()`.
    async fn stream(&self, request: GenerationRequest, sink: &StreamSink) -> Result<()>;
}
