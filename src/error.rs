//! Error types for locallm
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::runtime::AvailabilityReason;

/// Coarse classification of every error the crate can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Device ineligible, feature off or model not ready; needs user action
    Unavailable,
    /// Caller bug: malformed schema, malformed messages, empty conversation
    InvalidInput,
    /// The runtime reported a failure while generating
    GenerationFailure,
    /// A response could not be turned into the shape the caller expects
    EncodingFailure,
}

/// All error types that can occur in locallm
#[derive(Debug, Error)]
pub enum LocalLmError {
    /// The model cannot be used right now. The message is the runtime's
    /// own remediation text and is displayed verbatim.
    #[error("{message}")]
    Unavailable {
        reason: AvailabilityReason,
        message: String,
    },

    /// Schema document is structurally unusable
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Malformed caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A conversation needs at least one message
    #[error("Invalid input: conversation has no messages")]
    EmptyConversation,

    /// Runtime-reported generation error
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Response could not be encoded back to the caller
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// A second pull was issued while one was still waiting
    #[error("Stream already has a pending read")]
    ConcurrentPull,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LocalLmError {
    /// Map onto the taxonomy callers branch on
    pub fn kind(&self) -> ErrorKind {
        match self {
            LocalLmError::Unavailable { .. } => ErrorKind::Unavailable,
            LocalLmError::InvalidSchema(_)
            | LocalLmError::InvalidInput(_)
            | LocalLmError::EmptyConversation
            | LocalLmError::ConcurrentPull
            | LocalLmError::Json(_) => ErrorKind::InvalidInput,
            LocalLmError::Generation(_) | LocalLmError::Io(_) => ErrorKind::GenerationFailure,
            LocalLmError::Encoding(_) => ErrorKind::EncodingFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::GenerationFailure
    }
}

/// Result type alias for locallm operations
pub type Result<T> = std::result::Result<T, LocalLmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_displays_reason_verbatim() {
        let err = LocalLmError::Unavailable {
            reason: AvailabilityReason::FeatureDisabled,
            message: "Turn on Apple Intelligence in Settings".to_string(),
        };
        assert_eq!(err.to_string(), "Turn on Apple Intelligence in Settings");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_invalid_schema_error() {
        let err = LocalLmError::InvalidSchema("root is not an object".to_string());
        assert_eq!(err.to_string(), "Invalid schema: root is not an object");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_empty_conversation_error() {
        let err = LocalLmError::EmptyConversation;
        assert!(err.to_string().contains("no messages"));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_generation_error_is_retryable() {
        let err = LocalLmError::Generation("context window exceeded".to_string());
        assert_eq!(err.to_string(), "Generation failed: context window exceeded");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_encoding_error() {
        let err = LocalLmError::Encoding("not JSON".to_string());
        assert_eq!(err.kind(), ErrorKind::EncodingFailure);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: LocalLmError = json_err.into();
        assert!(matches!(err, LocalLmError::Json(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(LocalLmError::ConcurrentPull)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
