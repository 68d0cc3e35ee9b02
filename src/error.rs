//! Kiln error types

use std::time::Duration;

/// Kiln error types
#[derive(Debug, thiserror::Error)]
pub enum KilnError {
    // Sampler errors
    #[error("no sampler configured")]
    SamplerUnavailable,

    #[error("sampler error: {0}")]
    Sampler(String),

    // Structured output errors (repair path)
    #[error("failed to parse structured output: {0}")]
    ParseFailed(String),

    #[error("schema validation failed: {}", .0.join("; "))]
    SchemaValidationFailed(Vec<String>),

    /// All attempts used up. Carries the last underlying failure.
    #[error("retry budget exhausted after {attempts} attempt(s): {last_reason}")]
    RetryBudgetExhausted {
        attempts: u32,
        last_reason: String,
        repair_attempted: bool,
    },

    // Candidate generation errors
    #[error("strategy '{strategy}' produced invalid output: {reason}")]
    GenerationInvalid { strategy: String, reason: String },

    /// Every strategy in a multi-candidate call failed.
    #[error("no candidates produced ({} strategies failed)", failures.len())]
    NoCandidates { failures: Vec<String> },

    #[error("deadline exceeded after {after:?}")]
    Timeout { after: Duration },

    // Scoring errors
    #[error("unknown weight profile: {0}")]
    UnknownProfile(String),

    #[error("invalid weight profile: {0}")]
    InvalidProfile(String),

    // Configuration / input errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KilnError {
    /// Whether the resilient executor may retry after this error.
    ///
    /// Sampler transport failures and structured-output failures are
    /// expected and retried. A missing sampler is fatal for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Sampler(_) | Self::ParseFailed(_) | Self::SchemaValidationFailed(_)
        )
    }

    /// Whether this is a parse/validation failure handled by the repair path.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::ParseFailed(_) | Self::SchemaValidationFailed(_))
    }
}

/// Result type alias for Kiln operations
pub type Result<T> = std::result::Result<T, KilnError>;
