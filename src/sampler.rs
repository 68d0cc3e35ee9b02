//! The sampler capability.
//!
//! A [`Sampler`] turns a request into generated text. It is the only I/O
//! boundary kiln has: how it is transported (in-process model, RPC, HTTP)
//! is up to the implementation, which is injected into the
//! [`ResilientExecutor`](crate::executor::ResilientExecutor).
//!
//! # Failure
//!
//! Return [`KilnError::Sampler`](crate::KilnError::Sampler) for transport or
//! provider failures; the executor retries those within its budget.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use kiln::{Result, SampleOutput, SampleRequest, Sampler};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Sampler for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn sample(&self, request: &SampleRequest<'_>) -> Result<SampleOutput> {
//!         Ok(SampleOutput::new(request.request.template_id.clone()))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::GenerationRequest;

/// What the executor hands to the sampler for one call.
///
/// The original request is borrowed unchanged. Repair feedback from earlier
/// invalid structured outputs travels alongside it in `repair_feedback`.
#[derive(Debug, Clone)]
pub struct SampleRequest<'a> {
    pub request: &'a GenerationRequest,
    /// 1-based attempt number within the current execution.
    pub attempt: u32,
    /// Instruction describing why the previous output was rejected.
    pub repair_feedback: Option<String>,
}

impl<'a> SampleRequest<'a> {
    pub fn new(request: &'a GenerationRequest) -> Self {
        Self {
            request,
            attempt: 1,
            repair_feedback: None,
        }
    }

    /// Whether this call is a structured-repair pass.
    pub fn is_repair(&self) -> bool {
        self.repair_feedback.is_some()
    }
}

/// Successful sampler output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleOutput {
    /// Generated text.
    pub text: String,
    /// Tokens consumed, when the sampler reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    /// Model used, when the sampler reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SampleOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token_count: None,
            model: None,
        }
    }

    /// Set token count.
    pub fn token_count(mut self, tokens: u32) -> Self {
        self.token_count = Some(tokens);
        self
    }

    /// Set the reporting model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Asynchronous text generator.
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Sampler name for logging.
    fn name(&self) -> &str;

    /// Generate text for `request`.
    async fn sample(&self, request: &SampleRequest<'_>) -> Result<SampleOutput>;
}
