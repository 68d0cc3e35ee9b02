//! Resilient sampler execution.
//!
//! [`ResilientExecutor`] turns a flaky sampler into a dependable producer of
//! valid output. Per call it keeps a [`RecoverySession`] and loops:
//!
//! ```text
//!   sample ──ok──► parse + validate ──ok──► return
//!     │                  │
//!     │ transport error  │ parse / schema error
//!     ▼                  ▼
//!   retry budget?      repair budget? ──yes──► fold reason into feedback
//!     │ yes              │ no                        │
//!     ▼                  ▼                           ▼
//!   backoff ◄──────── RetryBudgetExhausted        backoff
//! ```
//!
//! The request itself is never mutated: repair feedback travels in
//! [`SampleRequest::repair_feedback`]. The executor does not touch the
//! response cache; caching is layered above it by the
//! [`Pipeline`](crate::Pipeline).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::retry::RetryConfig;
use super::structured::{extract_json, repair_feedback};
use crate::sampler::{SampleOutput, SampleRequest, Sampler};
use crate::schema::SchemaValidator;
use crate::stats::GenerationMetrics;
use crate::telemetry;
use crate::types::GenerationRequest;
use crate::{KilnError, Result};

/// Validated output of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// Raw text of the accepted sampler output.
    pub text: String,
    /// Parsed payload, for structured requests.
    pub data: Option<Value>,
    /// Tokens across every call in the execution, if any call reported them.
    pub tokens_used: Option<u32>,
    /// Model reported by the accepted call.
    pub model: Option<String>,
    /// Sampler calls made.
    pub attempts: u32,
    /// Whether a structured-repair pass was used.
    pub repair_used: bool,
}

/// Transient per-call retry state.
///
/// Lives only for one [`ResilientExecutor::execute`] call and is discarded
/// when it returns, whether by success, failure or deadline.
#[derive(Debug, Clone)]
pub struct RecoverySession {
    attempts: u32,
    max_attempts: u32,
    repairs: u32,
    max_repairs: u32,
    failures: Vec<String>,
    feedback: Option<String>,
    tokens: Option<u32>,
}

impl RecoverySession {
    fn new(config: &RetryConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.attempt_budget(),
            repairs: 0,
            max_repairs: config.max_repair_attempts,
            failures: Vec::new(),
            feedback: None,
            tokens: None,
        }
    }

    /// Sampler calls started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Failure reasons, oldest first.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Whether a structured-repair pass was used.
    pub fn repair_used(&self) -> bool {
        self.repairs > 0
    }

    fn begin_attempt(&mut self) -> u32 {
        debug_assert!(self.attempts < self.max_attempts);
        self.attempts += 1;
        self.attempts
    }

    fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    fn can_repair(&self) -> bool {
        self.repairs < self.max_repairs && self.has_attempts_left()
    }

    fn record_failure(&mut self, error: &KilnError) {
        self.failures.push(error.to_string());
    }

    fn begin_repair(&mut self, feedback: String) {
        self.repairs += 1;
        self.feedback = Some(feedback);
    }

    fn add_tokens(&mut self, tokens: Option<u32>) {
        if let Some(t) = tokens {
            self.tokens = Some(self.tokens.unwrap_or(0).saturating_add(t));
        }
    }

    fn exhausted(&self, last: &KilnError) -> KilnError {
        KilnError::RetryBudgetExhausted {
            attempts: self.attempts,
            last_reason: last.to_string(),
            repair_attempted: self.repair_used(),
        }
    }
}

/// Wraps a [`Sampler`] with bounded retry, backoff and structured repair.
///
/// Each `execute` call is independent; the only shared state is the
/// injected [`GenerationMetrics`] handle, which updates atomically.
pub struct ResilientExecutor {
    sampler: Option<Arc<dyn Sampler>>,
    config: RetryConfig,
    validator: Arc<SchemaValidator>,
    metrics: Arc<GenerationMetrics>,
}

impl ResilientExecutor {
    /// Create an executor around `sampler`.
    pub fn new(sampler: Arc<dyn Sampler>, config: RetryConfig) -> Self {
        Self {
            sampler: Some(sampler),
            config,
            validator: Arc::new(SchemaValidator::new()),
            metrics: Arc::new(GenerationMetrics::new()),
        }
    }

    /// Create an executor with no sampler. Every call fails with
    /// `SamplerUnavailable`.
    pub fn without_sampler(config: RetryConfig) -> Self {
        Self {
            sampler: None,
            config,
            validator: Arc::new(SchemaValidator::new()),
            metrics: Arc::new(GenerationMetrics::new()),
        }
    }

    /// Share a metrics handle.
    pub fn with_metrics(mut self, metrics: Arc<GenerationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share a schema validator.
    pub fn with_validator(mut self, validator: Arc<SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<GenerationMetrics> {
        &self.metrics
    }

    pub fn validator(&self) -> &Arc<SchemaValidator> {
        &self.validator
    }

    pub fn has_sampler(&self) -> bool {
        self.sampler.is_some()
    }

    fn sampler(&self) -> Result<&Arc<dyn Sampler>> {
        self.sampler.as_ref().ok_or(KilnError::SamplerUnavailable)
    }

    /// Resilient mode: retry with backoff, repair structured output.
    #[instrument(skip(self, request), fields(template = %request.template_id, structured = request.is_structured()))]
    pub async fn execute(&self, request: &GenerationRequest) -> Result<ExecutionOutput> {
        let sampler = self.sampler()?;
        if let Some(schema) = &request.schema {
            // A broken schema is a caller bug; fail before spending calls.
            self.validator.check_schema(schema)?;
        }

        let mut session = RecoverySession::new(&self.config);
        loop {
            let attempt = session.begin_attempt();
            let call = SampleRequest {
                request,
                attempt,
                repair_feedback: session.feedback.clone(),
            };

            let outcome = match sampler.sample(&call).await {
                Ok(output) => {
                    session.add_tokens(output.token_count);
                    self.record_tokens(output.token_count);
                    self.accept(request, output)
                }
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(accepted) => {
                    if session.attempts > 1 {
                        self.metrics.record_recovery_outcome(true);
                    }
                    debug!(attempts = session.attempts, sampler = sampler.name(), "execution succeeded");
                    return Ok(ExecutionOutput {
                        tokens_used: session.tokens,
                        attempts: session.attempts,
                        repair_used: session.repair_used(),
                        ..accepted
                    });
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                self.finish_failed(&session);
                return Err(error);
            }

            session.record_failure(&error);
            let retry = match (&request.schema, error.is_structural()) {
                (Some(schema), true) if session.can_repair() => {
                    session.begin_repair(repair_feedback(&error, schema));
                    metrics::counter!(telemetry::REPAIRS_TOTAL).increment(1);
                    true
                }
                (_, true) => false,
                (_, false) => session.has_attempts_left(),
            };
            if !retry {
                self.finish_failed(&session);
                return Err(session.exhausted(&error));
            }

            self.metrics.record_recovery_attempt();
            metrics::counter!(telemetry::RETRIES_TOTAL).increment(1);
            let delay = self.config.effective_delay(attempt - 1);
            warn!(
                sampler = sampler.name(),
                attempt,
                max_attempts = session.max_attempts,
                repair = session.feedback.is_some(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after failed sample"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Resilient mode under an overall deadline.
    ///
    /// When the deadline passes, the in-flight sampler call or backoff is
    /// dropped and `Timeout` is returned. Retry state is discarded.
    pub async fn execute_with_deadline(
        &self,
        request: &GenerationRequest,
        deadline: Duration,
    ) -> Result<ExecutionOutput> {
        tokio::time::timeout(deadline, self.execute(request))
            .await
            .map_err(|_| KilnError::Timeout { after: deadline })?
    }

    /// Plain mode: exactly one sampler call, no retry.
    ///
    /// Structured output is still parsed and validated, but a failure is
    /// returned as-is instead of being repaired.
    #[instrument(skip(self, request), fields(template = %request.template_id))]
    pub async fn execute_plain(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<ExecutionOutput> {
        let sampler = self.sampler()?;
        let call = SampleRequest::new(request);
        let output = tokio::time::timeout(timeout, sampler.sample(&call))
            .await
            .map_err(|_| KilnError::Timeout { after: timeout })??;
        self.record_tokens(output.token_count);
        let tokens = output.token_count;
        let accepted = self.accept(request, output)?;
        Ok(ExecutionOutput {
            tokens_used: tokens,
            attempts: 1,
            repair_used: false,
            ..accepted
        })
    }

    /// Check one sampler output against the request's declared format.
    fn accept(&self, request: &GenerationRequest, output: SampleOutput) -> Result<ExecutionOutput> {
        if output.text.trim().is_empty() {
            return Err(KilnError::Sampler("empty response".into()));
        }
        let data = match &request.schema {
            Some(schema) => {
                let value = extract_json(&output.text)?;
                self.validator.validate(schema, &value)?;
                Some(value)
            }
            None => None,
        };
        Ok(ExecutionOutput {
            text: output.text,
            data,
            tokens_used: output.token_count,
            model: output.model,
            attempts: 1,
            repair_used: false,
        })
    }

    fn record_tokens(&self, tokens: Option<u32>) {
        if let Some(t) = tokens {
            self.metrics.record_tokens(t);
            metrics::counter!(telemetry::TOKENS_TOTAL).increment(u64::from(t));
        }
    }

    fn finish_failed(&self, session: &RecoverySession) {
        if session.attempts > 1 {
            self.metrics.record_recovery_outcome(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_repair_budget_respects_attempts() {
        let config = RetryConfig::new().max_attempts(2).max_repair_attempts(5);
        let mut session = RecoverySession::new(&config);
        session.begin_attempt();
        assert!(session.can_repair());
        session.begin_repair("fix".into());
        session.begin_attempt();
        assert!(!session.can_repair(), "no attempts left for another repair");
        assert!(session.repair_used());
    }

    #[test]
    fn session_accumulates_reported_tokens_only() {
        let mut session = RecoverySession::new(&RetryConfig::new());
        session.add_tokens(None);
        assert_eq!(session.tokens, None);
        session.add_tokens(Some(10));
        session.add_tokens(None);
        session.add_tokens(Some(5));
        assert_eq!(session.tokens, Some(15));
    }

    #[test]
    fn exhausted_carries_context() {
        let mut session = RecoverySession::new(&RetryConfig::new());
        session.begin_attempt();
        session.begin_repair("fix".into());
        session.begin_attempt();
        let err = session.exhausted(&KilnError::ParseFailed("eof".into()));
        match err {
            KilnError::RetryBudgetExhausted {
                attempts,
                last_reason,
                repair_attempted,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_reason.contains("eof"));
                assert!(repair_attempted);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
