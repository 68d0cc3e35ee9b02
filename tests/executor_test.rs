use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kiln::{
    GenerationRequest, KilnError, OutputSchema, ResilientExecutor, Result, RetryConfig,
    SampleOutput, SampleRequest, Sampler,
};
use serde_json::json;

/// Mock sampler that fails N times then returns `reply`.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> KilnError,
    reply: &'static str,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> KilnError, reply: &'static str) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            reply,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sampler for FailThenSucceed {
    fn name(&self) -> &str {
        "mock-retry"
    }

    async fn sample(&self, _request: &SampleRequest<'_>) -> Result<SampleOutput> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(SampleOutput::new(self.reply).token_count(10))
    }
}

/// Replays canned replies in order and records the feedback it was sent.
struct Scripted {
    replies: Mutex<VecDeque<&'static str>>,
    feedback: Mutex<Vec<Option<String>>>,
}

impl Scripted {
    fn new(replies: &[&'static str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            feedback: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.feedback.lock().unwrap().len()
    }
}

#[async_trait]
impl Sampler for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn sample(&self, request: &SampleRequest<'_>) -> Result<SampleOutput> {
        self.feedback
            .lock()
            .unwrap()
            .push(request.repair_feedback.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| KilnError::Sampler("script exhausted".into()))?;
        Ok(SampleOutput::new(reply).token_count(5))
    }
}

/// Never answers.
struct Stalled;

#[async_trait]
impl Sampler for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn sample(&self, _request: &SampleRequest<'_>) -> Result<SampleOutput> {
        std::future::pending().await
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(1))
        .jitter(false)
}

fn service_schema() -> OutputSchema {
    OutputSchema::new(
        "service",
        json!({
            "type": "object",
            "required": ["name", "port"],
            "properties": {
                "name": { "type": "string" },
                "port": { "type": "integer" }
            }
        }),
    )
}

#[tokio::test]
async fn retries_transport_errors_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, || KilnError::Sampler("503".into()), "ok"));
    let executor = ResilientExecutor::new(inner.clone(), fast_retry(3));

    let output = executor
        .execute(&GenerationRequest::new("greeting"))
        .await
        .unwrap();

    assert_eq!(output.text, "ok");
    assert_eq!(output.attempts, 3);
    assert!(!output.repair_used);
    assert_eq!(inner.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let inner = Arc::new(FailThenSucceed::new(10, || KilnError::Sampler("reset".into()), "ok"));
    let executor = ResilientExecutor::new(inner.clone(), fast_retry(3));

    let err = executor
        .execute(&GenerationRequest::new("greeting"))
        .await
        .unwrap_err();

    assert_eq!(inner.call_count(), 3);
    match err {
        KilnError::RetryBudgetExhausted {
            attempts,
            last_reason,
            repair_attempted,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_reason.contains("reset"), "{last_reason}");
            assert!(!repair_attempted);
        }
        other => panic!("expected RetryBudgetExhausted, got {other:?}"),
    }
    assert_eq!(executor.metrics().snapshot().recoveries_failed, 1);
}

#[tokio::test]
async fn single_attempt_budget_calls_once() {
    let inner = Arc::new(FailThenSucceed::new(5, || KilnError::Sampler("down".into()), "ok"));
    let executor = ResilientExecutor::new(inner.clone(), RetryConfig::disabled());

    let result = executor.execute(&GenerationRequest::new("greeting")).await;

    assert!(matches!(result, Err(KilnError::RetryBudgetExhausted { attempts: 1, .. })));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test]
async fn repairs_invalid_json_on_second_attempt() {
    let sampler = Arc::new(Scripted::new(&[
        "here you go: {\"name\": \"billing\"",
        "```json\n{\"name\": \"billing\", \"port\": 8080}\n```",
    ]));
    let executor = ResilientExecutor::new(sampler.clone(), fast_retry(3));
    let request = GenerationRequest::new("service").schema(service_schema());

    let output = executor.execute(&request).await.unwrap();

    assert_eq!(sampler.calls(), 2);
    assert_eq!(output.data, Some(json!({"name": "billing", "port": 8080})));
    assert!(output.repair_used);
    assert_eq!(output.tokens_used, Some(10));

    let feedback = sampler.feedback.lock().unwrap().clone();
    assert!(feedback[0].is_none());
    assert!(feedback[1].is_some(), "repair pass must carry feedback");

    let snapshot = executor.metrics().snapshot();
    assert_eq!(snapshot.recovery_attempts, 1);
    assert_eq!(snapshot.recoveries_succeeded, 1);
}

#[tokio::test]
async fn repairs_schema_violation() {
    let sampler = Arc::new(Scripted::new(&[
        r#"{"name": "billing", "port": "eighty"}"#,
        r#"{"name": "billing", "port": 80}"#,
    ]));
    let executor = ResilientExecutor::new(sampler.clone(), fast_retry(3));
    let request = GenerationRequest::new("service").schema(service_schema());

    let output = executor.execute(&request).await.unwrap();

    assert_eq!(output.attempts, 2);
    let feedback = sampler.feedback.lock().unwrap().clone();
    let hint = feedback[1].clone().unwrap_or_default();
    assert!(hint.contains("port"), "feedback should name the field: {hint}");
}

#[tokio::test]
async fn repair_budget_bounds_structural_failures() {
    let sampler = Arc::new(Scripted::new(&["nope", "still nope", "no", "never"]));
    let executor = ResilientExecutor::new(
        sampler.clone(),
        fast_retry(5).max_repair_attempts(1),
    );
    let request = GenerationRequest::new("service").schema(service_schema());

    let err = executor.execute(&request).await.unwrap_err();

    assert_eq!(sampler.calls(), 2);
    assert!(matches!(
        err,
        KilnError::RetryBudgetExhausted {
            repair_attempted: true,
            ..
        }
    ));
}

#[tokio::test]
async fn empty_response_is_retried() {
    let sampler = Arc::new(Scripted::new(&["   ", "hello"]));
    let executor = ResilientExecutor::new(sampler.clone(), fast_retry(3));

    let output = executor
        .execute(&GenerationRequest::new("greeting"))
        .await
        .unwrap();

    assert_eq!(output.text, "hello");
    assert_eq!(sampler.calls(), 2);
}

#[tokio::test]
async fn missing_sampler_fails_without_retry() {
    let executor = ResilientExecutor::without_sampler(fast_retry(3));

    let err = executor
        .execute(&GenerationRequest::new("greeting"))
        .await
        .unwrap_err();

    assert!(matches!(err, KilnError::SamplerUnavailable));
    assert_eq!(executor.metrics().snapshot().recovery_attempts, 0);
}

#[tokio::test]
async fn non_retryable_error_returns_immediately() {
    let inner = Arc::new(FailThenSucceed::new(1, || KilnError::InvalidInput("bad".into()), "ok"));
    let executor = ResilientExecutor::new(inner.clone(), fast_retry(3));

    let err = executor
        .execute(&GenerationRequest::new("greeting"))
        .await
        .unwrap_err();

    assert!(matches!(err, KilnError::InvalidInput(_)));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test]
async fn invalid_schema_fails_before_sampling() {
    let inner = Arc::new(FailThenSucceed::new(0, || KilnError::Sampler("x".into()), "{}"));
    let executor = ResilientExecutor::new(inner.clone(), fast_retry(3));
    let request = GenerationRequest::new("service")
        .schema(OutputSchema::new("broken", json!({"type": "banana"})));

    let result = executor.execute(&request).await;

    assert!(result.is_err());
    assert_eq!(inner.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_stalled_sampler() {
    let executor = ResilientExecutor::new(Arc::new(Stalled), fast_retry(3));

    let err = executor
        .execute_with_deadline(&GenerationRequest::new("greeting"), Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(matches!(err, KilnError::Timeout { after } if after == Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn deadline_cuts_backoff_short() {
    let inner = Arc::new(FailThenSucceed::new(10, || KilnError::Sampler("503".into()), "ok"));
    let config = RetryConfig::new()
        .max_attempts(10)
        .initial_delay(Duration::from_secs(10))
        .jitter(false);
    let executor = ResilientExecutor::new(inner.clone(), config);

    let result = executor
        .execute_with_deadline(&GenerationRequest::new("greeting"), Duration::from_secs(15))
        .await;

    assert!(matches!(result, Err(KilnError::Timeout { .. })));
    // 0s call, 10s backoff, call, then the 20s backoff is cut off.
    assert_eq!(inner.call_count(), 2);
}

#[tokio::test]
async fn plain_mode_makes_exactly_one_call() {
    let inner = Arc::new(FailThenSucceed::new(1, || KilnError::Sampler("503".into()), "ok"));
    let executor = ResilientExecutor::new(inner.clone(), fast_retry(5));

    let err = executor
        .execute_plain(&GenerationRequest::new("greeting"), Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, KilnError::Sampler(_)));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test]
async fn plain_mode_validates_without_repair() {
    let sampler = Arc::new(Scripted::new(&["not json", r#"{"name": "x", "port": 1}"#]));
    let executor = ResilientExecutor::new(sampler.clone(), fast_retry(3));
    let request = GenerationRequest::new("service").schema(service_schema());

    let err = executor
        .execute_plain(&request, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(err.is_structural());
    assert_eq!(sampler.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn plain_mode_times_out() {
    let executor = ResilientExecutor::new(Arc::new(Stalled), fast_retry(3));

    let err = executor
        .execute_plain(&GenerationRequest::new("greeting"), Duration::from_millis(250))
        .await
        .unwrap_err();

    assert!(matches!(err, KilnError::Timeout { .. }));
}
