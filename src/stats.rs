//! Queryable generation metrics.
//!
//! [`GenerationMetrics`] is an explicit handle passed (as `Arc`) into the
//! executor and pipeline. Every update is a single atomic operation, so
//! concurrent executions share one handle without locking. Callers read a
//! [`MetricsSnapshot`] on demand and may [`reset`](GenerationMetrics::reset).
//!
//! This is separate from the `metrics` facade counters named in
//! [`telemetry`](crate::telemetry): those are exported to whatever recorder
//! the host installs, this one is read back by the host directly.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Tokens credited per cache hit when the original call's cost is unknown.
///
/// An approximation, not a measured value.
pub const FALLBACK_TOKEN_ESTIMATE: u64 = 1_000;

/// Shared atomic counters.
#[derive(Debug, Default)]
pub struct GenerationMetrics {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    recovery_attempts: AtomicU64,
    recoveries_succeeded: AtomicU64,
    recoveries_failed: AtomicU64,
    tokens_used: AtomicU64,
    tokens_saved: AtomicU64,
}

impl GenerationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache hit, crediting the cached cost (or the fallback
    /// estimate) as tokens saved.
    pub fn record_cache_hit(&self, cost_hint: Option<u32>) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        let saved = cost_hint.map_or(FALLBACK_TOKEN_ESTIMATE, u64::from);
        self.tokens_saved.fetch_add(saved, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One retry or repair pass beyond the initial sampler call.
    pub fn record_recovery_attempt(&self) {
        self.recovery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Outcome of an execution that needed at least one recovery attempt.
    pub fn record_recovery_outcome(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.recoveries_succeeded
        } else {
            &self.recoveries_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tokens(&self, tokens: u32) {
        self.tokens_used
            .fetch_add(u64::from(tokens), Ordering::Relaxed);
    }

    /// Read every counter.
    ///
    /// Counters are read individually, so a snapshot taken during heavy
    /// concurrent updates may mix slightly different instants.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            recovery_attempts: self.recovery_attempts.load(Ordering::Relaxed),
            recoveries_succeeded: self.recoveries_succeeded.load(Ordering::Relaxed),
            recoveries_failed: self.recoveries_failed.load(Ordering::Relaxed),
            tokens_used: self.tokens_used.load(Ordering::Relaxed),
            tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.cache_hits,
            &self.cache_misses,
            &self.recovery_attempts,
            &self.recoveries_succeeded,
            &self.recoveries_failed,
            &self.tokens_used,
            &self.tokens_saved,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Read-only view of [`GenerationMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub recovery_attempts: u64,
    pub recoveries_succeeded: u64,
    pub recoveries_failed: u64,
    pub tokens_used: u64,
    /// Estimated; see [`FALLBACK_TOKEN_ESTIMATE`].
    pub tokens_saved: u64,
}

impl MetricsSnapshot {
    /// Hits over lookups, 0.0 when nothing was looked up.
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    /// Recovered executions over executions that needed recovery.
    pub fn recovery_success_rate(&self) -> f64 {
        ratio(
            self.recoveries_succeeded,
            self.recoveries_succeeded + self.recoveries_failed,
        )
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
