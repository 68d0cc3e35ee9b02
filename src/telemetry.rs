//! Telemetry metric name constants.
//!
//! Centralised metric names for kiln operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! These counters are emitted alongside the explicit
//! [`GenerationMetrics`](crate::stats::GenerationMetrics) handle, which is
//! the queryable snapshot callers read back.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `kiln_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `operation`: entry point (e.g. "generate", "rank")
//! - `status`: "ok" or "error"
//! - `strategy`: candidate strategy name

/// Total generation requests submitted to the pipeline.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "kiln_requests_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "kiln_cache_hits_total";

/// Total response cache misses (expired entries count as misses).
pub const CACHE_MISSES_TOTAL: &str = "kiln_cache_misses_total";

/// Total entries removed from the response cache.
///
/// Labels: `reason` ("capacity", "expired" or "invalid").
pub const CACHE_EVICTIONS_TOTAL: &str = "kiln_cache_evictions_total";

/// Total sampler retries (not counting the initial call).
pub const RETRIES_TOTAL: &str = "kiln_retries_total";

/// Total structured-repair passes.
pub const REPAIRS_TOTAL: &str = "kiln_repairs_total";

/// Total tokens consumed by sampler calls.
pub const TOKENS_TOTAL: &str = "kiln_tokens_total";

/// Total candidates produced.
///
/// Labels: `strategy`, `status` ("ok" | "error").
pub const CANDIDATES_TOTAL: &str = "kiln_candidates_total";
