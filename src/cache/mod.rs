//! Caching subsystem.
//!
//! - [`Fingerprint`]: stable digest of the semantically relevant fields of
//!   a [`GenerationRequest`](crate::GenerationRequest). Two requests that
//!   would produce the same answer fingerprint identically.
//!
//! - [`ResponseCache`]: TTL + LRU store mapping fingerprints to generated
//!   artifacts. Activated by default; opt out via
//!   [`PipelineBuilder::cache()`](crate::PipelineBuilder::cache) with
//!   [`CacheConfig::disabled()`].

pub mod fingerprint;
pub mod response;

pub use fingerprint::Fingerprint;
pub use response::{CacheConfig, CacheHit, CacheStats, CachedArtifact, ResponseCache};
