//! Response cache for generated artifacts.
//!
//! [`ResponseCache`] maps a request [`Fingerprint`] to the artifact that was
//! produced for it, so identical expensive sampler calls are not repeated.
//!
//! # Eviction
//!
//! Two independent rules apply:
//!
//! - **TTL**: every entry expires at `inserted_at + ttl`. Expiry is lazy: a
//!   lookup that finds an expired entry removes it and reports a miss. An
//!   insert also drops expired entries before checking capacity, and
//!   [`ResponseCache::purge_expired`] sweeps on demand.
//! - **LRU**: the store never holds more than `max_entries`. When an insert
//!   would exceed that, the least-recently-accessed entry is evicted first,
//!   under the same lock, so the bound holds at every observable point.
//!
//! Recency is an ever-increasing tick per access, indexed in a `BTreeMap`,
//! so finding the eviction victim is `O(log n)`.
//!
//! # Concurrency
//!
//! All state sits behind one `tokio::sync::Mutex`. Every operation takes the
//! lock once, so a reader never observes a half-written entry. There is no
//! request coalescing: two tasks that miss on the same fingerprint both go to
//! the sampler.
//!
//! Time comes from `tokio::time::Instant`, so tests can pause and advance it.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::fingerprint::Fingerprint;
use crate::telemetry;
use crate::types::GenerationRequest;

/// Configuration for the response cache.
///
/// ```rust
/// # use kiln::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled at all. Default: true.
    pub enabled: bool,
    /// Maximum number of cached entries. Default: 100.
    pub max_entries: usize,
    /// Default time-to-live for cached entries. Default: 15 minutes.
    #[serde(rename = "ttl_secs", alias = "ttl", with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A config with caching switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable caching.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Artifact stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// Raw artifact text.
    pub content: String,
    /// Parsed payload for structured requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Model that produced the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Strategy that produced the artifact (ranked generation only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl CachedArtifact {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
            model: None,
            strategy: None,
        }
    }
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub artifact: CachedArtifact,
    /// Cost of the original call (tokens), if it was known at insert time.
    pub cost_hint: Option<u32>,
    /// Time since the entry was inserted.
    pub age: Duration,
    /// Time since the entry was last read (or inserted, if never read).
    pub idle: Duration,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room (LRU).
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Entries currently resident.
    pub size: usize,
}

struct CacheEntry {
    artifact: CachedArtifact,
    inserted_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
    cost_hint: Option<u32>,
    tick: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, CacheEntry>,
    /// Access tick → key, oldest first.
    recency: BTreeMap<u64, Fingerprint>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl CacheState {
    fn bump_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn touch(&mut self, key: &Fingerprint, now: Instant) {
        let tick = self.bump_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            entry.last_accessed = now;
            self.recency.insert(tick, key.clone());
        }
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.expirations += expired.len() as u64;
        expired.len()
    }

    fn evict_lru(&mut self) -> Option<Fingerprint> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

/// In-memory TTL + LRU cache keyed on request fingerprints.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    ///
    /// `config.enabled` is not consulted here; callers that honour it simply
    /// do not construct a cache.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries: config.max_entries,
            ttl: config.ttl,
        }
    }

    /// Look up the artifact cached for `request`.
    ///
    /// Returns `None` on miss. An expired entry is removed and reported as a
    /// miss. A hit refreshes the entry's recency.
    pub async fn get(&self, request: &GenerationRequest) -> Option<CacheHit> {
        self.get_by_fingerprint(&Fingerprint::of(request)).await
    }

    /// Look up by a precomputed fingerprint.
    pub async fn get_by_fingerprint(&self, key: &Fingerprint) -> Option<CacheHit> {
        self.get_checked(key, |_| Ok(())).await
    }

    /// Look up by fingerprint, accepting the entry only if `check` passes.
    ///
    /// A rejected entry is removed and the lookup counts as a miss.
    pub async fn get_checked<F>(&self, key: &Fingerprint, check: F) -> Option<CacheHit>
    where
        F: FnOnce(&CachedArtifact) -> crate::Result<()>,
    {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let Some(expired) = state.entries.get(key).map(|entry| entry.is_expired(now)) else {
            state.misses += 1;
            drop(state);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            debug!(fingerprint = key.short(), "cache miss");
            return None;
        };

        if expired {
            state.remove(key);
            state.expirations += 1;
            state.misses += 1;
            drop(state);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired").increment(1);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            debug!(fingerprint = key.short(), "cache entry expired");
            return None;
        }

        let rejected = state
            .entries
            .get(key)
            .and_then(|entry| check(&entry.artifact).err());
        if let Some(e) = rejected {
            state.remove(key);
            state.misses += 1;
            drop(state);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "invalid").increment(1);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
            warn!(fingerprint = key.short(), error = %e, "cached entry failed check, dropping");
            return None;
        }

        let idle = state
            .entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.last_accessed))
            .unwrap_or_default();
        state.touch(key, now);
        state.hits += 1;
        let hit = state.entries.get(key).map(|entry| CacheHit {
            artifact: entry.artifact.clone(),
            cost_hint: entry.cost_hint,
            age: now.saturating_duration_since(entry.inserted_at),
            idle,
        });
        drop(state);

        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        debug!(fingerprint = key.short(), "cache hit");
        hit
    }

    /// Cache `artifact` for `request` with the default TTL.
    ///
    /// No-op when `cacheable` is false. Returns whether the entry was stored.
    pub async fn set(
        &self,
        request: &GenerationRequest,
        artifact: CachedArtifact,
        cacheable: bool,
        cost_hint: Option<u32>,
    ) -> bool {
        self.set_with_ttl(request, artifact, cacheable, cost_hint, self.ttl)
            .await
    }

    /// Cache `artifact` for `request` with an explicit TTL.
    pub async fn set_with_ttl(
        &self,
        request: &GenerationRequest,
        artifact: CachedArtifact,
        cacheable: bool,
        cost_hint: Option<u32>,
        ttl: Duration,
    ) -> bool {
        if !cacheable || self.max_entries == 0 {
            return false;
        }
        let key = Fingerprint::of(request);
        let now = Instant::now();
        let mut state = self.state.lock().await;

        // Replacing an entry never needs room.
        state.remove(&key);

        let expired = state.purge_expired(now);
        let mut evicted = 0u64;
        while state.entries.len() >= self.max_entries {
            match state.evict_lru() {
                Some(victim) => {
                    evicted += 1;
                    debug!(fingerprint = victim.short(), "evicted least-recently-used entry");
                }
                None => break,
            }
        }

        let tick = state.bump_tick();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                artifact,
                inserted_at: now,
                last_accessed: now,
                ttl,
                cost_hint,
                tick,
            },
        );
        drop(state);

        if expired > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(expired as u64);
        }
        if evicted > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "capacity")
                .increment(evicted);
        }
        true
    }

    /// Remove the entry for `request`. Returns whether one was present.
    pub async fn delete(&self, request: &GenerationRequest) -> bool {
        let key = Fingerprint::of(request);
        self.state.lock().await.remove(&key).is_some()
    }

    /// Whether a live (unexpired) entry exists, without touching recency.
    pub async fn contains(&self, request: &GenerationRequest) -> bool {
        let key = Fingerprint::of(request);
        let now = Instant::now();
        self.state
            .lock()
            .await
            .entries
            .get(&key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let removed = self.state.lock().await.purge_expired(Instant::now());
        if removed > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(removed as u64);
        }
        removed
    }

    /// Evict all entries. Counters are kept.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.recency.clear();
    }

    /// Number of resident entries (expired ones included until removed).
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            size: state.entries.len(),
        }
    }

    /// Configured capacity.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Configured default TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Serde helper: durations as whole seconds in config files.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str) -> GenerationRequest {
        GenerationRequest::new("t").variable("k", name)
    }

    #[tokio::test(start_paused = true)]
    async fn recency_index_stays_in_sync() {
        let cache = ResponseCache::new(&CacheConfig::new().max_entries(3));
        for name in ["a", "b", "c"] {
            cache.set(&req(name), CachedArtifact::text(name), true, None).await;
        }
        cache.get(&req("a")).await;
        cache.get(&req("a")).await;
        cache.delete(&req("b")).await;

        let state = cache.state.lock().await;
        assert_eq!(state.entries.len(), 2);
        assert_eq!(state.recency.len(), 2);
        for entry in state.entries.values() {
            assert!(state.recency.contains_key(&entry.tick));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hit_updates_last_accessed() {
        let cache = ResponseCache::new(&CacheConfig::default());
        cache.set(&req("a"), CachedArtifact::text("a"), true, None).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        let hit = cache.get(&req("a")).await.unwrap();
        assert_eq!(hit.age, Duration::from_secs(5));
        assert_eq!(hit.idle, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(2)).await;
        let hit = cache.get(&req("a")).await.unwrap();
        assert_eq!(hit.age, Duration::from_secs(7));
        assert_eq!(hit.idle, Duration::from_secs(2));

        let key = Fingerprint::of(&req("a"));
        let state = cache.state.lock().await;
        let entry = &state.entries[&key];
        assert_eq!(
            entry.last_accessed.duration_since(entry.inserted_at),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn config_parses_ttl_seconds() {
        let config: CacheConfig = toml::from_str("ttl_secs = 60\nmax_entries = 5").unwrap();
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.max_entries, 5);
        assert!(config.enabled);
    }
}
