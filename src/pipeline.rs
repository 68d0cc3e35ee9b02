//! Request pipeline.
//!
//! [`Pipeline`] composes the pieces into the two entry points callers use:
//!
//! ```text
//! generate:         cache ─miss─► executor ──► cache.set
//!                     └─hit─► (re-validate) ──► result
//!
//! generate_ranked:  cache ─miss─► generator ──► scorer ──► ranker ──► cache.set(winner)
//!                     └─hit─► cached winner
//! ```
//!
//! Caching is layered here, above the executor, so the executor stays free
//! of side effects other than sampler calls.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::{CacheConfig, CacheStats, CachedArtifact, Fingerprint, ResponseCache};
use crate::config::Config;
use crate::executor::{ResilientExecutor, RetryConfig, extract_json};
use crate::generate::{
    CandidateGenerator, DOCKERFILE_TEMPLATE, ProjectContext, SamplerGenerator, TemplateGenerator,
};
use crate::sampler::Sampler;
use crate::schema::SchemaValidator;
use crate::scoring::{ProfileSet, Ranker, Scorer};
use crate::stats::{GenerationMetrics, MetricsSnapshot};
use crate::telemetry;
use crate::types::{Candidate, GenerationRequest, ScoredCandidate};
use crate::{KilnError, Result};

/// Output of [`Pipeline::generate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub fingerprint: Fingerprint,
    pub text: String,
    /// Parsed payload, for structured requests.
    pub data: Option<Value>,
    pub model: Option<String>,
    /// Tokens spent by this call; `None` on a cache hit or when unreported.
    pub tokens_used: Option<u32>,
    /// Whether the result came from the cache.
    pub cached: bool,
}

/// Options for [`Pipeline::generate_ranked`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankOptions {
    /// Template id the cache key and sampler requests are built from.
    pub template_id: String,
    /// Candidates to generate. `None` uses the pipeline default.
    pub count: Option<usize>,
    /// Ranked candidates to return. `None` returns all.
    pub top_k: Option<usize>,
    /// Weight profile. `None` uses the default profile.
    pub profile: Option<String>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            template_id: DOCKERFILE_TEMPLATE.to_string(),
            count: None,
            top_k: None,
            profile: None,
        }
    }
}

impl RankOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template_id(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Output of [`Pipeline::generate_ranked`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedGeneration {
    pub fingerprint: Fingerprint,
    /// Profile the candidates were scored with.
    pub profile: String,
    /// The winning artifact.
    pub best: CachedArtifact,
    /// Ranked candidates, best first. Empty when served from the cache.
    pub candidates: Vec<ScoredCandidate>,
    pub cached: bool,
}

/// Cache, executor, generator and scorer wired together.
pub struct Pipeline {
    cache: Option<ResponseCache>,
    executor: Arc<ResilientExecutor>,
    generator: Arc<dyn CandidateGenerator>,
    scorer: Scorer,
    metrics: Arc<GenerationMetrics>,
    validator: Arc<SchemaValidator>,
    candidates: usize,
    min_cacheable_confidence: f64,
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared metrics handle.
    pub fn metrics_handle(&self) -> &Arc<GenerationMetrics> {
        &self.metrics
    }

    /// Cache counters, or `None` when caching is disabled.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            Some(cache) => Some(cache.stats().await),
            None => None,
        }
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn generator(&self) -> &Arc<dyn CandidateGenerator> {
        &self.generator
    }

    /// Generate text (or structured data) for `request`.
    ///
    /// Applies the configured deadline, if any.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        match self.deadline {
            Some(deadline) => self.generate_with_deadline(request, deadline).await,
            None => self.generate_inner(request).await,
        }
    }

    /// [`generate`](Self::generate) under an explicit deadline.
    ///
    /// On expiry in-flight sampler work is abandoned and nothing is cached.
    pub async fn generate_with_deadline(
        &self,
        request: &GenerationRequest,
        deadline: Duration,
    ) -> Result<Generation> {
        let result = tokio::time::timeout(deadline, self.generate_inner(request))
            .await
            .unwrap_or(Err(KilnError::Timeout { after: deadline }));
        if matches!(result, Err(KilnError::Timeout { .. })) {
            record_request("generate", false);
        }
        result
    }

    #[instrument(skip(self, request), fields(template = %request.template_id))]
    async fn generate_inner(&self, request: &GenerationRequest) -> Result<Generation> {
        self.metrics.record_request();
        let fingerprint = Fingerprint::of(request);

        if let Some(artifact) = self.lookup(request, &fingerprint).await {
            record_request("generate", true);
            return Ok(Generation {
                fingerprint,
                text: artifact.content,
                data: artifact.data,
                model: artifact.model,
                tokens_used: None,
                cached: true,
            });
        }

        let output = match self.executor.execute(request).await {
            Ok(output) => output,
            Err(e) => {
                record_request("generate", false);
                return Err(e);
            }
        };
        if let Some(cache) = &self.cache {
            let artifact = CachedArtifact {
                content: output.text.clone(),
                data: output.data.clone(),
                model: output.model.clone(),
                strategy: None,
            };
            cache.set(request, artifact, true, output.tokens_used).await;
        }
        record_request("generate", true);

        Ok(Generation {
            fingerprint,
            text: output.text,
            data: output.data,
            model: output.model,
            tokens_used: output.tokens_used,
            cached: false,
        })
    }

    /// Cache lookup with metrics. Cached structured results are
    /// re-validated; an invalid one is dropped by the cache and counted as
    /// a miss.
    async fn lookup(&self, request: &GenerationRequest, key: &Fingerprint) -> Option<CachedArtifact> {
        let cache = self.cache.as_ref()?;
        let hit = cache
            .get_checked(key, |artifact| match &request.schema {
                Some(schema) => match &artifact.data {
                    Some(data) => self.validator.validate(schema, data),
                    None => extract_json(&artifact.content)
                        .and_then(|data| self.validator.validate(schema, &data)),
                },
                None => Ok(()),
            })
            .await;

        match hit {
            Some(hit) => {
                self.metrics.record_cache_hit(hit.cost_hint);
                Some(hit.artifact)
            }
            None => {
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    /// Produce candidates for `context` without scoring.
    pub async fn generate_candidates(&self, context: &ProjectContext, count: usize) -> Result<Vec<Candidate>> {
        self.generator.generate(context, count).await
    }

    /// Score candidates under a profile (default when `None`). Ranks are
    /// left unassigned.
    pub fn score(&self, candidates: &[Candidate], profile: Option<&str>) -> Result<Vec<ScoredCandidate>> {
        self.scorer.score(candidates, profile)
    }

    /// Generate, score and rank candidates for `context`.
    ///
    /// The winner is cached when its confidence reaches the configured
    /// threshold. Applies the configured deadline, if any.
    pub async fn generate_ranked(
        &self,
        context: &ProjectContext,
        options: &RankOptions,
    ) -> Result<RankedGeneration> {
        match self.deadline {
            Some(deadline) => {
                let result = tokio::time::timeout(deadline, self.generate_ranked_inner(context, options))
                    .await
                    .unwrap_or(Err(KilnError::Timeout { after: deadline }));
                if matches!(result, Err(KilnError::Timeout { .. })) {
                    record_request("rank", false);
                }
                result
            }
            None => self.generate_ranked_inner(context, options).await,
        }
    }

    #[instrument(skip(self, context, options), fields(language = %context.language, template = %options.template_id))]
    async fn generate_ranked_inner(
        &self,
        context: &ProjectContext,
        options: &RankOptions,
    ) -> Result<RankedGeneration> {
        self.metrics.record_request();
        let profile = self
            .scorer
            .profiles()
            .resolve(options.profile.as_deref())
            .inspect_err(|_| record_request("rank", false))?
            .name()
            .to_string();
        let count = options.count.unwrap_or(self.candidates);
        let request = context
            .to_request(options.template_id.clone())
            .context("kiln.candidates", count.to_string())
            .context("kiln.profile", profile.clone());
        let fingerprint = Fingerprint::of(&request);

        if let Some(best) = self.lookup(&request, &fingerprint).await {
            record_request("rank", true);
            return Ok(RankedGeneration {
                fingerprint,
                profile,
                best,
                candidates: Vec::new(),
                cached: true,
            });
        }

        let result = self.rank_fresh(context, count, &profile).await;
        let ranked = match result {
            Ok(ranked) => ranked,
            Err(e) => {
                record_request("rank", false);
                return Err(e);
            }
        };

        let Some(winner) = ranked.first() else {
            record_request("rank", false);
            return Err(KilnError::NoCandidates { failures: Vec::new() });
        };
        let best = CachedArtifact {
            content: winner.candidate.content.clone(),
            data: None,
            model: None,
            strategy: Some(winner.candidate.strategy.clone()),
        };
        if let Some(cache) = &self.cache {
            let cacheable = winner.candidate.confidence >= self.min_cacheable_confidence;
            let cost = ranked
                .iter()
                .filter_map(|s| s.candidate.metadata.tokens_used)
                .reduce(u32::saturating_add);
            if !cacheable {
                debug!(confidence = winner.candidate.confidence, "winner below cacheable confidence");
            }
            cache.set(&request, best.clone(), cacheable, cost).await;
        }
        record_request("rank", true);

        let mut candidates = ranked;
        if let Some(k) = options.top_k {
            candidates.truncate(k);
        }
        Ok(RankedGeneration {
            fingerprint,
            profile,
            best,
            candidates,
            cached: false,
        })
    }

    async fn rank_fresh(&self, context: &ProjectContext, count: usize, profile: &str) -> Result<Vec<ScoredCandidate>> {
        let candidates = self.generator.generate(context, count).await?;
        let scored = self.scorer.score(&candidates, Some(profile))?;
        Ok(Ranker::new().rank(scored).into_vec())
    }
}

fn record_request(operation: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(telemetry::REQUESTS_TOTAL, "operation" => operation, "status" => status).increment(1);
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    sampler: Option<Arc<dyn Sampler>>,
    generator: Option<Arc<dyn CandidateGenerator>>,
    cache: CacheConfig,
    retry: RetryConfig,
    profiles: ProfileSet,
    metrics: Option<Arc<GenerationMetrics>>,
    candidates: usize,
    min_cacheable_confidence: f64,
    deadline: Option<Duration>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            generator: None,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            profiles: ProfileSet::builtin(),
            metrics: None,
            candidates: 3,
            min_cacheable_confidence: 0.5,
            deadline: None,
        }
    }

    /// Apply every section of a loaded [`Config`].
    pub fn config(mut self, config: &Config) -> Result<Self> {
        self.cache = config.cache.clone();
        self.retry = config.retry_config();
        self.profiles = config.profile_set()?;
        self.candidates = config.generation.candidates;
        self.min_cacheable_confidence = config.generation.min_cacheable_confidence;
        self.deadline = config.generation.deadline();
        Ok(self)
    }

    /// Sampler used by `generate` and, unless a generator is set, by
    /// ranked generation.
    pub fn sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    pub fn shared_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Candidate generator. Defaults to a [`SamplerGenerator`] when a sampler
    /// is set, else a [`TemplateGenerator`].
    pub fn generator(mut self, generator: impl CandidateGenerator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn profiles(mut self, profiles: ProfileSet) -> Self {
        self.profiles = profiles;
        self
    }

    /// Share a metrics handle with other components.
    pub fn metrics(mut self, metrics: Arc<GenerationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Default candidate count for ranked generation.
    pub fn candidates(mut self, count: usize) -> Self {
        self.candidates = count;
        self
    }

    pub fn min_cacheable_confidence(mut self, confidence: f64) -> Self {
        self.min_cacheable_confidence = confidence;
        self
    }

    /// Deadline applied to every `generate` and `generate_ranked` call.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        if !(0.0..=1.0).contains(&self.min_cacheable_confidence) {
            return Err(KilnError::Configuration(format!(
                "min_cacheable_confidence must be within 0..=1, got {}",
                self.min_cacheable_confidence
            )));
        }
        if self.candidates == 0 {
            return Err(KilnError::Configuration(
                "candidate count must be at least 1".to_string(),
            ));
        }

        let metrics = self.metrics.unwrap_or_default();
        let validator = Arc::new(SchemaValidator::new());
        let executor = match self.sampler {
            Some(sampler) => ResilientExecutor::new(sampler, self.retry),
            None => ResilientExecutor::without_sampler(self.retry),
        };
        let executor = Arc::new(
            executor
                .with_metrics(metrics.clone())
                .with_validator(validator.clone()),
        );
        let generator: Arc<dyn CandidateGenerator> = match self.generator {
            Some(generator) => generator,
            None if executor.has_sampler() => Arc::new(SamplerGenerator::new(executor.clone())),
            None => Arc::new(TemplateGenerator::new()),
        };
        let cache = self
            .cache
            .enabled
            .then(|| ResponseCache::new(&self.cache));

        debug!(
            cache = cache.is_some(),
            generator = generator.name(),
            candidates = self.candidates,
            "pipeline built"
        );
        Ok(Pipeline {
            cache,
            executor,
            generator,
            scorer: Scorer::new(self.profiles),
            metrics,
            validator,
            candidates: self.candidates,
            min_cacheable_confidence: self.min_cacheable_confidence,
            deadline: self.deadline,
        })
    }
}
