//! Candidate generation.
//!
//! A [`CandidateGenerator`] produces up to `count` Dockerfile drafts for a
//! [`ProjectContext`], one per [`Strategy`], in fixed strategy order.
//! Two implementations ship:
//!
//! - [`TemplateGenerator`] renders deterministic templates without a sampler.
//! - [`SamplerGenerator`] asks a [`ResilientExecutor`] for one draft per
//!   strategy, concurrently.
//!
//! A strategy that fails is logged and skipped; the call fails with
//! [`KilnError::NoCandidates`] only when nothing survives.

pub mod context;
pub mod strategy;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{instrument, warn};

use crate::dockerfile;
use crate::executor::{ResilientExecutor, strip_code_fence};
use crate::telemetry;
use crate::types::Candidate;
use crate::{KilnError, Result};

pub use context::{Language, ProjectContext};
pub use strategy::{Strategy, estimate_metadata};

/// Default template id for sampler-backed Dockerfile requests.
pub const DOCKERFILE_TEMPLATE: &str = "dockerfile-basic";

/// Produces candidate drafts for a project.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Generator name for logging.
    fn name(&self) -> &str;

    /// Strategies in generation order.
    fn strategies(&self) -> &[Strategy];

    /// Produce up to `count` candidates. Returns exactly the available
    /// strategies when `count` exceeds them; never duplicates a strategy.
    async fn generate(&self, context: &ProjectContext, count: usize) -> Result<Vec<Candidate>>;
}

/// Check that `content` is a structurally valid Dockerfile.
pub fn validate_dockerfile(strategy: Strategy, content: &str) -> Result<()> {
    dockerfile::validate(content).map_err(|reason| KilnError::GenerationInvalid {
        strategy: strategy.to_string(),
        reason,
    })
}

fn select(strategies: &[Strategy], count: usize) -> Result<&[Strategy]> {
    if count == 0 {
        return Err(KilnError::InvalidInput("candidate count must be at least 1".into()));
    }
    Ok(&strategies[..count.min(strategies.len())])
}

/// Keep successes in order; fail only when none succeeded.
fn collect(results: Vec<(Strategy, Result<Candidate>)>) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (strategy, result) in results {
        match result {
            Ok(candidate) => {
                metrics::counter!(telemetry::CANDIDATES_TOTAL, "strategy" => strategy.as_str(), "status" => "ok")
                    .increment(1);
                candidates.push(candidate);
            }
            Err(e) => {
                metrics::counter!(telemetry::CANDIDATES_TOTAL, "strategy" => strategy.as_str(), "status" => "error")
                    .increment(1);
                warn!(strategy = %strategy, error = %e, "strategy failed, skipping");
                failures.push(e.to_string());
            }
        }
    }
    if candidates.is_empty() {
        return Err(KilnError::NoCandidates { failures });
    }
    Ok(candidates)
}

/// Renders candidates from built-in templates.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    strategies: Vec<Strategy>,
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self {
            strategies: Strategy::ALL.to_vec(),
        }
    }
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to `strategies`, in the given order. Duplicates are dropped.
    pub fn with_strategies(strategies: impl IntoIterator<Item = Strategy>) -> Self {
        let mut unique: Vec<Strategy> = Vec::new();
        for s in strategies {
            if !unique.contains(&s) {
                unique.push(s);
            }
        }
        Self { strategies: unique }
    }
}

#[async_trait]
impl CandidateGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    #[instrument(skip(self, context), fields(language = %context.language))]
    async fn generate(&self, context: &ProjectContext, count: usize) -> Result<Vec<Candidate>> {
        let results = select(&self.strategies, count)?
            .iter()
            .enumerate()
            .map(|(ordinal, &strategy)| {
                let candidate = strategy.render(context).map(|content| {
                    let mut metadata = estimate_metadata(&content, context.language);
                    // Rendering never touches a sampler.
                    metadata.tokens_used = Some(0);
                    Candidate::new(ordinal, strategy.as_str(), content, strategy.confidence(), metadata)
                });
                (strategy, candidate)
            })
            .collect();
        collect(results)
    }
}

/// Asks a sampler for one draft per strategy.
///
/// Each strategy becomes one resilient execution of a request built from
/// the context plus `strategy` and `strategy_brief` variables. Calls run
/// concurrently; results keep strategy order.
pub struct SamplerGenerator {
    executor: Arc<ResilientExecutor>,
    strategies: Vec<Strategy>,
    template_id: String,
}

impl SamplerGenerator {
    pub fn new(executor: Arc<ResilientExecutor>) -> Self {
        Self {
            executor,
            strategies: Strategy::ALL.to_vec(),
            template_id: DOCKERFILE_TEMPLATE.to_string(),
        }
    }

    pub fn template_id(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    /// Restrict to `strategies`, in the given order. Duplicates are dropped.
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        self.strategies = TemplateGenerator::with_strategies(strategies).strategies;
        self
    }

    async fn draft(&self, context: &ProjectContext, ordinal: usize, strategy: Strategy) -> Result<Candidate> {
        let request = context
            .to_request(self.template_id.clone())
            .variable("strategy", strategy.as_str())
            .variable("strategy_brief", strategy.brief());
        let output = self.executor.execute(&request).await?;

        let content = strip_code_fence(&output.text);
        validate_dockerfile(strategy, content)?;

        let mut metadata = estimate_metadata(content, context.language);
        metadata.tokens_used = output.tokens_used;
        // 0.1 off per extra attempt.
        let penalty = 0.1 * f64::from(output.attempts.saturating_sub(1));
        Ok(Candidate::new(
            ordinal,
            strategy.as_str(),
            content,
            strategy.confidence() - penalty,
            metadata,
        ))
    }
}

#[async_trait]
impl CandidateGenerator for SamplerGenerator {
    fn name(&self) -> &str {
        "sampler"
    }

    fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    #[instrument(skip(self, context), fields(language = %context.language, template = %self.template_id))]
    async fn generate(&self, context: &ProjectContext, count: usize) -> Result<Vec<Candidate>> {
        let selected = select(&self.strategies, count)?;
        let drafts = selected
            .iter()
            .enumerate()
            .map(|(ordinal, &strategy)| async move {
                (strategy, self.draft(context, ordinal, strategy).await)
            });
        collect(join_all(drafts).await)
    }
}
