//! Kiln - cached, resilient, ranked artifact generation
//!
//! This crate sits between an application and an unreliable text
//! generator (a [`Sampler`]). It provides:
//!
//! - a fingerprinted TTL + LRU [response cache](cache) so identical requests
//!   are not sampled twice
//! - a [resilient executor](executor) with bounded retry, exponential
//!   backoff and a structured-repair path for JSON output
//! - [candidate generation](generate) of Dockerfiles from several
//!   deterministic strategies
//! - [scoring and ranking](scoring) of candidates under named weight profiles
//!
//! The [`Pipeline`] wires them together.
//!
//! # Ranked Generation Example
//!
//! ```rust,no_run
//! use kiln::{Pipeline, ProjectContext, RankOptions};
//!
//! #[tokio::main]
//! async fn main() -> kiln::Result<()> {
//!     let pipeline = Pipeline::builder().build()?;
//!     let context = ProjectContext::detect("./my-service")?;
//!
//!     let ranked = pipeline
//!         .generate_ranked(&context, &RankOptions::new().profile("production"))
//!         .await?;
//!
//!     println!("{}", ranked.best.content);
//!     Ok(())
//! }
//! ```
//!
//! # Structured Generation Example
//!
//! ```rust,ignore
//! use kiln::{GenerationRequest, OutputSchema, Pipeline};
//! use serde_json::json;
//!
//! let pipeline = Pipeline::builder().sampler(my_sampler).build()?;
//! let request = GenerationRequest::new("service-summary")
//!     .variable("service", "billing")
//!     .schema(OutputSchema::new("summary", json!({
//!         "type": "object",
//!         "required": ["name", "port"],
//!     })));
//!
//! let result = pipeline.generate(&request).await?;
//! println!("{}", result.data.unwrap_or_default());
//! ```

pub mod cache;
pub mod config;
pub mod dockerfile;
pub mod error;
pub mod executor;
pub mod generate;
pub mod pipeline;
pub mod sampler;
pub mod schema;
pub mod scoring;
pub mod stats;
pub mod telemetry;
pub mod tools;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStats, CachedArtifact, Fingerprint, ResponseCache};
pub use config::Config;
pub use error::{KilnError, Result};
pub use executor::{ExecutionOutput, RecoverySession, ResilientExecutor, RetryConfig};
pub use generate::{
    CandidateGenerator, Language, ProjectContext, SamplerGenerator, Strategy, TemplateGenerator,
};
pub use pipeline::{Generation, Pipeline, PipelineBuilder, RankOptions, RankedGeneration};
pub use sampler::{SampleOutput, SampleRequest, Sampler};
pub use schema::SchemaValidator;
pub use scoring::{ProfileSet, Ranker, Ranking, Scorer, WeightProfile};
pub use stats::{FALLBACK_TOKEN_ESTIMATE, GenerationMetrics, MetricsSnapshot};
pub use tools::{ChainHint, DockerfileTool, ScoreTool, ToolHandler, ToolOutput, ToolRegistry};

// Re-export all types
pub use types::{
    Candidate, CandidateMetadata, Criterion, GenerationRequest, OutputSchema, SamplingParams,
    ScoreBreakdown, ScoredCandidate,
};
