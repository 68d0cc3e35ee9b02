use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ChainHint, ToolHandler, ToolOutput, parse_args};
use crate::generate::ProjectContext;
use crate::pipeline::{Pipeline, RankOptions};
use crate::{KilnError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    /// Project directory to inspect.
    path: Option<PathBuf>,
    /// Pre-computed context, instead of `path`.
    context: Option<ProjectContext>,
    count: Option<usize>,
    top_k: Option<usize>,
    profile: Option<String>,
}

/// Generates and ranks Dockerfiles for a project.
pub struct DockerfileTool {
    pipeline: Arc<Pipeline>,
}

impl DockerfileTool {
    pub const NAME: &'static str = "generate_dockerfile";

    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    fn parse(&self, args: &Value) -> Result<Args> {
        let args: Args = parse_args(Self::NAME, args)?;
        match (&args.path, &args.context) {
            (None, None) => {
                return Err(KilnError::InvalidInput(format!(
                    "{}: one of 'path' or 'context' is required",
                    Self::NAME
                )));
            }
            (Some(_), Some(_)) => {
                return Err(KilnError::InvalidInput(format!(
                    "{}: 'path' and 'context' are mutually exclusive",
                    Self::NAME
                )));
            }
            _ => {}
        }
        if args.count == Some(0) {
            return Err(KilnError::InvalidInput(format!("{}: 'count' must be at least 1", Self::NAME)));
        }
        if args.top_k == Some(0) {
            return Err(KilnError::InvalidInput(format!("{}: 'top_k' must be at least 1", Self::NAME)));
        }
        if let Some(profile) = &args.profile {
            self.pipeline.scorer().profiles().get(profile)?;
        }
        Ok(args)
    }
}

#[async_trait]
impl ToolHandler for DockerfileTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Generate Dockerfile candidates for a project and rank them"
    }

    fn validate(&self, args: &Value) -> Result<()> {
        self.parse(args).map(|_| ())
    }

    async fn handle(&self, args: &Value) -> Result<ToolOutput> {
        let args = self.parse(args)?;
        let context = match args.context {
            Some(context) => context,
            None => ProjectContext::detect(args.path.unwrap_or_default())?,
        };

        let mut options = RankOptions::new();
        options.count = args.count;
        options.top_k = args.top_k;
        options.profile = args.profile;
        let ranked = self.pipeline.generate_ranked(&context, &options).await?;

        let strategy = ranked.best.strategy.clone().unwrap_or_default();
        let summary = if ranked.cached {
            format!("{} Dockerfile for {} (cached)", strategy, context.name)
        } else {
            format!(
                "{} Dockerfile for {} ranked best of {} under '{}'",
                strategy,
                context.name,
                ranked.candidates.len(),
                ranked.profile
            )
        };
        Ok(ToolOutput {
            tool: Self::NAME.to_string(),
            summary,
            content: json!({
                "project": context.name,
                "language": context.language,
                "profile": ranked.profile,
                "cached": ranked.cached,
                "best": {
                    "strategy": ranked.best.strategy,
                    "dockerfile": ranked.best.content,
                },
                "candidates": ranked.candidates,
            }),
        })
    }

    fn describe_chain_hint(&self, output: &ToolOutput) -> Option<ChainHint> {
        let dockerfile = output.content.pointer("/best/dockerfile")?.as_str()?;
        let project = output
            .content
            .get("project")
            .and_then(Value::as_str)
            .unwrap_or("app");
        Some(ChainHint {
            next_tool: "build_image".to_string(),
            reason: "a ranked Dockerfile is ready to build".to_string(),
            arguments: json!({
                "dockerfile": dockerfile,
                "tag": format!("{project}:latest"),
            }),
        })
    }
}
