use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ChainHint, ToolHandler, ToolOutput, parse_args};
use crate::dockerfile;
use crate::generate::{Language, estimate_metadata};
use crate::scoring::Scorer;
use crate::types::Candidate;
use crate::{KilnError, Result};

/// Best aggregate below which the tool suggests regenerating.
pub const REGENERATE_BELOW: f64 = 60.0;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    dockerfiles: Vec<NamedDockerfile>,
    #[serde(default)]
    profile: Option<String>,
    /// Language hint for the size and build-time estimates.
    #[serde(default)]
    language: Option<Language>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamedDockerfile {
    name: String,
    content: String,
}

/// Scores and ranks existing Dockerfiles.
pub struct ScoreTool {
    scorer: Scorer,
    regenerate_below: f64,
}

impl ScoreTool {
    pub const NAME: &'static str = "score_dockerfile";

    pub fn new(scorer: Scorer) -> Self {
        Self {
            scorer,
            regenerate_below: REGENERATE_BELOW,
        }
    }

    /// Override the regeneration threshold.
    pub fn regenerate_below(mut self, threshold: f64) -> Self {
        self.regenerate_below = threshold;
        self
    }

    fn parse(&self, args: &Value) -> Result<Args> {
        let args: Args = parse_args(Self::NAME, args)?;
        if args.dockerfiles.is_empty() {
            return Err(KilnError::InvalidInput(format!(
                "{}: 'dockerfiles' must not be empty",
                Self::NAME
            )));
        }
        for file in &args.dockerfiles {
            dockerfile::validate(&file.content).map_err(|e| {
                KilnError::InvalidInput(format!("{}: '{}': {e}", Self::NAME, file.name))
            })?;
        }
        if let Some(profile) = &args.profile {
            self.scorer.profiles().get(profile)?;
        }
        Ok(args)
    }
}

#[async_trait]
impl ToolHandler for ScoreTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Score existing Dockerfiles on six criteria and rank them"
    }

    fn validate(&self, args: &Value) -> Result<()> {
        self.parse(args).map(|_| ())
    }

    async fn handle(&self, args: &Value) -> Result<ToolOutput> {
        let args = self.parse(args)?;
        let language = args.language.unwrap_or(Language::Unknown);
        let candidates: Vec<Candidate> = args
            .dockerfiles
            .into_iter()
            .enumerate()
            .map(|(ordinal, file)| {
                let metadata = estimate_metadata(&file.content, language);
                Candidate::new(ordinal, file.name, file.content, 1.0, metadata)
            })
            .collect();

        let profile = self.scorer.profiles().resolve(args.profile.as_deref())?.name().to_string();
        let ranking = self.scorer.rank(&candidates, Some(&profile))?;
        let best = ranking
            .best()
            .map(|b| (b.candidate.strategy.clone(), b.aggregate()));
        let summary = match &best {
            Some((name, score)) => format!("'{name}' ranks best with {score:.1} under '{profile}'"),
            None => "nothing to score".to_string(),
        };

        Ok(ToolOutput {
            tool: Self::NAME.to_string(),
            summary,
            content: json!({
                "profile": profile,
                "best": best.map(|(name, score)| json!({"name": name, "aggregate": score})),
                "ranking": ranking.iter().map(|s| json!({
                    "name": s.candidate.strategy,
                    "rank": s.rank(),
                    "aggregate": s.aggregate(),
                    "scores": s.breakdown.scores,
                })).collect::<Vec<_>>(),
            }),
        })
    }

    fn describe_chain_hint(&self, output: &ToolOutput) -> Option<ChainHint> {
        let best = output.content.get("best")?;
        let score = best.get("aggregate")?.as_f64()?;
        if score >= self.regenerate_below {
            return None;
        }
        Some(ChainHint {
            next_tool: "generate_dockerfile".to_string(),
            reason: format!(
                "best score {score:.1} is below {:.1}; generating fresh candidates may do better",
                self.regenerate_below
            ),
            arguments: json!({
                "profile": output.content.get("profile").cloned().unwrap_or(Value::Null),
            }),
        })
    }
}
