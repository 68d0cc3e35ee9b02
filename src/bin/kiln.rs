//! kiln: generate and rank Dockerfiles from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use kiln::tools::ToolInvocation;
use kiln::{Config, DockerfileTool, Pipeline, ScoreTool, Scorer, ToolRegistry};

/// Kiln CLI
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(about = "Cached, ranked Dockerfile generation")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "KILN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate Dockerfile candidates for a project and print the best one
    Dockerfile {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Candidates to generate
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Ranked candidates to report
        #[arg(short, long)]
        top: Option<usize>,
        /// Weight profile
        #[arg(short, long)]
        profile: Option<String>,
        /// Print the full JSON result
        #[arg(long)]
        json: bool,
    },

    /// Score and rank existing Dockerfiles
    Score {
        /// Dockerfiles to score
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Weight profile
        #[arg(short, long)]
        profile: Option<String>,
        /// Print the full JSON result
        #[arg(long)]
        json: bool,
    },

    /// List weight profiles
    Profiles,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: info for kiln, warn elsewhere; override with RUST_LOG.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,kiln=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Profiles => {
            let profiles = config.profile_set()?;
            let default = profiles.default_profile().name().to_string();
            for profile in profiles.iter() {
                let marker = if profile.name() == default { "*" } else { " " };
                let weights = profile
                    .weights()
                    .iter()
                    .map(|(criterion, weight)| format!("{criterion}={weight}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{marker} {:<12} {weights}", profile.name());
            }
        }

        Command::Dockerfile {
            dir,
            count,
            top,
            profile,
            json,
        } => {
            let pipeline = Arc::new(Pipeline::builder().config(&config)?.build()?);
            let registry = registry(&pipeline);

            let mut arguments = json!({ "path": dir });
            insert_opt(&mut arguments, "count", count.map(Value::from));
            insert_opt(&mut arguments, "top_k", top.map(Value::from));
            insert_opt(&mut arguments, "profile", profile.map(Value::from));

            let invocation = registry.invoke(DockerfileTool::NAME, &arguments).await?;
            info!(summary = %invocation.output.summary, "generated");
            if json {
                print_json(&invocation)?;
            } else {
                let best = invocation
                    .output
                    .content
                    .pointer("/best/dockerfile")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                print!("{best}");
                if !best.ends_with('\n') {
                    println!();
                }
            }
        }

        Command::Score {
            files,
            profile,
            json,
        } => {
            let pipeline = Arc::new(Pipeline::builder().config(&config)?.build()?);
            let registry = registry(&pipeline);

            let mut dockerfiles = Vec::with_capacity(files.len());
            for file in &files {
                let content = std::fs::read_to_string(file)
                    .map_err(|e| format!("reading {}: {e}", file.display()))?;
                dockerfiles.push(json!({
                    "name": file.display().to_string(),
                    "content": content,
                }));
            }
            let mut arguments = json!({ "dockerfiles": dockerfiles });
            insert_opt(&mut arguments, "profile", profile.map(Value::from));

            let invocation = registry.invoke(ScoreTool::NAME, &arguments).await?;
            if json {
                print_json(&invocation)?;
            } else {
                print_ranking(&invocation);
            }
        }
    }

    Ok(())
}

fn registry(pipeline: &Arc<Pipeline>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DockerfileTool::new(pipeline.clone())));
    registry.register(Arc::new(ScoreTool::new(Scorer::new(
        pipeline.scorer().profiles().clone(),
    ))));
    registry
}

fn insert_opt(arguments: &mut Value, key: &str, value: Option<Value>) {
    if let (Some(map), Some(value)) = (arguments.as_object_mut(), value) {
        map.insert(key.to_string(), value);
    }
}

fn print_json(invocation: &ToolInvocation) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(invocation)?);
    Ok(())
}

fn print_ranking(invocation: &ToolInvocation) {
    let content = &invocation.output.content;
    println!(
        "profile: {}",
        content.get("profile").and_then(Value::as_str).unwrap_or("-")
    );
    for entry in content
        .get("ranking")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        println!(
            "{:>2}. {:<40} {:>5.1}",
            entry.get("rank").and_then(Value::as_u64).unwrap_or(0),
            entry.get("name").and_then(Value::as_str).unwrap_or("?"),
            entry.get("aggregate").and_then(Value::as_f64).unwrap_or(0.0),
        );
    }
    if let Some(hint) = &invocation.hint {
        println!("hint: {} ({})", hint.next_tool, hint.reason);
    }
}
