//! Tool handlers.
//!
//! A [`ToolHandler`] is one externally invokable operation with a JSON
//! argument object. Every invocation runs the same lifecycle:
//!
//! 1. [`validate`](ToolHandler::validate) the arguments
//! 2. [`handle`](ToolHandler::handle) them
//! 3. ask [`describe_chain_hint`](ToolHandler::describe_chain_hint) which
//!    tool, if any, should naturally run next
//!
//! [`invoke`] drives that lifecycle; [`ToolRegistry`] looks tools up by name.

mod dockerfile;
mod score;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{KilnError, Result};

pub use dockerfile::DockerfileTool;
pub use score::ScoreTool;

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub tool: String,
    /// One-line human summary.
    pub summary: String,
    /// Machine-readable result.
    pub content: Value,
}

/// Suggested follow-up tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainHint {
    pub next_tool: String,
    pub reason: String,
    /// Arguments to pass along.
    pub arguments: Value,
}

/// Output plus the follow-up hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub output: ToolOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<ChainHint>,
}

/// One externally invokable operation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Reject malformed arguments before any work starts.
    fn validate(&self, args: &Value) -> Result<()>;

    /// Do the work. Called only with arguments that passed `validate`.
    async fn handle(&self, args: &Value) -> Result<ToolOutput>;

    /// Suggest the next tool for this output, if any.
    fn describe_chain_hint(&self, output: &ToolOutput) -> Option<ChainHint>;
}

/// Validate, handle and attach the chain hint.
pub async fn invoke(tool: &dyn ToolHandler, args: &Value) -> Result<ToolInvocation> {
    tool.validate(args)?;
    let output = tool.handle(args).await?;
    let hint = tool.describe_chain_hint(&output);
    debug!(
        tool = tool.name(),
        next = hint.as_ref().map(|h| h.next_tool.as_str()).unwrap_or("-"),
        "tool finished"
    );
    Ok(ToolInvocation { output, hint })
}

/// Tools by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Invoke the named tool.
    pub async fn invoke(&self, name: &str, args: &Value) -> Result<ToolInvocation> {
        let tool = self
            .get(name)
            .ok_or_else(|| KilnError::InvalidInput(format!("unknown tool '{name}'")))?;
        invoke(tool.as_ref(), args).await
    }
}

/// Deserialize a tool's argument object.
fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T> {
    if !args.is_object() {
        return Err(KilnError::InvalidInput(format!(
            "{tool}: arguments must be a JSON object"
        )));
    }
    serde_json::from_value(args.clone())
        .map_err(|e| KilnError::InvalidInput(format!("{tool}: {e}")))
}
