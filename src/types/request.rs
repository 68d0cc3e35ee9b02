//! Generation request types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sampling parameters that materially change sampler output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Target model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SamplingParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the target model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Declared output schema for structured requests.
///
/// `id` names the schema; `definition` is a JSON-schema document (the subset
/// understood by [`SchemaValidator`](crate::schema::SchemaValidator)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub id: String,
    pub definition: Value,
}

impl OutputSchema {
    pub fn new(id: impl Into<String>, definition: Value) -> Self {
        Self {
            id: id.into(),
            definition,
        }
    }
}

/// One generation attempt submitted by a caller.
///
/// Immutable once built: the executor and cache only ever borrow it.
/// `context` pairs vary the fingerprint without reaching the prompt;
/// `trace_id` is bookkeeping and never affects cache identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Prompt/template identifier (e.g. `"dockerfile-basic"`).
    pub template_id: String,

    /// Free-form variable bindings rendered into the template.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,

    #[serde(default)]
    pub params: SamplingParams,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<OutputSchema>,

    /// Additional key/value pairs used only for fingerprint variance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<(String, String)>,

    /// Request-scoped trace id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl GenerationRequest {
    /// Create a request for the given template.
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            variables: BTreeMap::new(),
            params: SamplingParams::default(),
            schema: None,
            context: Vec::new(),
            trace_id: None,
        }
    }

    /// Bind a template variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Set sampling parameters.
    pub fn params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    /// Declare an output schema (switches the request to structured mode).
    pub fn schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add a fingerprint-only context pair.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Attach a trace id.
    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    /// Whether the request expects structured (schema-validated) output.
    pub fn is_structured(&self) -> bool {
        self.schema.is_some()
    }
}
