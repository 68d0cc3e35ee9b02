//! Output schema validation.
//!
//! Structured requests declare an [`OutputSchema`]. The validator supports
//! the JSON-schema subset sampler output is realistically checked against:
//!
//! - `type` (single name or list of names)
//! - `properties`, `required`, `additionalProperties: false`
//! - `items`, `minItems`, `maxItems`
//! - `enum`
//! - `minLength`, `maxLength`
//! - `minimum`, `maximum`
//!
//! Unknown keywords are ignored. Schemas are compiled once per identity
//! (id + definition digest) and kept in a bounded moka cache, so repeated
//! validation of the same schema across retries and requests skips the
//! compile step.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::fingerprint::schema_identity;
use crate::types::OutputSchema;
use crate::{KilnError, Result};

/// Default maximum number of compiled schemas kept.
const DEFAULT_SCHEMA_CACHE_MAX: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "object" => Self::Object,
            "array" => Self::Array,
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "null" => Self::Null,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Object, Value::Object(_))
            | (Self::Array, Value::Array(_))
            | (Self::String, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Null, Value::Null) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }
}

/// A schema resolved into a directly walkable form.
#[derive(Debug, Default)]
struct CompiledSchema {
    /// Empty means any type.
    types: Vec<JsonType>,
    properties: BTreeMap<String, CompiledSchema>,
    required: Vec<String>,
    additional_properties: bool,
    items: Option<Box<CompiledSchema>>,
    enum_values: Option<Vec<Value>>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl CompiledSchema {
    fn compile(def: &Value, path: &str) -> Result<Self> {
        let obj = match def {
            Value::Object(obj) => obj,
            // `true` accepts anything.
            Value::Bool(true) => return Ok(Self::permissive()),
            other => {
                return Err(KilnError::InvalidInput(format!(
                    "schema at {path} must be an object, got {other}"
                )));
            }
        };

        let mut compiled = Self::permissive();

        if let Some(ty) = obj.get("type") {
            compiled.types = match ty {
                Value::String(name) => vec![parse_type(name, path)?],
                Value::Array(names) => names
                    .iter()
                    .map(|n| match n.as_str() {
                        Some(name) => parse_type(name, path),
                        None => Err(KilnError::InvalidInput(format!(
                            "schema at {path}: type list entries must be strings"
                        ))),
                    })
                    .collect::<Result<_>>()?,
                _ => {
                    return Err(KilnError::InvalidInput(format!(
                        "schema at {path}: `type` must be a string or list"
                    )));
                }
            };
        }

        if let Some(Value::Object(props)) = obj.get("properties") {
            for (name, sub) in props {
                let sub_path = format!("{path}.{name}");
                compiled
                    .properties
                    .insert(name.clone(), Self::compile(sub, &sub_path)?);
            }
        }

        if let Some(Value::Array(req)) = obj.get("required") {
            compiled.required = req
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }

        if let Some(Value::Bool(false)) = obj.get("additionalProperties") {
            compiled.additional_properties = false;
        }

        if let Some(items) = obj.get("items") {
            compiled.items = Some(Box::new(Self::compile(items, &format!("{path}[]"))?));
        }

        if let Some(Value::Array(values)) = obj.get("enum") {
            compiled.enum_values = Some(values.clone());
        }

        compiled.min_length = uint(obj.get("minLength"));
        compiled.max_length = uint(obj.get("maxLength"));
        compiled.min_items = uint(obj.get("minItems"));
        compiled.max_items = uint(obj.get("maxItems"));
        compiled.minimum = obj.get("minimum").and_then(Value::as_f64);
        compiled.maximum = obj.get("maximum").and_then(Value::as_f64);

        Ok(compiled)
    }

    fn permissive() -> Self {
        Self {
            additional_properties: true,
            ..Self::default()
        }
    }

    fn validate(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        if !self.types.is_empty() && !self.types.iter().any(|t| t.matches(value)) {
            let expected: Vec<&str> = self.types.iter().map(JsonType::name).collect();
            errors.push(format!(
                "{path}: expected {}, got {}",
                expected.join(" or "),
                describe(value)
            ));
            // Further checks would only repeat the type mismatch.
            return;
        }

        if let Some(allowed) = &self.enum_values
            && !allowed.contains(value)
        {
            errors.push(format!("{path}: value {value} is not one of the allowed values"));
        }

        match value {
            Value::Object(map) => {
                for name in &self.required {
                    if !map.contains_key(name) {
                        errors.push(format!("{path}: missing required property '{name}'"));
                    }
                }
                for (name, sub_value) in map {
                    match self.properties.get(name) {
                        Some(sub) => sub.validate(sub_value, &format!("{path}.{name}"), errors),
                        None if !self.additional_properties => {
                            errors.push(format!("{path}: unexpected property '{name}'"));
                        }
                        None => {}
                    }
                }
            }
            Value::Array(items) => {
                if let Some(min) = self.min_items
                    && items.len() < min
                {
                    errors.push(format!("{path}: expected at least {min} item(s)"));
                }
                if let Some(max) = self.max_items
                    && items.len() > max
                {
                    errors.push(format!("{path}: expected at most {max} item(s)"));
                }
                if let Some(item_schema) = &self.items {
                    for (i, item) in items.iter().enumerate() {
                        item_schema.validate(item, &format!("{path}[{i}]"), errors);
                    }
                }
            }
            Value::String(s) => {
                let len = s.chars().count();
                if let Some(min) = self.min_length
                    && len < min
                {
                    errors.push(format!("{path}: shorter than {min} character(s)"));
                }
                if let Some(max) = self.max_length
                    && len > max
                {
                    errors.push(format!("{path}: longer than {max} character(s)"));
                }
            }
            Value::Number(n) => {
                let Some(f) = n.as_f64() else { return };
                if let Some(min) = self.minimum
                    && f < min
                {
                    errors.push(format!("{path}: {f} is below minimum {min}"));
                }
                if let Some(max) = self.maximum
                    && f > max
                {
                    errors.push(format!("{path}: {f} is above maximum {max}"));
                }
            }
            _ => {}
        }
    }
}

fn parse_type(name: &str, path: &str) -> Result<JsonType> {
    JsonType::parse(name)
        .ok_or_else(|| KilnError::InvalidInput(format!("schema at {path}: unknown type '{name}'")))
}

fn uint(v: Option<&Value>) -> Option<usize> {
    v.and_then(Value::as_u64).map(|n| n as usize)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

/// Validates values against [`OutputSchema`]s, caching compiled schemas.
///
/// Thread-safe and cheap to share behind an `Arc`.
pub struct SchemaValidator {
    compiled: moka::sync::Cache<String, Arc<CompiledSchema>>,
}

impl SchemaValidator {
    /// Create a validator with the default compiled-schema capacity (256).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_SCHEMA_CACHE_MAX)
    }

    /// Create a validator with a custom compiled-schema capacity.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            compiled: moka::sync::Cache::new(max),
        }
    }

    /// Validate `value` against `schema`.
    ///
    /// Returns `SchemaValidationFailed` listing every violation, or
    /// `InvalidInput` when the schema itself cannot be compiled.
    pub fn validate(&self, schema: &OutputSchema, value: &Value) -> Result<()> {
        let compiled = self.compiled_for(schema)?;
        let mut errors = Vec::new();
        compiled.validate(value, "$", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(KilnError::SchemaValidationFailed(errors))
        }
    }

    /// Check that `schema` compiles, warming the cache.
    pub fn check_schema(&self, schema: &OutputSchema) -> Result<()> {
        self.compiled_for(schema).map(|_| ())
    }

    /// Number of compiled schemas currently cached.
    pub fn cached_schemas(&self) -> u64 {
        self.compiled.run_pending_tasks();
        self.compiled.entry_count()
    }

    fn compiled_for(&self, schema: &OutputSchema) -> Result<Arc<CompiledSchema>> {
        let key = schema_identity(schema);
        if let Some(compiled) = self.compiled.get(&key) {
            return Ok(compiled);
        }
        let compiled = Arc::new(CompiledSchema::compile(&schema.definition, "$")?);
        self.compiled.insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_schema() -> OutputSchema {
        OutputSchema::new(
            "service-v1",
            json!({
                "type": "object",
                "required": ["name", "port"],
                "additionalProperties": false,
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "port": {"type": "integer", "minimum": 1, "maximum": 65535},
                    "protocol": {"enum": ["tcp", "udp"]},
                    "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 3}
                }
            }),
        )
    }

    fn errors_of(result: Result<()>) -> Vec<String> {
        match result {
            Err(KilnError::SchemaValidationFailed(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn valid_value_passes() {
        let v = SchemaValidator::new();
        let value = json!({"name": "web", "port": 8080, "protocol": "tcp", "tags": ["a"]});
        assert!(v.validate(&service_schema(), &value).is_ok());
    }

    #[test]
    fn missing_required_reported() {
        let v = SchemaValidator::new();
        let errors = errors_of(v.validate(&service_schema(), &json!({"name": "web"})));
        assert_eq!(errors, vec!["$: missing required property 'port'".to_string()]);
    }

    #[test]
    fn collects_every_violation() {
        let v = SchemaValidator::new();
        let value = json!({
            "name": "",
            "port": 70000,
            "protocol": "icmp",
            "tags": ["a", 2, "c", "d"],
            "extra": true
        });
        let errors = errors_of(v.validate(&service_schema(), &value));
        assert!(errors.iter().any(|e| e.contains("$.name: shorter than 1")));
        assert!(errors.iter().any(|e| e.contains("$.port: 70000 is above maximum")));
        assert!(errors.iter().any(|e| e.contains("$.protocol: value \"icmp\"")));
        assert!(errors.iter().any(|e| e.contains("$.tags: expected at most 3")));
        assert!(errors.iter().any(|e| e.contains("$.tags[1]: expected string")));
        assert!(errors.iter().any(|e| e.contains("unexpected property 'extra'")));
    }

    #[test]
    fn integer_accepts_whole_floats() {
        let v = SchemaValidator::new();
        let schema = OutputSchema::new("int", json!({"type": "integer"}));
        assert!(v.validate(&schema, &json!(3.0)).is_ok());
        assert!(v.validate(&schema, &json!(3.5)).is_err());
    }

    #[test]
    fn type_list_allows_any_listed() {
        let v = SchemaValidator::new();
        let schema = OutputSchema::new("opt", json!({"type": ["string", "null"]}));
        assert!(v.validate(&schema, &json!(null)).is_ok());
        assert!(v.validate(&schema, &json!("x")).is_ok());
        assert!(v.validate(&schema, &json!(1)).is_err());
    }

    #[test]
    fn malformed_schema_is_invalid_input() {
        let v = SchemaValidator::new();
        let schema = OutputSchema::new("bad", json!({"type": "widget"}));
        assert!(matches!(
            v.validate(&schema, &json!({})),
            Err(KilnError::InvalidInput(_))
        ));
    }

    #[test]
    fn compiled_schemas_are_cached_by_identity() {
        let v = SchemaValidator::new();
        v.check_schema(&service_schema()).unwrap();
        v.check_schema(&service_schema()).unwrap();
        assert_eq!(v.cached_schemas(), 1);

        let other = OutputSchema::new("service-v1", json!({"type": "array"}));
        v.check_schema(&other).unwrap();
        assert_eq!(v.cached_schemas(), 2);
    }
}
