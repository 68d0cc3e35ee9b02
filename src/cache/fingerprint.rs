//! Stable request fingerprints.
//!
//! A [`Fingerprint`] is the SHA-256 digest of a canonical encoding of the
//! fields that decide what a sampler would produce: template id, variable
//! bindings, sampling parameters, schema identity and fingerprint-only
//! context pairs. The trace id is deliberately left out.
//!
//! Canonical encoding sorts object keys at every depth and sorts context
//! pairs, so binding order never changes the key. The digest is stable
//! across processes (unlike `DefaultHasher`), which keeps the key usable
//! by a shared backend later.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{GenerationRequest, OutputSchema};

/// Bumped whenever the canonical encoding changes.
const FINGERPRINT_VERSION: &str = "kiln-fp-v1";

/// Deterministic cache key for a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a request.
    pub fn of(request: &GenerationRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_request(request).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&GenerationRequest> for Fingerprint {
    fn from(request: &GenerationRequest) -> Self {
        Self::of(request)
    }
}

/// Identity of a schema: its id plus a digest of its canonical definition.
pub(crate) fn schema_identity(schema: &OutputSchema) -> String {
    let mut body = String::new();
    write_canonical(&schema.definition, &mut body);
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{}#{}", schema.id, &hex::encode(hasher.finalize())[..16])
}

fn canonical_request(request: &GenerationRequest) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(FINGERPRINT_VERSION);

    out.push_str("|template=");
    write_canonical(&Value::String(request.template_id.clone()), &mut out);

    out.push_str("|vars={");
    for (i, (name, value)) in request.variables.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_canonical(&Value::String(name.clone()), &mut out);
        out.push(':');
        write_canonical(value, &mut out);
    }
    out.push('}');

    // Temperature is quantised so float noise below 1e-3 does not split keys.
    let temperature = request
        .params
        .temperature
        .map(|t| ((t as f64) * 1000.0).round() as i64);
    out.push_str(&format!(
        "|temp={temperature:?}|max_tokens={:?}|model={:?}",
        request.params.max_tokens, request.params.model
    ));

    out.push_str("|schema=");
    match &request.schema {
        Some(schema) => out.push_str(&schema_identity(schema)),
        None => out.push('-'),
    }

    let mut context: Vec<&(String, String)> = request.context.iter().collect();
    context.sort();
    out.push_str("|ctx=[");
    for (i, (key, value)) in context.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_canonical(&Value::String(key.clone()), &mut out);
        out.push('=');
        write_canonical(&Value::String(value.clone()), &mut out);
    }
    out.push(']');
    out
}

/// Write `value` as compact JSON with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String(key.clone()), out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars: serde_json's own encoding is already canonical.
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SamplingParams;
    use serde_json::json;

    fn base() -> GenerationRequest {
        GenerationRequest::new("dockerfile-basic")
            .variable("language", "python")
            .variable("port", 5000)
            .params(SamplingParams::new().temperature(0.2).model("m-1"))
    }

    #[test]
    fn fingerprint_deterministic() {
        assert_eq!(Fingerprint::of(&base()), Fingerprint::of(&base()));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = Fingerprint::of(&base());
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn nested_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        let mut sa = String::new();
        let mut sb = String::new();
        write_canonical(&a, &mut sa);
        write_canonical(&b, &mut sb);
        assert_eq!(sa, sb);
        assert_eq!(sa, r#"{"a":{"x":3,"y":2},"b":1}"#);
    }

    #[test]
    fn temperature_quantised() {
        let a = base().params(SamplingParams::new().temperature(0.2).model("m-1"));
        let b = base().params(SamplingParams::new().temperature(0.200_000_1).model("m-1"));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn schema_identity_tracks_definition() {
        let s1 = OutputSchema::new("s", json!({"type": "object"}));
        let s2 = OutputSchema::new("s", json!({"type": "array"}));
        assert_ne!(schema_identity(&s1), schema_identity(&s2));
        assert!(schema_identity(&s1).starts_with("s#"));
    }

    #[test]
    fn variable_name_and_value_are_delimited() {
        // "ab" = "c" must not collide with "a" = "bc".
        let a = GenerationRequest::new("t").variable("ab", "c");
        let b = GenerationRequest::new("t").variable("a", "bc");
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }
}
