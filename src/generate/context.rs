//! Project context: what is being containerised.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::GenerationRequest;
use crate::{KilnError, Result};

/// Source language of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    Go,
    Rust,
    Java,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Unknown => "unknown",
        }
    }

    /// Port a service in this language conventionally listens on.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Language::Python => Some(8000),
            Language::Node => Some(3000),
            Language::Go | Language::Rust | Language::Java => Some(8080),
            Language::Unknown => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about a project that drive candidate generation.
///
/// Generators are pure functions of this value, so two equal contexts
/// always yield the same strategies and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Main source file or binary, relative to the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Dependency manifest, relative to the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    /// HTTP path answering liveness probes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
}

impl ProjectContext {
    pub fn new(name: impl Into<String>, language: Language) -> Self {
        Self {
            name: name.into(),
            language,
            framework: None,
            port: language.default_port(),
            entrypoint: None,
            manifest: None,
            health_path: None,
        }
    }

    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Inspect a project directory.
    ///
    /// Manifests are checked in a fixed order (Python, Node, Go, Rust,
    /// Java); the first match wins. A directory with none of them yields
    /// [`Language::Unknown`].
    pub fn detect(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(KilnError::InvalidInput(format!(
                "not a directory: {}",
                dir.display()
            )));
        }
        let name = dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "app".to_string());
        let name = sanitize_name(&name);

        let context = if let Some(manifest) = first_existing(dir, &["requirements.txt", "pyproject.toml", "Pipfile"]) {
            detect_python(dir, name, manifest)
        } else if dir.join("package.json").is_file() {
            detect_node(dir, name)?
        } else if dir.join("go.mod").is_file() {
            detect_go(dir, name)
        } else if dir.join("Cargo.toml").is_file() {
            detect_rust(dir, name)?
        } else if let Some(manifest) = first_existing(dir, &["pom.xml", "build.gradle", "build.gradle.kts"]) {
            detect_java(dir, name, manifest)
        } else {
            ProjectContext::new(name, Language::Unknown)
        };

        debug!(
            language = %context.language,
            framework = context.framework.as_deref().unwrap_or("-"),
            port = context.port,
            "detected project context"
        );
        Ok(context)
    }

    /// Template variables describing this context.
    pub fn to_variables(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    /// A generation request for `template_id` bound to this context.
    pub fn to_request(&self, template_id: impl Into<String>) -> GenerationRequest {
        self.to_variables()
            .into_iter()
            .fold(GenerationRequest::new(template_id), |req, (k, v)| {
                req.variable(k, v)
            })
    }
}

fn first_existing(dir: &Path, names: &[&'static str]) -> Option<&'static str> {
    names.iter().copied().find(|n| dir.join(n).is_file())
}

fn read_lower(path: &Path) -> String {
    fs::read_to_string(path)
        .map(|s| s.to_lowercase())
        .unwrap_or_default()
}

/// Lowercase, `[a-z0-9-]` only; image names reject everything else.
fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}

fn detect_python(dir: &Path, name: String, manifest: &str) -> ProjectContext {
    let deps = read_lower(&dir.join(manifest));
    let mut ctx = ProjectContext::new(name, Language::Python).manifest(manifest);

    let (framework, port) = if deps.contains("flask") {
        (Some("flask"), 5000)
    } else if deps.contains("django") {
        (Some("django"), 8000)
    } else if deps.contains("fastapi") {
        (Some("fastapi"), 8000)
    } else {
        (None, 8000)
    };
    if let Some(fw) = framework {
        ctx = ctx.framework(fw);
    }
    ctx = ctx.port(port);

    let candidates: &[&str] = if framework == Some("django") {
        &["manage.py", "app.py", "main.py"]
    } else {
        &["app.py", "main.py", "wsgi.py", "server.py"]
    };
    if let Some(entry) = candidates.iter().find(|f| dir.join(f).is_file()) {
        let source = read_lower(&dir.join(entry));
        if let Some(p) = port_from_source(&source) {
            ctx = ctx.port(p);
        }
        if source.contains("'/health'") || source.contains("\"/health\"") {
            ctx = ctx.health_path("/health");
        }
        ctx = ctx.entrypoint(*entry);
    }
    ctx
}

/// Pick up `getenv('PORT', 5000)` / `port=5000` style literals.
fn port_from_source(source: &str) -> Option<u16> {
    for marker in ["'port', ", "\"port\", ", "port="] {
        if let Some(idx) = source.find(marker) {
            let digits: String = source[idx + marker.len()..]
                .chars()
                .skip_while(|c| c.is_whitespace())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(port) = digits.parse::<u16>()
                && port > 0
            {
                return Some(port);
            }
        }
    }
    None
}

fn detect_node(dir: &Path, name: String) -> Result<ProjectContext> {
    let raw = fs::read_to_string(dir.join("package.json"))
        .map_err(|e| KilnError::InvalidInput(format!("package.json: {e}")))?;
    let package: Value = serde_json::from_str(&raw)?;

    let name = package
        .get("name")
        .and_then(Value::as_str)
        .map(sanitize_name)
        .unwrap_or(name);
    let mut ctx = ProjectContext::new(name, Language::Node).manifest("package.json");

    let has_dep = |dep: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| package.get(section).and_then(|d| d.get(dep)).is_some())
    };
    for fw in ["express", "fastify", "koa", "next"] {
        if has_dep(fw) {
            ctx = ctx.framework(fw);
            break;
        }
    }

    let entry = package
        .get("main")
        .and_then(Value::as_str)
        .unwrap_or("index.js");
    ctx = ctx.entrypoint(entry);
    if read_lower(&dir.join(entry)).contains("/health") {
        ctx = ctx.health_path("/health");
    }
    Ok(ctx)
}

fn detect_go(dir: &Path, name: String) -> ProjectContext {
    let module = read_lower(&dir.join("go.mod"));
    let mut ctx = ProjectContext::new(name, Language::Go)
        .manifest("go.mod")
        .entrypoint("main.go");
    for (needle, fw) in [("gin-gonic/gin", "gin"), ("labstack/echo", "echo"), ("gofiber/fiber", "fiber")] {
        if module.contains(needle) {
            ctx = ctx.framework(fw);
            break;
        }
    }
    ctx
}

fn detect_rust(dir: &Path, name: String) -> Result<ProjectContext> {
    let raw = fs::read_to_string(dir.join("Cargo.toml"))
        .map_err(|e| KilnError::InvalidInput(format!("Cargo.toml: {e}")))?;
    let manifest: toml::Value = toml::from_str(&raw)
        .map_err(|e| KilnError::InvalidInput(format!("Cargo.toml: {e}")))?;

    let package_name = manifest
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(toml::Value::as_str)
        .map(str::to_string);
    let name = package_name.as_deref().map(sanitize_name).unwrap_or(name);
    let mut ctx = ProjectContext::new(name, Language::Rust).manifest("Cargo.toml");
    if let Some(bin) = package_name {
        ctx = ctx.entrypoint(bin);
    }

    if let Some(deps) = manifest.get("dependencies").and_then(toml::Value::as_table) {
        for fw in ["axum", "actix-web", "rocket", "warp"] {
            if deps.contains_key(fw) {
                ctx = ctx.framework(fw);
                break;
            }
        }
    }
    Ok(ctx)
}

fn detect_java(dir: &Path, name: String, manifest: &str) -> ProjectContext {
    let build = read_lower(&dir.join(manifest));
    let mut ctx = ProjectContext::new(name, Language::Java).manifest(manifest);
    if build.contains("spring-boot") {
        ctx = ctx.framework("spring-boot").health_path("/actuator/health");
    }
    ctx
}
