//! Deterministic Dockerfile strategies.
//!
//! Each [`Strategy`] renders one Dockerfile from a [`ProjectContext`] with no
//! randomness: equal contexts give byte-identical output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::context::{Language, ProjectContext};
use crate::dockerfile;
use crate::types::CandidateMetadata;
use crate::{KilnError, Result};

/// A named approach to producing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Minimal,
    SecurityHardened,
    MultiStage,
    CacheOptimized,
}

impl Strategy {
    /// All strategies in generation order.
    pub const ALL: [Strategy; 4] = [
        Strategy::Minimal,
        Strategy::SecurityHardened,
        Strategy::MultiStage,
        Strategy::CacheOptimized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Minimal => "minimal",
            Strategy::SecurityHardened => "security-hardened",
            Strategy::MultiStage => "multi-stage",
            Strategy::CacheOptimized => "cache-optimized",
        }
    }

    /// One-line brief handed to a sampler for this strategy.
    pub fn brief(&self) -> &'static str {
        match self {
            Strategy::Minimal => "the simplest working Dockerfile on the official base image",
            Strategy::SecurityHardened => {
                "a slim base, patched packages, a non-root user and a health check"
            }
            Strategy::MultiStage => "a builder stage and a small runtime stage running as non-root",
            Strategy::CacheOptimized => {
                "dependency manifests copied first and BuildKit cache mounts for installs"
            }
        }
    }

    /// Prior confidence that this strategy yields a deployable image.
    pub fn confidence(&self) -> f64 {
        match self {
            Strategy::Minimal => 0.6,
            Strategy::SecurityHardened => 0.85,
            Strategy::MultiStage => 0.8,
            Strategy::CacheOptimized => 0.75,
        }
    }

    /// Render the Dockerfile for `ctx`.
    pub fn render(&self, ctx: &ProjectContext) -> Result<String> {
        let tc = Toolchain::for_context(ctx).ok_or_else(|| KilnError::GenerationInvalid {
            strategy: self.as_str().to_string(),
            reason: format!("no toolchain for language '{}'", ctx.language),
        })?;
        let content = match self {
            Strategy::Minimal => minimal(ctx, &tc),
            Strategy::SecurityHardened => hardened(ctx, &tc),
            Strategy::MultiStage => multi_stage(ctx, &tc),
            Strategy::CacheOptimized => cache_optimized(ctx, &tc),
        };
        dockerfile::validate(&content).map_err(|reason| KilnError::GenerationInvalid {
            strategy: self.as_str().to_string(),
            reason,
        })?;
        Ok(content)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| KilnError::InvalidInput(format!("unknown strategy '{s}'")))
    }
}

/// Per-language building blocks shared by the templates.
struct Toolchain {
    image: &'static str,
    slim: &'static str,
    runtime: &'static str,
    alpine: bool,
    runtime_alpine: bool,
    manifests: String,
    install: String,
    build: Option<String>,
    cache_dir: &'static str,
    /// Files the runtime stage copies from the builder.
    artifact: (&'static str, &'static str),
    cmd: Vec<String>,
    runtime_cmd: Vec<String>,
}

impl Toolchain {
    fn for_context(ctx: &ProjectContext) -> Option<Self> {
        let entry = ctx.entrypoint.clone();
        let port = ctx.port.unwrap_or(8080);
        let tc = match ctx.language {
            Language::Python => {
                let (manifests, target) = match ctx.manifest.as_deref() {
                    Some("pyproject.toml") => ("pyproject.toml".to_string(), "."),
                    _ => ("requirements.txt".to_string(), "-r requirements.txt"),
                };
                let entry = entry.unwrap_or_else(|| "app.py".to_string());
                let cmd = python_cmd(ctx.framework.as_deref(), &entry, port);
                Toolchain {
                    image: "python:3.12",
                    slim: "python:3.12-slim",
                    runtime: "python:3.12-slim",
                    alpine: false,
                    runtime_alpine: false,
                    install: format!("pip install --no-cache-dir {target}"),
                    manifests,
                    build: None,
                    cache_dir: "/root/.cache/pip",
                    artifact: ("/install", "/usr/local"),
                    runtime_cmd: cmd.clone(),
                    cmd,
                }
            }
            Language::Node => {
                let entry = entry.unwrap_or_else(|| "index.js".to_string());
                let cmd = vec!["node".to_string(), entry];
                Toolchain {
                    image: "node:20",
                    slim: "node:20-alpine",
                    runtime: "node:20-alpine",
                    alpine: true,
                    runtime_alpine: true,
                    manifests: "package*.json".to_string(),
                    install: "npm ci --omit=dev".to_string(),
                    build: Some("npm run build --if-present".to_string()),
                    cache_dir: "/root/.npm",
                    artifact: ("/app", "/app"),
                    runtime_cmd: cmd.clone(),
                    cmd,
                }
            }
            Language::Go => Toolchain {
                image: "golang:1.22",
                slim: "golang:1.22-alpine",
                runtime: "gcr.io/distroless/static-debian12",
                alpine: true,
                runtime_alpine: false,
                manifests: "go.mod go.sum*".to_string(),
                install: "go mod download".to_string(),
                build: Some("CGO_ENABLED=0 go build -trimpath -ldflags=\"-s -w\" -o /out/app .".to_string()),
                cache_dir: "/go/pkg/mod",
                artifact: ("/out/app", "/app"),
                cmd: vec!["/out/app".to_string()],
                runtime_cmd: vec!["/app".to_string()],
            },
            Language::Rust => {
                let bin = entry.unwrap_or_else(|| ctx.name.clone());
                Toolchain {
                    image: "rust:1.80",
                    slim: "rust:1.80-slim",
                    runtime: "debian:bookworm-slim",
                    alpine: false,
                    runtime_alpine: false,
                    manifests: "Cargo.toml Cargo.lock*".to_string(),
                    install: "cargo fetch".to_string(),
                    build: Some(format!(
                        "cargo build --release && cp target/release/{bin} /usr/local/bin/app"
                    )),
                    cache_dir: "/usr/local/cargo/registry",
                    artifact: ("/usr/local/bin/app", "/usr/local/bin/app"),
                    cmd: vec!["/usr/local/bin/app".to_string()],
                    runtime_cmd: vec!["/usr/local/bin/app".to_string()],
                }
            }
            Language::Java => {
                let gradle = ctx.manifest.as_deref().is_some_and(|m| m.starts_with("build.gradle"));
                let (image, manifests, install, build, cache_dir) = if gradle {
                    (
                        "gradle:8-jdk21",
                        "build.gradle* settings.gradle*".to_string(),
                        "gradle dependencies --no-daemon".to_string(),
                        "gradle bootJar --no-daemon -x test && cp build/libs/*.jar /app/app.jar",
                        "/home/gradle/.gradle",
                    )
                } else {
                    (
                        "maven:3.9-eclipse-temurin-21",
                        "pom.xml".to_string(),
                        "mvn -B -q dependency:go-offline".to_string(),
                        "mvn -B -q package -DskipTests && cp target/*.jar /app/app.jar",
                        "/root/.m2",
                    )
                };
                let cmd = vec!["java".to_string(), "-jar".to_string(), "/app/app.jar".to_string()];
                Toolchain {
                    image,
                    slim: image,
                    runtime: "eclipse-temurin:21-jre-alpine",
                    alpine: false,
                    runtime_alpine: true,
                    manifests,
                    install,
                    build: Some(build.to_string()),
                    cache_dir,
                    artifact: ("/app/app.jar", "/app/app.jar"),
                    runtime_cmd: cmd.clone(),
                    cmd,
                }
            }
            Language::Unknown => return None,
        };
        Some(tc)
    }

    fn install_and_build(&self) -> String {
        match &self.build {
            Some(build) => format!("{} && {}", self.install, build),
            None => self.install.clone(),
        }
    }
}

fn python_cmd(framework: Option<&str>, entry: &str, port: u16) -> Vec<String> {
    let module = entry.trim_end_matches(".py").replace('/', ".");
    let parts: Vec<String> = match framework {
        Some("django") => vec!["python".into(), entry.into(), "runserver".into(), format!("0.0.0.0:{port}")],
        Some("fastapi") => vec![
            "uvicorn".into(),
            format!("{module}:app"),
            "--host".into(),
            "0.0.0.0".into(),
            "--port".into(),
            port.to_string(),
        ],
        _ => vec!["python".into(), entry.into()],
    };
    parts
}

fn exec_form(cmd: &[String]) -> String {
    let quoted: Vec<String> = cmd.iter().map(|c| format!("\"{}\"", c.replace('"', "\\\""))).collect();
    format!("[{}]", quoted.join(", "))
}

fn expose(out: &mut String, ctx: &ProjectContext) {
    if let Some(port) = ctx.port {
        out.push_str(&format!("EXPOSE {port}\n"));
    }
}

fn healthcheck(out: &mut String, ctx: &ProjectContext, runtime_image: &str) {
    let (Some(port), Some(path)) = (ctx.port, ctx.health_path.as_deref()) else {
        return;
    };
    // Distroless images have no shell or client to probe with.
    if runtime_image.contains("distroless") {
        return;
    }
    let url = format!("http://localhost:{port}{path}");
    let probe = match ctx.language {
        Language::Python => format!(
            "python -c \"import urllib.request; urllib.request.urlopen('{url}')\""
        ),
        Language::Node => format!(
            "node -e \"fetch('{url}').then(r => process.exit(r.ok ? 0 : 1)).catch(() => process.exit(1))\""
        ),
        _ => format!("wget -qO- {url} || exit 1"),
    };
    out.push_str(&format!(
        "HEALTHCHECK --interval=30s --timeout=5s --retries=3 CMD {probe}\n"
    ));
}

fn create_user(alpine: bool) -> &'static str {
    if alpine {
        "RUN addgroup -S app && adduser -S app -G app\n"
    } else {
        "RUN groupadd --system app && useradd --system --gid app --no-create-home app\n"
    }
}

fn patch_packages(alpine: bool) -> &'static str {
    if alpine {
        "RUN apk upgrade --no-cache\n"
    } else {
        "RUN apt-get update && apt-get upgrade -y && rm -rf /var/lib/apt/lists/*\n"
    }
}

fn minimal(ctx: &ProjectContext, tc: &Toolchain) -> String {
    let mut out = format!("FROM {}\n", tc.image);
    out.push_str("WORKDIR /app\n");
    out.push_str("COPY . .\n");
    out.push_str(&format!("RUN {}\n", tc.install_and_build()));
    expose(&mut out, ctx);
    out.push_str(&format!("CMD {}\n", exec_form(&tc.cmd)));
    out
}

fn hardened(ctx: &ProjectContext, tc: &Toolchain) -> String {
    let mut out = format!("FROM {}\n", tc.slim);
    out.push_str(patch_packages(tc.alpine));
    out.push_str(create_user(tc.alpine));
    out.push_str("WORKDIR /app\n");
    out.push_str(&format!("COPY {} ./\n", tc.manifests));
    out.push_str(&format!("RUN {}\n", tc.install));
    out.push_str("COPY --chown=app:app . .\n");
    if let Some(build) = &tc.build {
        out.push_str(&format!("RUN {build}\n"));
    }
    out.push_str("USER app\n");
    expose(&mut out, ctx);
    healthcheck(&mut out, ctx, tc.slim);
    out.push_str(&format!("CMD {}\n", exec_form(&tc.cmd)));
    out
}

fn multi_stage(ctx: &ProjectContext, tc: &Toolchain) -> String {
    let mut out = format!("FROM {} AS builder\n", tc.image);
    out.push_str("WORKDIR /app\n");
    out.push_str(&format!("COPY {} ./\n", tc.manifests));
    match ctx.language {
        Language::Python => {
            let target = tc.install.trim_start_matches("pip install --no-cache-dir ");
            let install = format!("RUN pip install --no-cache-dir --prefix=/install {target}\n");
            // Installing the project itself needs its sources first.
            if target == "." {
                out.push_str("COPY . .\n");
                out.push_str(&install);
            } else {
                out.push_str(&install);
                out.push_str("COPY . .\n");
            }
        }
        _ => {
            out.push_str(&format!("RUN {}\n", tc.install));
            out.push_str("COPY . .\n");
            if let Some(build) = &tc.build {
                out.push_str(&format!("RUN {build}\n"));
            }
        }
    }

    out.push('\n');
    out.push_str(&format!("FROM {}\n", tc.runtime));
    let distroless = tc.runtime.contains("distroless");
    if !distroless {
        out.push_str(create_user(tc.runtime_alpine));
    }
    out.push_str("WORKDIR /app\n");
    let (from, to) = tc.artifact;
    out.push_str(&format!("COPY --from=builder {from} {to}\n"));
    if ctx.language == Language::Python {
        out.push_str("COPY --from=builder --chown=app:app /app /app\n");
    }
    out.push_str(if distroless { "USER nonroot:nonroot\n" } else { "USER app\n" });
    expose(&mut out, ctx);
    healthcheck(&mut out, ctx, tc.runtime);
    out.push_str(&format!("CMD {}\n", exec_form(&tc.runtime_cmd)));
    out
}

fn cache_optimized(ctx: &ProjectContext, tc: &Toolchain) -> String {
    let mut out = String::from("# syntax=docker/dockerfile:1\n");
    out.push_str(&format!("FROM {}\n", tc.slim));
    out.push_str("WORKDIR /app\n");
    out.push_str(&format!("COPY {} ./\n", tc.manifests));
    let install = tc.install.replace("--no-cache-dir ", "");
    out.push_str(&format!(
        "RUN --mount=type=cache,target={} {install}\n",
        tc.cache_dir
    ));
    out.push_str("COPY . .\n");
    if let Some(build) = &tc.build {
        out.push_str(&format!(
            "RUN --mount=type=cache,target={} {build}\n",
            tc.cache_dir
        ));
    }
    expose(&mut out, ctx);
    out.push_str(&format!("CMD {}\n", exec_form(&tc.cmd)));
    out
}

/// Generation-time estimates read off Dockerfile content.
///
/// Used for both template and sampler candidates, so the numbers depend
/// only on what the draft says, not on who wrote it.
pub fn estimate_metadata(content: &str, language: Language) -> CandidateMetadata {
    let instructions = dockerfile::parse(content);
    let final_image = dockerfile::final_image(&instructions).map(str::to_string);
    let image = final_image.as_deref().unwrap_or_default().to_ascii_lowercase();

    let size = if image.contains("distroless") || image.contains("scratch") {
        25.0
    } else if image.contains("alpine") {
        match language {
            Language::Java => 190.0,
            Language::Go => 260.0,
            _ => 140.0,
        }
    } else if image.contains("slim") {
        match language {
            Language::Rust => 90.0,
            _ => 160.0,
        }
    } else {
        match language {
            Language::Rust => 1450.0,
            Language::Node => 1100.0,
            Language::Python => 1020.0,
            Language::Go => 820.0,
            Language::Java => 780.0,
            Language::Unknown => 500.0,
        }
    };

    let compile_factor = match language {
        Language::Rust => 3.0,
        Language::Java => 2.0,
        Language::Go => 1.3,
        _ => 1.0,
    };
    let runs = instructions.iter().filter(|i| i.is("RUN")).count() as f64;
    let stages = dockerfile::base_images(&instructions).len().max(1) as f64;
    let cached = content.contains("--mount=type=cache");
    let mut build = (20.0 + 25.0 * runs + 15.0 * (stages - 1.0)) * compile_factor;
    if cached {
        build *= 0.6;
    }

    let user = dockerfile::final_user(&instructions);
    let mut security: f64 = 40.0;
    if user.is_some_and(|u| !u.starts_with("root") && u != "0") {
        security += 25.0;
    }
    if image.contains("distroless") || image.contains("alpine") || image.contains("slim") {
        security += 15.0;
    }
    if instructions.iter().any(|i| i.is("HEALTHCHECK")) {
        security += 10.0;
    }
    if content.contains("rm -rf /var/lib/apt/lists") || content.contains("apk upgrade --no-cache") {
        security += 10.0;
    }

    CandidateMetadata {
        estimated_build_secs: build,
        estimated_size_mb: size,
        estimated_security: security.min(100.0),
        base_image: final_image,
        tokens_used: None,
    }
}
