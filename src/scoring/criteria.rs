//! Criterion functions.
//!
//! Each function reads one candidate's content and metadata and returns a
//! score in [0, 100]. No I/O, no randomness, no shared state.

use std::collections::BTreeMap;

use crate::dockerfile::{self, Instruction};
use crate::types::{Candidate, Criterion};

/// Score `candidate` on `criterion`.
pub fn evaluate(criterion: Criterion, candidate: &Candidate) -> f64 {
    let instructions = dockerfile::parse(&candidate.content);
    score_parsed(criterion, candidate, &instructions)
}

/// Score `candidate` on every criterion, parsing its content once.
pub fn evaluate_all(candidate: &Candidate) -> BTreeMap<Criterion, f64> {
    let instructions = dockerfile::parse(&candidate.content);
    Criterion::ALL
        .into_iter()
        .map(|c| (c, score_parsed(c, candidate, &instructions)))
        .collect()
}

fn score_parsed(criterion: Criterion, candidate: &Candidate, instructions: &[Instruction]) -> f64 {
    let score = match criterion {
        Criterion::BuildTime => build_time(candidate),
        Criterion::ImageSize => image_size(candidate),
        Criterion::Security => security(candidate, instructions),
        Criterion::BestPractices => best_practices(instructions),
        Criterion::Maintainability => maintainability(candidate, instructions),
        Criterion::Performance => performance(candidate, instructions),
    };
    clamp(score)
}

fn clamp(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) }
}

/// Neutral score when a generation-time estimate is missing.
const UNKNOWN: f64 = 50.0;

/// Faster estimated build → higher. Linear from 30s (100) to 600s (0).
pub fn build_time(candidate: &Candidate) -> f64 {
    let secs = candidate.metadata.estimated_build_secs;
    if secs.is_nan() || secs <= 0.0 {
        return UNKNOWN;
    }
    100.0 * (600.0 - secs) / (600.0 - 30.0)
}

/// Smaller estimated image → higher. Log scale from 25MB (100) to 1.5GB (0).
pub fn image_size(candidate: &Candidate) -> f64 {
    let mb = candidate.metadata.estimated_size_mb;
    if mb.is_nan() || mb <= 0.0 {
        return UNKNOWN;
    }
    let (lo, hi) = (25f64.ln(), 1500f64.ln());
    100.0 * (hi - mb.ln()) / (hi - lo)
}

fn is_minimal_image(image: &str) -> bool {
    ["alpine", "slim", "distroless", "scratch"]
        .iter()
        .any(|m| image.contains(m))
}

fn is_pinned(image: &str) -> bool {
    if image.contains('@') {
        return true;
    }
    // A colon after the last slash is a tag; one before it is a registry port.
    let tail = image.rsplit('/').next().unwrap_or(image);
    match tail.split_once(':') {
        Some((_, tag)) => tag != "latest" && !tag.is_empty(),
        None => image == "scratch",
    }
}

/// Non-root execution, minimal pinned base, patched and cleaned packages.
pub fn security(candidate: &Candidate, instructions: &[Instruction]) -> f64 {
    let content = candidate.content.to_ascii_lowercase();
    let mut score = 30.0;

    match dockerfile::final_user(instructions) {
        Some(user) if !user.starts_with("root") && user != "0" => score += 25.0,
        Some(_) => score -= 10.0,
        None => {}
    }
    if let Some(image) = dockerfile::final_image(instructions) {
        if is_minimal_image(image) {
            score += 15.0;
        }
        if is_pinned(image) {
            score += 10.0;
        }
    }
    if content.contains("rm -rf /var/lib/apt/lists")
        || content.contains("apk upgrade --no-cache")
        || content.contains("apk add --no-cache")
    {
        score += 10.0;
    }
    if instructions.iter().any(|i| i.is("COPY") && i.args.contains("--chown")) {
        score += 5.0;
    }
    if instructions.iter().any(|i| i.is("HEALTHCHECK")) {
        score += 5.0;
    }

    let secret_env = instructions.iter().any(|i| {
        (i.is("ENV") || i.is("ARG")) && {
            let upper = i.args.to_ascii_uppercase();
            ["PASSWORD", "SECRET", "TOKEN", "API_KEY"]
                .iter()
                .any(|k| upper.contains(k))
        }
    });
    if secret_env {
        score -= 25.0;
    }
    if content.contains("| sh") || content.contains("| bash") {
        score -= 15.0;
    }
    if instructions.iter().any(|i| i.is("ADD") && i.args.contains("://")) {
        score -= 10.0;
    }
    if content.contains("sudo ") {
        score -= 10.0;
    }
    score
}

/// Explicit working directory, few layers, health probe, exec-form command.
pub fn best_practices(instructions: &[Instruction]) -> f64 {
    let mut score = 10.0;
    if instructions.iter().any(|i| i.is("WORKDIR")) {
        score += 20.0;
    }

    let runs = instructions.iter().filter(|i| i.is("RUN")).count();
    score += match runs {
        0..=3 => 20.0,
        4..=5 => 10.0,
        _ => 0.0,
    };

    if instructions.iter().any(|i| i.is("HEALTHCHECK")) {
        score += 15.0;
    }

    let command = instructions
        .iter()
        .rev()
        .find(|i| i.is("CMD") || i.is("ENTRYPOINT"));
    if command.is_some_and(|i| i.args.trim_start().starts_with('[')) {
        score += 15.0;
    }
    if instructions.iter().any(|i| i.is("EXPOSE")) {
        score += 10.0;
    }
    if !instructions.iter().any(|i| i.is("ADD")) {
        score += 10.0;
    }
    score
}

/// Short, pinned, readable files that separate dependencies from sources.
pub fn maintainability(candidate: &Candidate, instructions: &[Instruction]) -> f64 {
    let mut score = 40.0;

    score += match instructions.len() {
        0..=15 => 15.0,
        16..=30 => 5.0,
        _ => -10.0,
    };
    if dockerfile::base_images(instructions).iter().all(|i| is_pinned(i)) {
        score += 15.0;
    }

    let runs: Vec<&Instruction> = instructions.iter().filter(|i| i.is("RUN")).collect();
    let longest = runs.iter().map(|i| i.args.len()).max().unwrap_or(0);
    if longest <= 150 {
        score += 15.0;
    } else if longest > 300 {
        score -= 10.0;
    }

    let documented = candidate
        .content
        .lines()
        .any(|l| l.trim_start().starts_with('#') && !l.contains("syntax="))
        || instructions.iter().any(|i| i.is("LABEL"));
    if documented {
        score += 10.0;
    }
    if copies_manifest_first(instructions) {
        score += 10.0;
    }
    score
}

/// Small runtime, separated build stage, cached dependency layers.
pub fn performance(candidate: &Candidate, instructions: &[Instruction]) -> f64 {
    let content = &candidate.content;
    let mut score = 30.0;

    if dockerfile::final_image(instructions).is_some_and(is_minimal_image) {
        score += 20.0;
    }
    if dockerfile::base_images(instructions).len() > 1 {
        score += 20.0;
    }
    if content.contains("--mount=type=cache") {
        score += 10.0;
    }
    if copies_manifest_first(instructions) {
        score += 10.0;
    }
    if ["--release", "-ldflags", "--omit=dev", "--no-cache-dir", "-DskipTests"]
        .iter()
        .any(|flag| content.contains(flag))
    {
        score += 10.0;
    }
    score
}

/// Whether some COPY of specific files precedes the first `COPY . .`.
fn copies_manifest_first(instructions: &[Instruction]) -> bool {
    let is_copy_all = |i: &Instruction| {
        i.is("COPY") && {
            let parts: Vec<&str> = i.args.split_whitespace().filter(|t| !t.starts_with("--")).collect();
            parts.first() == Some(&".")
        }
    };
    let Some(copy_all) = instructions.iter().position(|i| is_copy_all(i)) else {
        return false;
    };
    instructions[..copy_all]
        .iter()
        .any(|i| i.is("COPY") && !i.args.contains("--from"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateMetadata;

    fn candidate(content: &str, build: f64, size: f64) -> Candidate {
        Candidate::new(
            0,
            "test",
            content,
            0.5,
            CandidateMetadata {
                estimated_build_secs: build,
                estimated_size_mb: size,
                ..CandidateMetadata::default()
            },
        )
    }

    const HARDENED: &str = "\
FROM python:3.12-slim
RUN apt-get update && apt-get upgrade -y && rm -rf /var/lib/apt/lists/*
WORKDIR /app
COPY requirements.txt ./
RUN pip install --no-cache-dir -r requirements.txt
COPY --chown=app:app . .
USER app
EXPOSE 5000
HEALTHCHECK CMD python -c \"print(1)\"
CMD [\"python\", \"app.py\"]
";

    const SLOPPY: &str = "\
FROM python
ADD https://example.com/install.sh /tmp/
RUN curl https://example.com/x | sh
ENV API_KEY=abc
COPY . /app
CMD python /app/app.py
";

    #[test]
    fn every_criterion_stays_in_range() {
        for c in [
            candidate(HARDENED, 10.0, 10.0),
            candidate(SLOPPY, 5000.0, 9000.0),
            candidate("", 0.0, 0.0),
        ] {
            for criterion in Criterion::ALL {
                let s = evaluate(criterion, &c);
                assert!((0.0..=100.0).contains(&s), "{criterion}: {s}");
            }
        }
    }

    #[test]
    fn hardened_beats_sloppy_on_content_criteria() {
        let good = candidate(HARDENED, 100.0, 160.0);
        let bad = candidate(SLOPPY, 100.0, 160.0);
        for criterion in [Criterion::Security, Criterion::BestPractices, Criterion::Maintainability] {
            assert!(
                evaluate(criterion, &good) > evaluate(criterion, &bad),
                "{criterion}"
            );
        }
    }

    #[test]
    fn estimates_drive_build_time_and_size() {
        let fast = candidate(HARDENED, 60.0, 50.0);
        let slow = candidate(HARDENED, 400.0, 1000.0);
        assert!(build_time(&fast) > build_time(&slow));
        assert!(image_size(&fast) > image_size(&slow));
        assert_eq!(build_time(&candidate(HARDENED, 0.0, 0.0)), UNKNOWN);
    }

    #[test]
    fn pinning_rules() {
        assert!(is_pinned("python:3.12-slim"));
        assert!(is_pinned("gcr.io/distroless/static@sha256:abc"));
        assert!(!is_pinned("python"));
        assert!(!is_pinned("node:latest"));
        assert!(!is_pinned("localhost:5000/app"));
    }

    #[test]
    fn manifest_first_detection() {
        let ins = dockerfile::parse(HARDENED);
        assert!(copies_manifest_first(&ins));
        let ins = dockerfile::parse(SLOPPY);
        assert!(!copies_manifest_first(&ins));
    }
}
