//! Candidate artifacts produced by the generators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generation-time estimates attached to a candidate.
///
/// These are heuristics computed while the draft is produced. They are
/// distinct from the scorer's post-hoc evaluation, which reads them as
/// inputs alongside the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Estimated image build time in seconds.
    pub estimated_build_secs: f64,
    /// Estimated final image size in megabytes.
    pub estimated_size_mb: f64,
    /// Estimated security rating, 0–100.
    pub estimated_security: f64,
    /// Base image the draft builds on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    /// Tokens spent producing the draft, when a sampler was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

/// One generated draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Fresh on every generation call.
    pub id: Uuid,
    /// Position in generation order within one call. Ranking ties go to
    /// the lower ordinal.
    pub ordinal: usize,
    /// Strategy name that produced the draft.
    pub strategy: String,
    /// Raw artifact content.
    pub content: String,
    /// Confidence estimate, 0.0–1.0.
    pub confidence: f64,
    pub metadata: CandidateMetadata,
}

impl Candidate {
    pub fn new(
        ordinal: usize,
        strategy: impl Into<String>,
        content: impl Into<String>,
        confidence: f64,
        metadata: CandidateMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ordinal,
            strategy: strategy.into(),
            content: content.into(),
            confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_confidence(confidence: f64) -> Candidate {
        Candidate::new(0, "minimal", "FROM alpine", confidence, CandidateMetadata::default())
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(with_confidence(1.7).confidence, 1.0);
        assert_eq!(with_confidence(-0.2).confidence, 0.0);
        assert_eq!(with_confidence(0.4).confidence, 0.4);
    }

    #[test]
    fn non_finite_confidence_is_zero() {
        assert_eq!(with_confidence(f64::NAN).confidence, 0.0);
        assert_eq!(with_confidence(f64::INFINITY).confidence, 0.0);
    }
}
