//! Scoring output types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::KilnError;
use crate::types::Candidate;

/// Scoring criterion.
///
/// Declaration order is the evaluation order, which keeps the weighted sum
/// bit-for-bit reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    BuildTime,
    ImageSize,
    Security,
    BestPractices,
    Maintainability,
    Performance,
}

impl Criterion {
    /// All criteria in evaluation order.
    pub const ALL: [Criterion; 6] = [
        Criterion::BuildTime,
        Criterion::ImageSize,
        Criterion::Security,
        Criterion::BestPractices,
        Criterion::Maintainability,
        Criterion::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::BuildTime => "build_time",
            Criterion::ImageSize => "image_size",
            Criterion::Security => "security",
            Criterion::BestPractices => "best_practices",
            Criterion::Maintainability => "maintainability",
            Criterion::Performance => "performance",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Criterion::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| KilnError::InvalidProfile(format!("unknown criterion '{s}'")))
    }
}

/// Per-criterion scores plus the weighted aggregate for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Criterion → score in [0, 100].
    pub scores: BTreeMap<Criterion, f64>,
    /// Weighted average of `scores` under the profile used.
    pub aggregate: f64,
    /// 1 = best. Zero until a [`Ranker`](crate::scoring::Ranker) assigns it.
    pub rank: usize,
}

impl ScoreBreakdown {
    /// Score for one criterion, if it was evaluated.
    pub fn score(&self, criterion: Criterion) -> Option<f64> {
        self.scores.get(&criterion).copied()
    }

    pub fn is_ranked(&self) -> bool {
        self.rank > 0
    }
}

/// A candidate paired with its score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub breakdown: ScoreBreakdown,
}

impl ScoredCandidate {
    pub fn rank(&self) -> usize {
        self.breakdown.rank
    }

    pub fn aggregate(&self) -> f64 {
        self.breakdown.aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_round_trips_through_str() {
        for c in Criterion::ALL {
            assert_eq!(c.as_str().parse::<Criterion>().unwrap(), c);
        }
        assert!("speed".parse::<Criterion>().is_err());
    }

    #[test]
    fn criterion_serde_uses_snake_case() {
        let json = serde_json::to_string(&Criterion::BestPractices).unwrap();
        assert_eq!(json, "\"best_practices\"");
    }
}
