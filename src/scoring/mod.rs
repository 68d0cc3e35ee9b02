//! Candidate scoring and ranking.
//!
//! The [`Scorer`] evaluates every [`Criterion`] for each candidate and
//! combines them under a [`WeightProfile`]:
//!
//! ```text
//! aggregate = Σ score(c) · weight(c) / Σ weight(c)
//! ```
//!
//! Sums run in [`Criterion::ALL`] order so the result is bit-for-bit
//! reproducible. Ranks are left at zero; the [`Ranker`] assigns them once
//! all siblings are scored.

pub mod criteria;
pub mod profile;
pub mod ranker;

use tracing::debug;

use crate::Result;
use crate::types::{Candidate, Criterion, ScoreBreakdown, ScoredCandidate};

pub use profile::{BALANCED, ProfileSet, WeightProfile};
pub use ranker::{Ranker, Ranking};

/// Scores candidates under named weight profiles.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    profiles: ProfileSet,
}

impl Scorer {
    pub fn new(profiles: ProfileSet) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Score every candidate with the named profile, or the default.
    pub fn score(&self, candidates: &[Candidate], profile: Option<&str>) -> Result<Vec<ScoredCandidate>> {
        let profile = self.profiles.resolve(profile)?;
        debug!(profile = profile.name(), candidates = candidates.len(), "scoring");
        Ok(candidates
            .iter()
            .map(|c| ScoredCandidate {
                candidate: c.clone(),
                breakdown: Self::breakdown(c, profile),
            })
            .collect())
    }

    /// Score one candidate under `profile`. Rank is left unassigned.
    pub fn breakdown(candidate: &Candidate, profile: &WeightProfile) -> ScoreBreakdown {
        let scores = criteria::evaluate_all(candidate);
        let aggregate = aggregate(&scores, profile);
        ScoreBreakdown {
            scores,
            aggregate,
            rank: 0,
        }
    }

    /// Score and rank in one step.
    pub fn rank(&self, candidates: &[Candidate], profile: Option<&str>) -> Result<Ranking> {
        Ok(Ranker::new().rank(self.score(candidates, profile)?))
    }
}

fn aggregate(scores: &std::collections::BTreeMap<Criterion, f64>, profile: &WeightProfile) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for criterion in Criterion::ALL {
        let weight = profile.get(criterion);
        if weight <= 0.0 {
            continue;
        }
        if let Some(score) = scores.get(&criterion) {
            weighted += score * weight;
            total += weight;
        }
    }
    if total > 0.0 { weighted / total } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn zero_weight_criteria_do_not_count() {
        let scores: BTreeMap<Criterion, f64> = Criterion::ALL
            .into_iter()
            .map(|c| (c, if c == Criterion::Security { 90.0 } else { 10.0 }))
            .collect();
        let only_security = WeightProfile::new("s").weight(Criterion::Security, 2.0);
        assert_eq!(aggregate(&scores, &only_security), 90.0);

        let with_zero = only_security.clone().weight(Criterion::BuildTime, 0.0);
        assert_eq!(aggregate(&scores, &with_zero), 90.0);
    }

    #[test]
    fn weighted_average() {
        let scores: BTreeMap<Criterion, f64> =
            [(Criterion::Security, 80.0), (Criterion::BuildTime, 20.0)].into_iter().collect();
        let profile = WeightProfile::new("p")
            .weight(Criterion::Security, 3.0)
            .weight(Criterion::BuildTime, 1.0);
        assert_eq!(aggregate(&scores, &profile), (80.0 * 3.0 + 20.0) / 4.0);
    }
}
