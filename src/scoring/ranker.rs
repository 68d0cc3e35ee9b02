//! Ranking.

use std::cmp::Ordering;

use serde::Serialize;

use crate::types::ScoredCandidate;

/// Orders scored candidates and assigns ranks.
///
/// Order is aggregate descending; equal aggregates fall back to generation
/// order, earliest first. Ranks are `1..=n` with no gaps or ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker;

impl Ranker {
    pub fn new() -> Self {
        Self
    }

    /// Rank every candidate.
    pub fn rank(&self, mut scored: Vec<ScoredCandidate>) -> Ranking {
        scored.sort_by(compare);
        for (idx, sc) in scored.iter_mut().enumerate() {
            sc.breakdown.rank = idx + 1;
        }
        Ranking { ranked: scored }
    }

    /// The best `k` of a full ranking.
    pub fn top_k(&self, scored: Vec<ScoredCandidate>, k: usize) -> Vec<ScoredCandidate> {
        let mut ranking = self.rank(scored).into_vec();
        ranking.truncate(k);
        ranking
    }

    /// Rank 1 of a full ranking.
    pub fn best(&self, scored: Vec<ScoredCandidate>) -> Option<ScoredCandidate> {
        self.rank(scored).into_vec().into_iter().next()
    }
}

fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.aggregate()
        .total_cmp(&a.aggregate())
        .then_with(|| a.candidate.ordinal.cmp(&b.candidate.ordinal))
        .then_with(|| a.candidate.strategy.cmp(&b.candidate.strategy))
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}

/// Result of one ranking call, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    ranked: Vec<ScoredCandidate>,
}

impl Ranking {
    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.ranked.first()
    }

    /// The first `k` entries, or all when fewer.
    pub fn top(&self, k: usize) -> &[ScoredCandidate] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.ranked.iter()
    }

    pub fn into_vec(self) -> Vec<ScoredCandidate> {
        self.ranked
    }
}

impl IntoIterator for Ranking {
    type Item = ScoredCandidate;
    type IntoIter = std::vec::IntoIter<ScoredCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranked.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::types::{Candidate, CandidateMetadata, ScoreBreakdown};

    fn scored(ordinal: usize, aggregate: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate::new(ordinal, format!("s{ordinal}"), "FROM a", 0.5, CandidateMetadata::default()),
            breakdown: ScoreBreakdown {
                scores: BTreeMap::new(),
                aggregate,
                rank: 0,
            },
        }
    }

    #[test]
    fn ranks_are_contiguous_and_descending() {
        let ranking = Ranker::new().rank(vec![scored(0, 40.0), scored(1, 90.0), scored(2, 65.0)]);
        let ranks: Vec<usize> = ranking.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        let ordinals: Vec<usize> = ranking.iter().map(|s| s.candidate.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 0]);
    }

    #[test]
    fn ties_go_to_earlier_candidate() {
        let ranking = Ranker::new().rank(vec![scored(2, 70.0), scored(0, 70.0), scored(1, 70.0)]);
        let ordinals: Vec<usize> = ranking.iter().map(|s| s.candidate.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn top_k_and_best_share_the_full_ranking() {
        let input = vec![scored(0, 10.0), scored(1, 30.0), scored(2, 20.0)];
        let ranker = Ranker::new();
        let best = ranker.best(input.clone()).unwrap();
        let top = ranker.top_k(input, 2);
        assert_eq!(best.rank(), 1);
        assert_eq!(top[0].candidate.id, best.candidate.id);
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].rank(), 2);
    }

    #[test]
    fn empty_input() {
        let ranking = Ranker::new().rank(Vec::new());
        assert!(ranking.is_empty());
        assert!(ranking.best().is_none());
        assert!(ranking.top(3).is_empty());
    }
}
