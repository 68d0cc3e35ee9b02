use kiln::scoring::criteria;
use kiln::{
    Candidate, CandidateMetadata, Criterion, KilnError, ProfileSet, Ranker, Scorer, WeightProfile,
};

const ROOT_LATEST: &str = "FROM python:latest\nCOPY . .\nRUN pip install -r requirements.txt\nCMD python app.py\n";

const HARDENED: &str = "\
FROM python:3.12-slim
WORKDIR /app
RUN apt-get update && apt-get install -y --no-install-recommends curl && rm -rf /var/lib/apt/lists/*
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY --chown=app:app . .
USER app
EXPOSE 8000
HEALTHCHECK CMD curl -f http://localhost:8000/health || exit 1
CMD [\"python\", \"app.py\"]
";

fn metadata(build_secs: f64, size_mb: f64) -> CandidateMetadata {
    CandidateMetadata {
        estimated_build_secs: build_secs,
        estimated_size_mb: size_mb,
        estimated_security: 50.0,
        ..CandidateMetadata::default()
    }
}

fn candidate(ordinal: usize, strategy: &str, content: &str) -> Candidate {
    Candidate::new(ordinal, strategy, content, 0.8, metadata(120.0, 200.0))
}

#[test]
fn every_criterion_is_scored_within_bounds() {
    let scorer = Scorer::default();
    let scored = scorer
        .score(&[candidate(0, "a", ROOT_LATEST), candidate(1, "b", HARDENED)], None)
        .unwrap();

    for sc in &scored {
        assert_eq!(sc.breakdown.scores.len(), Criterion::ALL.len());
        for (criterion, score) in &sc.breakdown.scores {
            assert!((0.0..=100.0).contains(score), "{criterion}: {score}");
        }
        assert!((0.0..=100.0).contains(&sc.aggregate()));
        assert!(!sc.breakdown.is_ranked());
    }
}

#[test]
fn scoring_is_deterministic() {
    let scorer = Scorer::default();
    let c = candidate(0, "a", HARDENED);
    let first = scorer.score(std::slice::from_ref(&c), Some("production")).unwrap();
    let second = scorer.score(std::slice::from_ref(&c), Some("production")).unwrap();
    assert_eq!(first[0].breakdown, second[0].breakdown);
}

#[test]
fn hardened_file_outscores_root_file_on_security() {
    let root = candidate(0, "root", ROOT_LATEST);
    let hardened = candidate(1, "hardened", HARDENED);

    assert!(
        criteria::evaluate(Criterion::Security, &hardened)
            > criteria::evaluate(Criterion::Security, &root)
    );
    assert!(
        criteria::evaluate(Criterion::BestPractices, &hardened)
            > criteria::evaluate(Criterion::BestPractices, &root)
    );
}

#[test]
fn build_time_and_size_follow_estimates() {
    let fast_small = Candidate::new(0, "a", HARDENED, 0.8, metadata(30.0, 25.0));
    let slow_large = Candidate::new(1, "b", HARDENED, 0.8, metadata(600.0, 1500.0));
    let unknown = Candidate::new(2, "c", HARDENED, 0.8, CandidateMetadata::default());

    assert_eq!(criteria::build_time(&fast_small), 100.0);
    assert_eq!(criteria::evaluate(Criterion::BuildTime, &slow_large), 0.0);
    assert!((criteria::image_size(&fast_small) - 100.0).abs() < 1e-9);
    assert!(criteria::evaluate(Criterion::ImageSize, &slow_large).abs() < 1e-9);
    assert_eq!(criteria::build_time(&unknown), 50.0);
    assert_eq!(criteria::image_size(&unknown), 50.0);
}

#[test]
fn ranks_are_dense_and_ordered() {
    let scorer = Scorer::default();
    let ranking = scorer
        .rank(
            &[
                candidate(0, "root", ROOT_LATEST),
                candidate(1, "hardened", HARDENED),
                Candidate::new(2, "fast", HARDENED, 0.8, metadata(30.0, 25.0)),
            ],
            None,
        )
        .unwrap();

    let ranks: Vec<_> = ranking.iter().map(|s| s.rank()).collect();
    assert_eq!(ranks, [1, 2, 3]);
    let aggregates: Vec<_> = ranking.iter().map(|s| s.aggregate()).collect();
    assert!(aggregates.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(ranking.best().unwrap().candidate.strategy, "fast");
}

#[test]
fn ties_go_to_the_earlier_candidate() {
    let scorer = Scorer::default();
    let scored = scorer
        .score(
            &[
                candidate(0, "first", HARDENED),
                candidate(1, "second", HARDENED),
                candidate(2, "third", HARDENED),
            ],
            None,
        )
        .unwrap();
    let mut reversed = scored.clone();
    reversed.reverse();

    let ranking = Ranker::new().rank(reversed);
    let order: Vec<_> = ranking.iter().map(|s| s.candidate.strategy.as_str()).collect();
    assert_eq!(order, ["first", "second", "third"]);
}

#[test]
fn top_k_truncates_after_ranking() {
    let scorer = Scorer::default();
    let scored = scorer
        .score(
            &[
                candidate(0, "root", ROOT_LATEST),
                candidate(1, "hardened", HARDENED),
            ],
            None,
        )
        .unwrap();

    let top = Ranker::new().top_k(scored.clone(), 1);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].rank(), 1);
    assert_eq!(
        top[0].candidate.strategy,
        Ranker::new().best(scored).unwrap().candidate.strategy
    );
}

#[test]
fn profile_changes_the_aggregate() {
    let scorer = Scorer::default();
    let c = candidate(0, "a", ROOT_LATEST);
    let dev = scorer.score(std::slice::from_ref(&c), Some("development")).unwrap();
    let sec = scorer.score(std::slice::from_ref(&c), Some("security")).unwrap();
    assert_eq!(dev[0].breakdown.scores, sec[0].breakdown.scores);
    assert_ne!(dev[0].aggregate(), sec[0].aggregate());
}

#[test]
fn unknown_profile_is_rejected() {
    let scorer = Scorer::default();
    let result = scorer.score(&[candidate(0, "a", HARDENED)], Some("nightly"));
    assert!(matches!(result, Err(KilnError::UnknownProfile(name)) if name == "nightly"));
}

#[test]
fn custom_profile_can_become_default() {
    let mut profiles = ProfileSet::builtin();
    profiles
        .insert(WeightProfile::new("size-only").weight(Criterion::ImageSize, 1.0))
        .unwrap();
    profiles.set_default("size-only").unwrap();
    let scorer = Scorer::new(profiles);

    let c = Candidate::new(0, "a", HARDENED, 0.8, metadata(120.0, 25.0));
    let scored = scorer.score(&[c], None).unwrap();
    assert!((scored[0].aggregate() - 100.0).abs() < 1e-9);
}

#[test]
fn invalid_profiles_are_refused() {
    let mut profiles = ProfileSet::builtin();
    assert!(matches!(
        profiles.insert(WeightProfile::new("empty")),
        Err(KilnError::InvalidProfile(_))
    ));
    assert!(matches!(
        profiles.insert(WeightProfile::new("negative").weight(Criterion::Security, -1.0)),
        Err(KilnError::InvalidProfile(_))
    ));
    assert!(profiles.get("empty").is_err());
}
