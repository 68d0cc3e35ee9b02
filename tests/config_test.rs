use std::fs;
use std::time::Duration;

use kiln::{Config, KilnError, Language, Pipeline, ProjectContext, RankOptions};

#[test]
fn load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiln.toml");
    fs::write(
        &path,
        "[cache]\nttl_secs = 30\n\n[generation]\ncandidates = 2\n\n[scoring]\ndefault_profile = \"development\"\n",
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();

    assert_eq!(config.cache.ttl, Duration::from_secs(30));
    assert_eq!(config.generation.candidates, 2);
    assert_eq!(
        config.profile_set().unwrap().default_profile().name(),
        "development"
    );
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
    assert!(matches!(err, KilnError::Configuration(_)));
}

#[test]
fn malformed_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[cache\nenabled = ").unwrap();

    match Config::load_from(&path) {
        Err(KilnError::Configuration(msg)) => assert!(msg.contains("broken.toml"), "{msg}"),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn legacy_ttl_key_is_accepted() {
    let config = Config::parse("[cache]\nttl = 45").unwrap();
    assert_eq!(config.cache.ttl, Duration::from_secs(45));
}

#[tokio::test]
async fn pipeline_follows_config() {
    let config = Config::parse(
        "[generation]\ncandidates = 2\n\n[scoring]\ndefault_profile = \"fast\"\n\n[scoring.profiles.fast]\nbuild_time = 1.0\n",
    )
    .unwrap();
    let pipeline = Pipeline::builder().config(&config).unwrap().build().unwrap();

    let ranked = pipeline
        .generate_ranked(&ProjectContext::new("svc", Language::Go), &RankOptions::new())
        .await
        .unwrap();

    assert_eq!(ranked.profile, "fast");
    assert_eq!(ranked.candidates.len(), 2);
}

#[tokio::test]
async fn disabled_cache_in_config_disables_pipeline_cache() {
    let config = Config::parse("[cache]\nenabled = false").unwrap();
    let pipeline = Pipeline::builder().config(&config).unwrap().build().unwrap();
    assert!(pipeline.cache().is_none());
}
