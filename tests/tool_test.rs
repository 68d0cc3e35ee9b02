use std::fs;
use std::sync::Arc;

use kiln::tools::{self, ToolRegistry};
use kiln::{DockerfileTool, KilnError, Pipeline, ScoreTool, Scorer, ToolHandler};
use serde_json::json;

const LOOSE: &str = "FROM ubuntu:latest\nRUN apt-get update\nRUN apt-get install -y python3\nRUN apt-get install -y curl\nRUN curl https://example.com/install.sh | sh\nRUN pip install flask\nADD . /srv\nCMD python3 /srv/app.py\n";

const TIGHT: &str = "FROM python:3.12-slim\nWORKDIR /app\nCOPY requirements.txt .\nRUN pip install --no-cache-dir -r requirements.txt\nCOPY --chown=app:app . .\nUSER app\nEXPOSE 8000\nCMD [\"python\", \"app.py\"]\n";

fn registry() -> ToolRegistry {
    let pipeline = Arc::new(Pipeline::builder().build().unwrap());
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(DockerfileTool::new(pipeline)));
    registry.register(Arc::new(ScoreTool::new(Scorer::default())));
    registry
}

#[test]
fn registry_lists_tools() {
    let names: Vec<_> = registry().names().map(str::to_string).collect();
    assert_eq!(names, ["generate_dockerfile", "score_dockerfile"]);
}

#[tokio::test]
async fn unknown_tool_is_rejected() {
    let result = registry().invoke("deploy", &json!({})).await;
    assert!(matches!(result, Err(KilnError::InvalidInput(_))));
}

#[tokio::test]
async fn generate_from_context_hints_build() {
    let invocation = registry()
        .invoke(
            DockerfileTool::NAME,
            &json!({
                "context": {"name": "shop", "language": "node", "framework": "express", "port": 3000},
                "count": 3,
                "top_k": 2,
            }),
        )
        .await
        .unwrap();

    let content = &invocation.output.content;
    assert_eq!(content["project"], "shop");
    assert_eq!(content["language"], "node");
    assert_eq!(content["cached"], false);
    assert_eq!(content["candidates"].as_array().unwrap().len(), 2);
    let dockerfile = content["best"]["dockerfile"].as_str().unwrap();
    assert!(dockerfile.contains("FROM node"));

    let hint = invocation.hint.unwrap();
    assert_eq!(hint.next_tool, "build_image");
    assert_eq!(hint.arguments["tag"], "shop:latest");
    assert_eq!(hint.arguments["dockerfile"], dockerfile);
}

#[tokio::test]
async fn generate_from_path_detects_project() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("go.mod"), "module example.com/api\n\nrequire github.com/gin-gonic/gin v1.9.1\n").unwrap();

    let invocation = registry()
        .invoke(DockerfileTool::NAME, &json!({"path": dir.path()}))
        .await
        .unwrap();

    assert_eq!(invocation.output.content["language"], "go");
    assert!(invocation.output.summary.contains("ranked best"));
}

#[test]
fn generate_argument_validation() {
    let pipeline = Arc::new(Pipeline::builder().build().unwrap());
    let tool = DockerfileTool::new(pipeline);

    assert!(tool.validate(&json!({})).is_err());
    assert!(tool.validate(&json!({"path": "/tmp", "context": {"name": "x", "language": "go"}})).is_err());
    assert!(tool.validate(&json!({"path": "/tmp", "count": 0})).is_err());
    assert!(tool.validate(&json!({"path": "/tmp", "profile": "nightly"})).is_err());
    assert!(tool.validate(&json!({"path": "/tmp", "colour": "blue"})).is_err());
    assert!(tool.validate(&json!(["path"])).is_err());
    assert!(tool.validate(&json!({"path": "/tmp", "profile": "production"})).is_ok());
}

#[tokio::test]
async fn score_ranks_files_and_suggests_regeneration() {
    let tool = ScoreTool::new(Scorer::default()).regenerate_below(101.0);
    let invocation = tools::invoke(
        &tool,
        &json!({
            "dockerfiles": [
                {"name": "loose", "content": LOOSE},
                {"name": "tight", "content": TIGHT},
            ],
            "profile": "security",
            "language": "python",
        }),
    )
    .await
    .unwrap();

    let content = &invocation.output.content;
    assert_eq!(content["profile"], "security");
    assert_eq!(content["best"]["name"], "tight");
    let ranking = content["ranking"].as_array().unwrap();
    assert_eq!(ranking[0]["rank"], 1);
    assert_eq!(ranking[1]["name"], "loose");

    let hint = invocation.hint.unwrap();
    assert_eq!(hint.next_tool, "generate_dockerfile");
    assert_eq!(hint.arguments["profile"], "security");
}

#[tokio::test]
async fn score_skips_hint_for_good_files() {
    let tool = ScoreTool::new(Scorer::default()).regenerate_below(0.0);
    let invocation = tools::invoke(
        &tool,
        &json!({"dockerfiles": [{"name": "tight", "content": TIGHT}]}),
    )
    .await
    .unwrap();

    assert_eq!(invocation.output.content["profile"], "balanced");
    assert!(invocation.hint.is_none());
}

#[test]
fn score_argument_validation() {
    let tool = ScoreTool::new(Scorer::default());
    assert!(tool.validate(&json!({"dockerfiles": []})).is_err());
    assert!(
        tool.validate(&json!({"dockerfiles": [{"name": "bad", "content": "RUN echo hi"}]}))
            .is_err()
    );
    assert!(
        tool.validate(&json!({"dockerfiles": [{"name": "ok", "content": TIGHT}], "profile": "nope"}))
            .is_err()
    );
}
