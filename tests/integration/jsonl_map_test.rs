//! JSONL Map Integration Tests
//!
//! llm_map and agentic_map through the coordinator registry, with scripted
//! completion and sub-agent backends writing into a temp directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use agent_coordinator::services::tools::impls::CompletionClient;
use agent_coordinator::services::tools::{
    build_coordinator_tools, CoordinatorToolDeps, TaskExecutionResult, TaskSpawner,
    ToolExecutionContext, ToolRegistry,
};
use agent_coordinator::utils::error::AppResult;
use agent_coordinator::RequestContext;

// ============================================================================
// Helpers
// ============================================================================

/// Uppercases the `word` field of the item embedded in the prompt.
struct UpperClient {
    peak: AtomicUsize,
    in_flight: AtomicUsize,
}

#[async_trait]
impl CompletionClient for UpperClient {
    async fn complete(&self, _model: &str, prompt: &str) -> AppResult<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let start = prompt.find('{').unwrap_or(0);
        let item: Value = serde_json::from_str(&prompt[start..])?;
        let word = item["word"].as_str().unwrap_or_default().to_uppercase();
        Ok(format!("```json\n{{\"upper\": \"{}\"}}\n```", word))
    }
}

/// Sub-agent that never finishes until cancelled.
struct StuckSpawner;

#[async_trait]
impl TaskSpawner for StuckSpawner {
    async fn spawn_task(
        &self,
        _prompt: String,
        _read_only: bool,
        cancellation_token: CancellationToken,
    ) -> TaskExecutionResult {
        cancellation_token.cancelled().await;
        TaskExecutionResult::failed("stopped")
    }
}

fn tools(client: Arc<UpperClient>) -> ToolRegistry {
    build_coordinator_tools(CoordinatorToolDeps {
        completion: Some(client),
        task_spawner: Some(Arc::new(StuckSpawner)),
        ..Default::default()
    })
}

fn write_words(dir: &TempDir, words: &[&str]) {
    let body: String = words
        .iter()
        .map(|w| format!("{}\n", json!({ "word": w })))
        .collect();
    std::fs::write(dir.path().join("in.jsonl"), body).unwrap();
}

fn read_rows(dir: &TempDir) -> Vec<Value> {
    std::fs::read_to_string(dir.path().join("out.jsonl"))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_llm_map_preserves_order_and_bounds_concurrency() {
    let dir = TempDir::new().unwrap();
    let words = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta"];
    write_words(&dir, &words);
    let client = Arc::new(UpperClient {
        peak: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
    });
    let ctx = ToolExecutionContext::new(RequestContext::for_session("s1"), dir.path());

    let result = tools(client.clone())
        .execute(
            "llm_map",
            &ctx,
            json!({
                "input_path": "in.jsonl",
                "output_path": "out.jsonl",
                "prompt": "Uppercase the word in {{.Input}}",
                "schema": "{\"type\": \"object\"}",
                "concurrency": 3
            }),
        )
        .await;

    assert!(result.success, "{:?}", result);
    assert!(result
        .to_content()
        .starts_with("Processed 8 items: 8 succeeded, 0 failed.\nOutput written to: "));
    assert!(client.peak.load(Ordering::SeqCst) <= 3);

    let rows = read_rows(&dir);
    assert_eq!(rows.len(), words.len());
    for (row, word) in rows.iter().zip(words) {
        assert_eq!(row["input"], json!({ "word": word }));
        assert_eq!(row["output"], json!({ "upper": word.to_uppercase() }));
        assert_eq!(row["error"], Value::Null);
    }
}

#[tokio::test]
async fn test_llm_map_rejects_bad_input_line() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.jsonl"), "{\"word\": \"ok\"}\nnot json\n").unwrap();
    let client = Arc::new(UpperClient {
        peak: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
    });
    let ctx = ToolExecutionContext::new(RequestContext::for_session("s1"), dir.path());

    let result = tools(client)
        .execute(
            "llm_map",
            &ctx,
            json!({"input_path": "in.jsonl", "output_path": "out.jsonl", "prompt": "{{.Input}}"}),
        )
        .await;
    let error = result.error.unwrap();
    assert!(
        error.starts_with("Failed to read input file: invalid JSON at line 2"),
        "{}",
        error
    );
    assert!(!dir.path().join("out.jsonl").exists());
}

#[tokio::test]
async fn test_agentic_map_cancellation_reaches_sub_agents() {
    let dir = TempDir::new().unwrap();
    write_words(&dir, &["one", "two"]);
    let client = Arc::new(UpperClient {
        peak: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
    });
    let cancel = CancellationToken::new();
    let ctx = ToolExecutionContext::new(RequestContext::for_session("s1"), dir.path())
        .with_cancellation_token(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tools(client)
        .execute(
            "agentic_map",
            &ctx,
            json!({"input_path": "in.jsonl", "output_path": "out.jsonl", "prompt": "Handle {{.Input}}"}),
        )
        .await;

    assert!(result.to_content().starts_with("Processed 2 items: 0 succeeded, 2 failed."));
    for row in read_rows(&dir) {
        assert_eq!(row["error"], json!("cancelled"));
        assert_eq!(row["output"], Value::Null);
    }
}
