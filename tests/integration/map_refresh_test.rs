//! Map-Refresh Integration Tests
//!
//! The map_refresh tool wired through `build_coordinator_tools` and the
//! repo-map controller, against a recording service and the concrete manager.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use agent_coordinator::models::config::RepoMapOptions;
use agent_coordinator::services::repomap::controller::{
    REFRESHED, REFRESH_SCHEDULED, REFRESH_UNAVAILABLE, RESET_REBUILT, SESSION_REQUIRED,
};
use agent_coordinator::services::repomap::{
    GenerateOpts, MapGenerator, MapRequest, ReadFileTracker, RenderedMap, RepoMapController,
    RepoMapManager, RepoMapProfile, RepoMapService,
};
use agent_coordinator::services::tools::{
    build_coordinator_tools, CoordinatorToolDeps, ToolExecutionContext, ToolRegistry,
};
use agent_coordinator::utils::error::{AppError, AppResult};
use agent_coordinator::{RequestContext, RunInjectionKey};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Sync(String, bool),
    Async(String, bool),
}

/// Records each refresh with the session id and `force_refresh` flag.
#[derive(Default)]
struct RecordingRepoMap {
    calls: Mutex<Vec<Call>>,
    fail_sync: bool,
}

impl RecordingRepoMap {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepoMapService for RecordingRepoMap {
    fn available(&self) -> bool {
        true
    }

    async fn generate(&self, _opts: &GenerateOpts) -> AppResult<(String, i64)> {
        Ok((String::new(), 0))
    }

    fn last_good_map(&self, _session_id: &str) -> String {
        String::new()
    }

    fn last_token_count(&self, _session_id: &str) -> i64 {
        0
    }

    async fn session_read_only_files(&self, _session_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn should_inject(&self, _session_id: &str, _run_key: &RunInjectionKey) -> bool {
        false
    }

    fn refresh_async(&self, session_id: &str, opts: GenerateOpts) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Async(session_id.to_string(), opts.force_refresh));
    }

    async fn refresh(&self, session_id: &str, opts: GenerateOpts) -> AppResult<(String, i64)> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Sync(session_id.to_string(), opts.force_refresh));
        if self.fail_sync {
            return Err(AppError::internal("generator exploded"));
        }
        Ok(("map".to_string(), 1))
    }

    async fn reset(&self, _session_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn all_files(&self) -> Vec<String> {
        Vec::new()
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

fn tools_for(service: Option<Arc<dyn RepoMapService>>) -> ToolRegistry {
    build_coordinator_tools(CoordinatorToolDeps {
        repo_map: Some(Arc::new(RepoMapController::new(service))),
        ..Default::default()
    })
}

fn ctx(session: &str) -> ToolExecutionContext {
    ToolExecutionContext::new(RequestContext::for_session(session), "/repo")
}

// ============================================================================
// Tool behavior
// ============================================================================

#[tokio::test]
async fn test_sync_and_async_refresh_are_forced() {
    let service = Arc::new(RecordingRepoMap::default());
    let tools = tools_for(Some(service.clone()));

    let sync = tools
        .execute("map_refresh", &ctx("s1"), json!({"sync": true}))
        .await;
    assert_eq!(sync.output.as_deref(), Some(REFRESHED));
    assert_eq!(service.calls(), vec![Call::Sync("s1".to_string(), true)]);

    let scheduled = tools.execute("map_refresh", &ctx("s1"), json!({})).await;
    assert_eq!(scheduled.output.as_deref(), Some(REFRESH_SCHEDULED));
    assert_eq!(
        service.calls(),
        vec![
            Call::Sync("s1".to_string(), true),
            Call::Async("s1".to_string(), true)
        ]
    );
}

#[tokio::test]
async fn test_refresh_requires_session() {
    let service = Arc::new(RecordingRepoMap::default());
    let tools = tools_for(Some(service.clone()));
    let no_session = ToolExecutionContext::new(RequestContext::new(), "/repo");

    let result = tools
        .execute("map_refresh", &no_session, json!({"sync": true}))
        .await;
    assert_eq!(result.error.as_deref(), Some(SESSION_REQUIRED));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_refresh_unavailable_without_service() {
    let tools = tools_for(None);
    for sync in [true, false] {
        let result = tools
            .execute("map_refresh", &ctx("s1"), json!({"sync": sync}))
            .await;
        assert_eq!(result.error.as_deref(), Some(REFRESH_UNAVAILABLE));
    }
}

#[tokio::test]
async fn test_refresh_failure_is_a_tool_error() {
    let service = Arc::new(RecordingRepoMap {
        fail_sync: true,
        ..Default::default()
    });
    let tools = tools_for(Some(service));

    let result = tools
        .execute("map_refresh", &ctx("s1"), json!({"sync": true}))
        .await;
    assert!(result.is_error());
    assert!(result.to_content().contains("generator exploded"));
}

// ============================================================================
// Concrete manager
// ============================================================================

#[tokio::test]
async fn test_controller_with_manager() {
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join("main.rs"), "fn main() {}\n").unwrap();
    std::fs::write(repo.path().join("lib.rs"), "pub fn f() {}\n").unwrap();

    let manager = RepoMapManager::new(repo.path(), RepoMapOptions::default());
    let controller = RepoMapController::new(Some(Arc::new(manager.clone())));

    assert_eq!(controller.refresh("s1", false).await.unwrap(), REFRESH_SCHEDULED);
    let mut map = String::new();
    for _ in 0..50 {
        map = manager.last_good_map("s1");
        if !map.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(map.contains("main.rs"));

    assert_eq!(controller.reset("s1").await.unwrap(), RESET_REBUILT);
    assert!(!manager.last_good_map("s1").is_empty());

    manager.close().await.unwrap();
    assert_eq!(
        controller.refresh("s1", true).await.unwrap_err().to_string(),
        AppError::validation(REFRESH_UNAVAILABLE).to_string()
    );
}

/// Generator that keeps every request it renders.
#[derive(Default)]
struct RecordingGenerator {
    requests: Mutex<Vec<MapRequest>>,
}

#[async_trait]
impl MapGenerator for RecordingGenerator {
    async fn render(&self, request: &MapRequest) -> AppResult<RenderedMap> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(RenderedMap {
            text: "lib.rs\nmain.rs".to_string(),
            tokens: 3,
        })
    }
}

struct ReadFiles(Vec<PathBuf>);

impl ReadFileTracker for ReadFiles {
    fn list_read_files(&self, _session_id: &str) -> AppResult<Vec<PathBuf>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_map_refresh_keeps_profile_chat_files_and_read_only() {
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join("main.rs"), "fn main() {}\n").unwrap();
    std::fs::write(repo.path().join("lib.rs"), "pub fn f() {}\n").unwrap();

    let generator = Arc::new(RecordingGenerator::default());
    let manager = RepoMapManager::with_generator(
        repo.path(),
        RepoMapOptions::default(),
        generator.clone(),
    );

    // An earlier mention left main.rs in the read-only set
    manager
        .refresh(
            "s1",
            GenerateOpts {
                session_id: "s1".to_string(),
                mentioned_fnames: vec!["main.rs".to_string()],
                force_refresh: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(manager.session_read_only_files("s1").await, vec!["main.rs"]);

    let profile = RepoMapProfile {
        token_budget: 4096,
        max_context_window: 200_000,
        model: "large".to_string(),
        ..Default::default()
    };
    let controller = RepoMapController::new(Some(Arc::new(manager.clone())))
        .with_profile(profile)
        .with_tracker(
            Arc::new(ReadFiles(vec![repo.path().join("lib.rs")])),
            repo.path(),
        );
    let tools = build_coordinator_tools(CoordinatorToolDeps {
        repo_map: Some(Arc::new(controller)),
        ..Default::default()
    });

    let ctx = ToolExecutionContext::new(RequestContext::for_session("s1"), repo.path());
    let result = tools.execute("map_refresh", &ctx, json!({"sync": true})).await;
    assert_eq!(result.output.as_deref(), Some(REFRESHED));

    let requests = generator.requests.lock().unwrap().clone();
    let last = requests.last().unwrap();
    assert_eq!(last.token_budget, 4096);
    assert_eq!(last.opts.max_context_window, 200_000);
    assert_eq!(last.opts.model, "large");
    assert_eq!(last.opts.chat_files, vec!["lib.rs".to_string()]);
    assert!(last.opts.force_refresh);

    assert_eq!(
        manager.session_read_only_files("s1").await,
        vec!["lib.rs", "main.rs"]
    );
    manager.close().await.unwrap();
}
