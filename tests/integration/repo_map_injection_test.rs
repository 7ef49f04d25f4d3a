//! Repo-Map Injection Integration Tests
//!
//! Drives the repo-map hook through a `HookPipeline`:
//! - Injection layout and cache annotation
//! - Skips for a missing run key or an empty map
//! - Mention extraction feeding the synchronous refresh
//! - Single injection per run with the concrete `RepoMapManager`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use agent_coordinator::models::config::{CoordinatorConfig, ModelConfig, RepoMapOptions};
use agent_coordinator::services::llm::types::{Message, MessageRole};
use agent_coordinator::services::orchestrator::repo_map_hook::{
    build_generate_opts, build_repo_map_hook, RepoMapProfile, REPO_MAP_ACK,
};
use agent_coordinator::services::orchestrator::{
    HookContext, HookPipeline, PrepareStepHook, PreparedStep, RunQueue, StepOptions,
};
use agent_coordinator::services::repomap::{GenerateOpts, RepoMapManager, RepoMapService};
use agent_coordinator::utils::error::AppResult;
use agent_coordinator::{RequestContext, RunInjectionKey};

// ============================================================================
// Helpers
// ============================================================================

/// Scripted service that records synchronous refresh calls.
struct ScriptedRepoMap {
    map: String,
    all: Vec<String>,
    inject: AtomicBool,
    refreshes: Mutex<Vec<GenerateOpts>>,
}

impl ScriptedRepoMap {
    fn new(map: &str, all: &[&str]) -> Self {
        Self {
            map: map.to_string(),
            all: all.iter().map(|s| s.to_string()).collect(),
            inject: AtomicBool::new(true),
            refreshes: Mutex::new(Vec::new()),
        }
    }

    fn refreshes(&self) -> Vec<GenerateOpts> {
        self.refreshes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepoMapService for ScriptedRepoMap {
    fn available(&self) -> bool {
        true
    }

    async fn generate(&self, _opts: &GenerateOpts) -> AppResult<(String, i64)> {
        Ok((self.map.clone(), 10))
    }

    fn last_good_map(&self, _session_id: &str) -> String {
        self.map.clone()
    }

    fn last_token_count(&self, _session_id: &str) -> i64 {
        10
    }

    async fn session_read_only_files(&self, _session_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn should_inject(&self, _session_id: &str, _run_key: &RunInjectionKey) -> bool {
        self.inject.load(Ordering::SeqCst)
    }

    fn refresh_async(&self, _session_id: &str, _opts: GenerateOpts) {}

    async fn refresh(&self, _session_id: &str, opts: GenerateOpts) -> AppResult<(String, i64)> {
        self.refreshes.lock().unwrap().push(opts);
        Ok((self.map.clone(), 10))
    }

    async fn reset(&self, _session_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn all_files(&self) -> Vec<String> {
        self.all.clone()
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }
}

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        models: vec![ModelConfig {
            id: "large".to_string(),
            provider: "anthropic".to_string(),
            context_window: 200_000,
            max_output_tokens: 8192,
        }],
        ..Default::default()
    }
}

fn pipeline(service: Arc<dyn RepoMapService>) -> HookPipeline {
    let hook = build_repo_map_hook(Some(service), None, None, &config());
    assert!(hook.is_some());
    HookPipeline::from_hooks([hook])
}

fn context_with_key(session: &str) -> HookContext {
    let request = RequestContext::for_session(session)
        .with_run_injection_key(RunInjectionKey::new("msg_root", 0));
    HookContext::new(request, "/repo")
}

fn base_messages() -> Vec<Message> {
    vec![
        Message::system("system one"),
        Message::system("system two"),
        Message::user("please check path/to/file.go"),
    ]
}

// ============================================================================
// Injection
// ============================================================================

#[tokio::test]
async fn test_injects_map_after_system_messages() {
    let service = Arc::new(ScriptedRepoMap::new(
        "path/to/file.go",
        &["path/to/file.go", "internal/repomap/mentions.go"],
    ));
    let prepared = PreparedStep::new(base_messages());

    let outcome = pipeline(service.clone())
        .apply(context_with_key("s1"), &StepOptions::default(), prepared)
        .await;
    assert!(outcome.error.is_none());

    let messages = &outcome.prepared.messages;
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].role, MessageRole::System);
    assert_eq!(messages[1].role, MessageRole::System);

    assert_eq!(messages[2].role, MessageRole::User);
    let user_text = messages[2].text_content();
    assert!(user_text.contains("<repo-map>"));
    assert!(user_text.contains("path/to/file.go"));

    assert_eq!(messages[3].role, MessageRole::Assistant);
    assert_eq!(messages[3].text_content(), REPO_MAP_ACK);
    assert_eq!(
        messages[3].provider_options["anthropic"]["cache_control"]["type"],
        "ephemeral"
    );

    assert_eq!(messages[4], base_messages()[2]);

    let refreshes = service.refreshes();
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].mentioned_fnames, vec!["path/to/file.go".to_string()]);
    for ident in ["path", "to", "file", "go"] {
        assert!(
            refreshes[0].mentioned_idents.iter().any(|i| i == ident),
            "missing ident {}",
            ident
        );
    }
}

#[tokio::test]
async fn test_missing_run_key_leaves_messages_unchanged() {
    let service = Arc::new(ScriptedRepoMap::new("path/to/file.go", &["path/to/file.go"]));
    let prepared = PreparedStep::new(base_messages());
    let ctx = HookContext::new(RequestContext::for_session("s1"), "/repo");

    let outcome = pipeline(service.clone())
        .apply(ctx, &StepOptions::default(), prepared.clone())
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.prepared, prepared);
    assert!(service.refreshes().is_empty());
}

#[tokio::test]
async fn test_empty_map_leaves_messages_unchanged() {
    let service = Arc::new(ScriptedRepoMap::new("", &["path/to/file.go"]));
    // No user text in the current run, so nothing triggers a refresh
    let prepared = PreparedStep::new(vec![Message::system("system only")]);

    let outcome = pipeline(service.clone())
        .apply(context_with_key("s1"), &StepOptions::default(), prepared.clone())
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.prepared, prepared);
    assert!(service.refreshes().is_empty());
}

#[tokio::test]
async fn test_latch_closed_skips_injection() {
    let service = Arc::new(ScriptedRepoMap::new("path/to/file.go", &["path/to/file.go"]));
    service.inject.store(false, Ordering::SeqCst);
    let prepared = PreparedStep::new(base_messages());

    let outcome = pipeline(service.clone())
        .apply(context_with_key("s1"), &StepOptions::default(), prepared.clone())
        .await;

    assert_eq!(outcome.prepared, prepared);
    assert!(service.refreshes().is_empty());
}

#[test]
fn test_mentions_merge_identifier_matches() {
    let all: Vec<String> = [
        "internal/repomap/mentions.go",
        "internal/repomap/other.go",
        "mentionhelper.go",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let in_chat = vec!["internal/repomap/other.go".to_string()];
    let addable: Vec<String> = all.iter().filter(|f| !in_chat.contains(f)).cloned().collect();

    let opts = build_generate_opts(
        "s1",
        Vec::new(),
        "Please inspect internal/repomap/mentions.go and MentionHelper",
        &all,
        &addable,
        &in_chat,
        &RepoMapProfile::default(),
        true,
    );

    assert_eq!(
        opts.mentioned_fnames,
        vec![
            "internal/repomap/mentions.go".to_string(),
            "mentionhelper.go".to_string()
        ]
    );
    assert!(opts.mentioned_idents.iter().any(|i| i == "MentionHelper"));
}

// ============================================================================
// Concrete manager
// ============================================================================

fn seeded_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/parser.rs"), "pub fn parse() {}\n").unwrap();
    std::fs::write(dir.path().join("src/lexer.rs"), "pub fn lex() {}\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    dir
}

#[tokio::test]
async fn test_manager_injects_once_per_run() {
    let repo = seeded_repo();
    let manager = RepoMapManager::new(repo.path(), RepoMapOptions::default());
    let service: Arc<dyn RepoMapService> = Arc::new(manager.clone());
    let hook = build_repo_map_hook(Some(service.clone()), None, None, &config()).unwrap();

    let queue = RunQueue::new();
    queue.start_run("s1", "msg_root");
    let ctx = HookContext::new(queue.request_context("s1"), repo.path());
    let prepared = PreparedStep::new(vec![
        Message::system("system"),
        Message::user("look at src/parser.rs"),
    ]);

    let (ctx, first) = hook
        .prepare(&ctx, &StepOptions::default(), &prepared)
        .await
        .into_result()
        .unwrap();
    assert_eq!(first.messages.len(), 4);
    assert!(first.messages[1].text_content().contains("src/parser.rs"));

    // Second step of the same run sees the already-injected list
    let (_, second) = hook
        .prepare(&ctx, &StepOptions { step_number: 1, ..Default::default() }, &first)
        .await
        .into_result()
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(manager.injected_count(), 1);

    // A queued follow-up gets a new key and a fresh injection
    queue.enqueue("s1");
    let next_ctx = HookContext::new(queue.request_context("s1"), repo.path());
    let (_, third) = hook
        .prepare(&next_ctx, &StepOptions::default(), &prepared)
        .await
        .into_result()
        .unwrap();
    assert_eq!(third.messages.len(), 4);

    service.close().await.unwrap();
    assert!(!service.should_inject("s1", &RunInjectionKey::new("msg_other", 0)));
}

#[tokio::test]
async fn test_reset_reopens_the_latch() {
    let repo = seeded_repo();
    let manager = RepoMapManager::new(repo.path(), RepoMapOptions::default());
    let key = RunInjectionKey::new("msg_root", 0);

    assert!(manager.should_inject("s1", &key));
    assert!(!manager.should_inject("s1", &key));
    manager.reset("s1").await.unwrap();
    assert!(manager.should_inject("s1", &key));

    manager.close().await.unwrap();
    manager.close().await.unwrap();
}
