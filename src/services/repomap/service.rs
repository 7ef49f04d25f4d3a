//! Repo-map service contract
//!
//! The facade the coordinator consumes. The generator behind it is opaque.

use agent_coordinator_core::RunInjectionKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::AppResult;

/// Options for one map generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOpts {
    pub session_id: String,
    /// Files the session has already read, repo-relative
    pub chat_files: Vec<String>,
    /// Addable files referenced in the current run's text
    pub mentioned_fnames: Vec<String>,
    /// Identifier-shaped tokens from the current run's text
    pub mentioned_idents: Vec<String>,
    /// Rendered map budget (0 = resolve from config and context window)
    pub token_budget: i64,
    pub max_context_window: i64,
    pub model: String,
    pub parity_mode: bool,
    pub prompt_caching_enabled: bool,
    pub enhancement_tiers: String,
    pub deterministic_mode: bool,
    pub token_counter_mode: String,
    /// Bypass cached renders
    pub force_refresh: bool,
}

impl GenerateOpts {
    pub fn has_mentions(&self) -> bool {
        !self.mentioned_fnames.is_empty() || !self.mentioned_idents.is_empty()
    }
}

/// Repository map facade.
///
/// `should_inject` is a latch: for a fixed `(session, run key)` it answers
/// `true` once and `false` afterwards, until `reset` for that session or
/// `close`. Implementations must be safe for concurrent callers.
#[async_trait]
pub trait RepoMapService: Send + Sync {
    /// Whether the service can produce maps at all.
    fn available(&self) -> bool;

    /// Produce a map for `opts`, using caches unless `force_refresh` is set.
    async fn generate(&self, opts: &GenerateOpts) -> AppResult<(String, i64)>;

    /// Last successfully produced map for the session, or an empty string.
    fn last_good_map(&self, session_id: &str) -> String;

    /// Token count of [`RepoMapService::last_good_map`].
    fn last_token_count(&self, session_id: &str) -> i64;

    /// Files pinned as read-only context for the session.
    async fn session_read_only_files(&self, session_id: &str) -> Vec<String>;

    /// Test-and-set the injection latch for `(session_id, run_key)`.
    fn should_inject(&self, session_id: &str, run_key: &RunInjectionKey) -> bool;

    /// Schedule a refresh in the background and return immediately.
    fn refresh_async(&self, session_id: &str, opts: GenerateOpts);

    /// Regenerate synchronously and return the current map.
    async fn refresh(&self, session_id: &str, opts: GenerateOpts) -> AppResult<(String, i64)>;

    /// Drop every cached artifact and the injection state of the session.
    async fn reset(&self, session_id: &str) -> AppResult<()>;

    /// All repository files, repo-relative and sorted.
    async fn all_files(&self) -> Vec<String>;

    /// Stop background work. Idempotent.
    async fn close(&self) -> AppResult<()>;
}
