//! Repo-map generation profile
//!
//! Settings shared by every caller that builds [`GenerateOpts`]: the
//! prepare-step hook and the explicit refresh controller.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::config::{default_repo_map_max_tokens, CoordinatorConfig};
use crate::utils::error::AppResult;

use super::paths::session_chat_files;
use super::service::GenerateOpts;

/// Files a session has read, as absolute or working-directory paths.
pub trait ReadFileTracker: Send + Sync {
    fn list_read_files(&self, session_id: &str) -> AppResult<Vec<PathBuf>>;
}

/// Chat files for `session_id`: the tracker's read files relative to
/// `working_directory`. Tracker failures yield no files.
pub fn tracked_chat_files(
    tracker: Option<&dyn ReadFileTracker>,
    working_directory: &Path,
    session_id: &str,
) -> Vec<String> {
    let Some(tracker) = tracker else {
        return Vec::new();
    };
    match tracker.list_read_files(session_id) {
        Ok(paths) => session_chat_files(working_directory, &paths),
        Err(e) => {
            debug!(session_id, error = %e, "read-file tracker unavailable");
            Vec::new()
        }
    }
}

/// Generation settings derived from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoMapProfile {
    pub token_budget: i64,
    pub max_context_window: i64,
    pub model: String,
    pub parity_mode: bool,
    pub prompt_caching_enabled: bool,
    pub enhancement_tiers: String,
    pub deterministic_mode: bool,
    pub token_counter_mode: String,
}

impl RepoMapProfile {
    /// Profile from the largest-context model and the LCM options.
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        let mut profile = RepoMapProfile::default();
        if let Some(model) = config.large_model() {
            profile.max_context_window = model.context_window;
            profile.token_budget = default_repo_map_max_tokens(model.context_window);
            profile.model = model.id.clone();
            if config.repo_map.max_tokens > 0 {
                profile.token_budget = config.repo_map.max_tokens;
            }
        }
        profile.parity_mode = config.lcm.is_parity_profile();
        if profile.parity_mode {
            profile.prompt_caching_enabled = true;
            profile.enhancement_tiers = "none".to_string();
            profile.deterministic_mode = true;
            profile.token_counter_mode = "tokenizer_backed".to_string();
        }
        profile
    }

    /// Options carrying this profile, without mentions.
    pub fn opts(&self, session_id: &str, chat_files: Vec<String>, force_refresh: bool) -> GenerateOpts {
        GenerateOpts {
            session_id: session_id.to_string(),
            chat_files,
            token_budget: self.token_budget,
            max_context_window: self.max_context_window,
            model: self.model.clone(),
            parity_mode: self.parity_mode,
            prompt_caching_enabled: self.prompt_caching_enabled,
            enhancement_tiers: self.enhancement_tiers.clone(),
            deterministic_mode: self.deterministic_mode,
            token_counter_mode: self.token_counter_mode.clone(),
            force_refresh,
            ..Default::default()
        }
    }
}
