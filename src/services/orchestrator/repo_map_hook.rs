//! Repo-map injection hook
//!
//! Once per run, inserts the session's repository map as a (user, assistant)
//! pair right after the leading system messages. When the current run's text
//! mentions repository files or identifiers, the map is refreshed first.

use std::sync::Arc;

use agent_coordinator_core::ExecutionContext;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::models::config::CoordinatorConfig;
use crate::services::lcm::manager::LcmManager;
use crate::services::llm::provider_options::cache_control_options;
use crate::services::llm::types::{Message, MessageRole};
use crate::services::repomap::mentions::{
    current_run_messages, extract_idents, extract_mentioned_fnames, ident_filename_matches,
    merge_sorted_unique, messages_text,
};
use crate::services::repomap::paths::{subtract_repo_paths, union_repo_paths};
use crate::services::repomap::profile::tracked_chat_files;
use crate::services::repomap::service::{GenerateOpts, RepoMapService};

pub use crate::services::repomap::profile::{ReadFileTracker, RepoMapProfile};

use super::hooks::{HookContext, HookOutcome, PrepareStepHook, PreparedStep, StepOptions};

pub const REPO_MAP_PREAMBLE: &str = "Below is a map of the repository showing the most relevant files and their key definitions.\nUse this to understand the codebase structure. These files are read-only context \u{2014} use tools to read full contents when needed.\n\n";
pub const REPO_MAP_ACK: &str = "Ok, I won't try and edit those files without asking first.";

/// User-turn text carrying `map`.
pub fn repo_map_user_text(map: &str) -> String {
    format!("{}<repo-map>\n{}\n</repo-map>", REPO_MAP_PREAMBLE, map)
}

/// Generate options for a hook run.
///
/// Mentions are only extracted when `mention_text` is non-empty; identifier
/// matches against `all_repo_files` are merged into the mentioned files.
#[allow(clippy::too_many_arguments)]
pub fn build_generate_opts(
    session_id: &str,
    chat_files: Vec<String>,
    mention_text: &str,
    all_repo_files: &[String],
    addable_repo_files: &[String],
    in_chat_or_read_only: &[String],
    profile: &RepoMapProfile,
    force_refresh: bool,
) -> GenerateOpts {
    let mut opts = profile.opts(session_id, chat_files, force_refresh);
    if mention_text.is_empty() {
        return opts;
    }

    opts.mentioned_fnames =
        extract_mentioned_fnames(mention_text, addable_repo_files, in_chat_or_read_only);
    opts.mentioned_idents = extract_idents(mention_text);

    let ident_matches = ident_filename_matches(&opts.mentioned_idents, all_repo_files);
    if !ident_matches.is_empty() {
        opts.mentioned_fnames = merge_sorted_unique(&opts.mentioned_fnames, &ident_matches);
    }
    opts
}

/// Insert the map pair after the leading system messages.
pub fn inject_repo_map(messages: &[Message], map: &str) -> Vec<Message> {
    let insert_at = messages
        .iter()
        .take_while(|m| m.role == MessageRole::System)
        .count();

    let user = Message::user(repo_map_user_text(map));
    let assistant = Message::assistant(REPO_MAP_ACK).with_provider_options(cache_control_options());

    let mut out = Vec::with_capacity(messages.len() + 2);
    out.extend_from_slice(&messages[..insert_at]);
    out.push(user);
    out.push(assistant);
    out.extend_from_slice(&messages[insert_at..]);
    out
}

pub struct RepoMapHook {
    service: Arc<dyn RepoMapService>,
    lcm: Option<Arc<LcmManager>>,
    tracker: Option<Arc<dyn ReadFileTracker>>,
    profile: RepoMapProfile,
}

impl RepoMapHook {
    pub fn new(service: Arc<dyn RepoMapService>, profile: RepoMapProfile) -> Self {
        Self {
            service,
            lcm: None,
            tracker: None,
            profile,
        }
    }

    pub fn with_lcm(mut self, lcm: Arc<LcmManager>) -> Self {
        self.lcm = Some(lcm);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ReadFileTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    async fn generate_opts(&self, ctx: &HookContext, session_id: &str, prepared: &PreparedStep) -> GenerateOpts {
        let mention_text = messages_text(current_run_messages(&prepared.messages));
        let all_repo_files = self.service.all_files().await;
        let chat_files =
            tracked_chat_files(self.tracker.as_deref(), &ctx.working_directory, session_id);
        let read_only = self.service.session_read_only_files(session_id).await;
        let in_chat_or_read_only = union_repo_paths(&chat_files, &read_only);
        let addable = subtract_repo_paths(&all_repo_files, &in_chat_or_read_only);

        build_generate_opts(
            session_id,
            chat_files,
            &mention_text,
            &all_repo_files,
            &addable,
            &in_chat_or_read_only,
            &self.profile,
            true,
        )
    }
}

#[async_trait]
impl PrepareStepHook for RepoMapHook {
    fn name(&self) -> &str {
        "repo_map"
    }

    async fn prepare(
        &self,
        ctx: &HookContext,
        _opts: &StepOptions,
        prepared: &PreparedStep,
    ) -> HookOutcome {
        let unchanged = || HookOutcome::ok(ctx.clone(), prepared.clone());

        if !self.service.available() {
            return unchanged();
        }
        let Some(session_id) = ctx.session_id() else {
            return unchanged();
        };
        let Some(run_key) = ctx.run_injection_key() else {
            debug!(session_id, "no run key; skipping repo map injection");
            return unchanged();
        };
        if !self.service.should_inject(session_id, run_key) {
            return unchanged();
        }

        let opts = self.generate_opts(ctx, session_id, prepared).await;
        if opts.has_mentions() {
            if let Err(e) = self.service.refresh(session_id, opts).await {
                warn!(session_id, error = %e, "repo map refresh failed; using last good map");
            }
        }
        if ctx.cancellation_token.is_cancelled() {
            return unchanged();
        }

        let map = self.service.last_good_map(session_id);
        if map.is_empty() {
            debug!(session_id, "no repo map available");
            return unchanged();
        }

        if let Some(lcm) = &self.lcm {
            let tokens = self.service.last_token_count(session_id);
            if let Err(e) = lcm.set_repo_map_tokens(session_id, tokens).await {
                debug!(session_id, error = %e, "failed to record repo map tokens");
            }
        }

        info!(session_id, run = %run_key, "injecting repo map");
        let mut next = prepared.clone();
        next.messages = inject_repo_map(&prepared.messages, &map);
        HookOutcome::ok(ctx.clone(), next)
    }
}

/// Hook for the pipeline, or `None` when the service is absent or
/// unavailable.
pub fn build_repo_map_hook(
    service: Option<Arc<dyn RepoMapService>>,
    lcm: Option<Arc<LcmManager>>,
    tracker: Option<Arc<dyn ReadFileTracker>>,
    config: &CoordinatorConfig,
) -> Option<Arc<dyn PrepareStepHook>> {
    let service = service.filter(|s| s.available())?;
    let mut hook = RepoMapHook::new(service, RepoMapProfile::from_config(config));
    if let Some(lcm) = lcm {
        hook = hook.with_lcm(lcm);
    }
    if let Some(tracker) = tracker {
        hook = hook.with_tracker(tracker);
    }
    Some(Arc::new(hook))
}
