//! Step Orchestration
//!
//! Prepare-step hook composition, the repository-map injection hook and the
//! run queue that issues run-injection keys.

pub mod hooks;
pub mod repo_map_hook;
pub mod run_queue;

pub use hooks::{
    FnPrepareStepHook, HookContext, HookOutcome, HookPipeline, PrepareStepHook, PreparedStep,
    StepOptions,
};
pub use repo_map_hook::{build_repo_map_hook, ReadFileTracker, RepoMapHook, RepoMapProfile};
pub use run_queue::RunQueue;
