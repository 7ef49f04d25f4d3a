//! Services
//!
//! Coordinator services invoked from the model step loop.

pub mod lcm;
pub mod llm;
pub mod orchestrator;
pub mod repomap;
pub mod tools;

pub use lcm::{LcmManager, LcmStore};
pub use orchestrator::{HookPipeline, RepoMapHook, RunQueue};
pub use repomap::{RepoMapController, RepoMapManager, RepoMapService};
pub use tools::{build_coordinator_tools, CoordinatorToolDeps, ToolRegistry};
