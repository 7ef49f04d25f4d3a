//! Tool Module
//!
//! Coordinator tools callable from a model step:
//! - lcm_describe / lcm_expand / lcm_grep: lineage-scoped memory access
//! - map_refresh: repository map rebuild
//! - llm_map / agentic_map: JSONL batch transforms

pub mod executor;
pub mod impls;
pub mod task_spawner;
pub mod trait_def;

use std::sync::Arc;

pub use executor::ToolResult;
pub use task_spawner::{TaskExecutionResult, TaskSpawner};
pub use trait_def::{Tool, ToolExecutionContext, ToolRegistry};

use crate::services::lcm::LcmStore;
use crate::services::repomap::RepoMapController;
use impls::{
    AgenticMapTool, CompletionClient, LcmDescribeTool, LcmExpandTool, LcmGrepTool, LlmMapTool,
    MapRefreshTool,
};

/// Services the coordinator tools are wired against. Absent services drop
/// the tools that need them.
#[derive(Clone, Default)]
pub struct CoordinatorToolDeps {
    pub lcm_store: Option<LcmStore>,
    pub repo_map: Option<Arc<RepoMapController>>,
    pub completion: Option<Arc<dyn CompletionClient>>,
    pub task_spawner: Option<Arc<dyn TaskSpawner>>,
}

/// Build the registry of coordinator tools.
///
/// `map_refresh` is always registered; without a controller it reports that
/// refresh is unavailable.
pub fn build_coordinator_tools(deps: CoordinatorToolDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    if let Some(store) = deps.lcm_store {
        registry.register(Arc::new(LcmDescribeTool::new(store.clone())));
        registry.register(Arc::new(LcmExpandTool::new(store.clone())));
        registry.register(Arc::new(LcmGrepTool::new(store)));
    }

    let (sync_fn, async_fn) = match &deps.repo_map {
        Some(controller) => (controller.sync_refresh_fn(), controller.async_refresh_fn()),
        None => (None, None),
    };
    registry.register(Arc::new(MapRefreshTool::new(sync_fn, async_fn)));

    if let Some(client) = deps.completion {
        registry.register(Arc::new(LlmMapTool::new(client)));
    }
    if let Some(spawner) = deps.task_spawner {
        registry.register(Arc::new(AgenticMapTool::new(spawner)));
    }

    tracing::debug!(tools = ?registry.names(), "coordinator tools registered");
    registry
}
