//! Agent Coordinator
//!
//! Mediates between a model step loop and its auxiliary systems.
//! It includes:
//! - Prepare-step hook pipeline and repository-map injection
//! - Lineage-scoped long-conversation memory store and tools
//! - Map-refresh and JSONL batch map tools
//! - Storage layer (SQLite, TOML config)

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use agent_coordinator_core::{ExecutionContext, RequestContext, RunInjectionKey};
pub use models::config::CoordinatorConfig;
pub use utils::error::{AppError, AppResult};
