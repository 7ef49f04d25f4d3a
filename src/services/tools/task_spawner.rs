//! Task Spawner
//!
//! Seam for delegating a prompt to a sub-agent session with its own context
//! window. Used by `agentic_map` to process batch items.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Result of a sub-agent task execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskExecutionResult {
    /// Final text response from the sub-agent
    pub response: Option<String>,
    /// Number of agentic iterations performed
    pub iterations: u32,
    pub success: bool,
    pub error: Option<String>,
}

impl TaskExecutionResult {
    pub fn completed(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            iterations: 1,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            response: None,
            iterations: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Trait for spawning sub-agent tasks
#[async_trait]
pub trait TaskSpawner: Send + Sync {
    /// Run `prompt` in a fresh sub-agent session.
    ///
    /// With `read_only` set the sub-agent gets no write tools. The spawner
    /// must stop promptly once `cancellation_token` fires.
    async fn spawn_task(
        &self,
        prompt: String,
        read_only: bool,
        cancellation_token: CancellationToken,
    ) -> TaskExecutionResult;
}
