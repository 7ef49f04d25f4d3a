//! agentic_map Tool Implementation
//!
//! Runs a sub-agent per JSONL item through the `TaskSpawner` seam. Pool size
//! and per-item deadline are fixed.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::services::llm::types::ParameterSchema;
use crate::services::tools::executor::ToolResult;
use crate::services::tools::task_spawner::TaskSpawner;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};
use crate::utils::error::{AppError, AppResult};

use super::jsonl_map::{common_parameters, run_map, ItemTransform, MapJob};

pub const AGENTIC_MAP_TOOL_NAME: &str = "agentic_map";
pub const AGENTIC_MAP_CONCURRENCY: usize = 16;
pub const AGENTIC_MAP_TIMEOUT_SECS: u64 = 900;

const DESCRIPTION: &str = "Run a sub-agent on each item in a JSONL file and write results to another JSONL file.

This tool reads items from an input JSONL file, runs a sub-agent for each item with the item as context, \
validates the output against an optional JSON Schema, and writes the results to an output JSONL file.

Each output line has the format: {\"input\": ..., \"output\": ..., \"error\": null} for successful executions, \
or {\"input\": ..., \"output\": null, \"error\": \"...\"} for failures.

The tool uses a hardcoded concurrency of 16 workers and a timeout of 900 seconds per item.

If read_only is true, the sub-agent will not have access to write, edit, or bash tools.";

struct SubAgentTransform {
    spawner: Arc<dyn TaskSpawner>,
    read_only: bool,
}

#[async_trait]
impl ItemTransform for SubAgentTransform {
    async fn transform(&self, prompt: String, cancel: CancellationToken) -> AppResult<String> {
        let result = self.spawner.spawn_task(prompt, self.read_only, cancel).await;
        if result.success {
            Ok(result.response.unwrap_or_default())
        } else {
            Err(AppError::internal(
                result
                    .error
                    .unwrap_or_else(|| "sub-agent task failed".to_string()),
            ))
        }
    }
}

pub struct AgenticMapTool {
    spawner: Arc<dyn TaskSpawner>,
}

impl AgenticMapTool {
    pub fn new(spawner: Arc<dyn TaskSpawner>) -> Self {
        Self { spawner }
    }
}

#[async_trait]
impl Tool for AgenticMapTool {
    fn name(&self) -> &str {
        AGENTIC_MAP_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = common_parameters();
        properties.insert(
            "read_only".to_string(),
            ParameterSchema::boolean(Some(
                "If true, sub-agent can't use write/edit/bash tools (default false)",
            ))
            .with_default(serde_json::json!(false)),
        );
        ParameterSchema::object(
            None,
            properties,
            vec![
                "input_path".to_string(),
                "output_path".to_string(),
                "prompt".to_string(),
            ],
        )
    }

    fn is_long_running(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let job = match MapJob::from_args(
            ctx,
            &args,
            AGENTIC_MAP_CONCURRENCY,
            Duration::from_secs(AGENTIC_MAP_TIMEOUT_SECS),
        ) {
            Ok(job) => job,
            Err(e) => return e,
        };
        let read_only = args
            .get("read_only")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let transform = Arc::new(SubAgentTransform {
            spawner: self.spawner.clone(),
            read_only,
        });
        run_map(job, transform, ctx.cancellation_token.clone()).await
    }
}
