//! llm_map Tool Implementation
//!
//! Applies a model completion to each item of a JSONL file.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::services::llm::types::ParameterSchema;
use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};
use crate::utils::error::{AppError, AppResult};

use super::jsonl_map::{common_parameters, run_map, ItemTransform, MapJob, DEFAULT_CONCURRENCY};
use super::{positive_arg, string_arg};

pub const LLM_MAP_TOOL_NAME: &str = "llm_map";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MODEL: &str = "default";

const DESCRIPTION: &str = "Apply an LLM transformation to each item in a JSONL file and write results to another JSONL file.

This tool reads items from an input JSONL file, processes each item through an LLM with a prompt template, \
validates the output against an optional JSON Schema, and writes the results to an output JSONL file.

Each output line has the format: {\"input\": ..., \"output\": ..., \"error\": null} for successful transformations, \
or {\"input\": ..., \"output\": null, \"error\": \"...\"} for failures.

The prompt template can use {{.Input}} to reference the input item.";

/// Single-shot text completion used by `llm_map`.
///
/// `model` is `"small"`, `"default"` or an explicit model name; resolving it
/// is the client's business.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> AppResult<String>;
}

struct CompletionTransform {
    client: Arc<dyn CompletionClient>,
    model: String,
}

#[async_trait]
impl ItemTransform for CompletionTransform {
    async fn transform(&self, prompt: String, cancel: CancellationToken) -> AppResult<String> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::cancelled("completion")),
            res = self.client.complete(&self.model, &prompt) => res,
        }
    }
}

pub struct LlmMapTool {
    client: Arc<dyn CompletionClient>,
}

impl LlmMapTool {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for LlmMapTool {
    fn name(&self) -> &str {
        LLM_MAP_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = common_parameters();
        properties.insert(
            "model".to_string(),
            ParameterSchema::string(Some(
                "Model to use: 'small', 'default', or explicit model name (default: 'default')",
            )),
        );
        properties.insert(
            "concurrency".to_string(),
            ParameterSchema::integer(Some("Number of parallel workers (default 16)"))
                .with_default(serde_json::json!(DEFAULT_CONCURRENCY)),
        );
        properties.insert(
            "timeout_seconds".to_string(),
            ParameterSchema::integer(Some("Timeout per item in seconds (default 120)"))
                .with_default(serde_json::json!(DEFAULT_TIMEOUT_SECS)),
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
        let concurrency = positive_arg(&args, "concurrency")
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(DEFAULT_CONCURRENCY);
        let timeout = Duration::from_secs(
            positive_arg(&args, "timeout_seconds").unwrap_or(DEFAULT_TIMEOUT_SECS),
        );
        let job = match MapJob::from_args(ctx, &args, concurrency, timeout) {
            Ok(job) => job,
            Err(e) => return e,
        };

        let mut model = string_arg(&args, "model");
        if model.is_empty() {
            model = DEFAULT_MODEL.to_string();
        }

        let transform = Arc::new(CompletionTransform {
            client: self.client.clone(),
            model,
        });
        run_map(job, transform, ctx.cancellation_token.clone()).await
    }
}
