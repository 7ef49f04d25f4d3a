//! lcm_describe Tool Implementation
//!
//! Shows the metadata and content of a large-file (`file_…`) or summary
//! (`sum_…`) artifact visible to the calling session.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::services::lcm::store::{
    LargeFileRecord, LcmStore, Scoped, SummaryDetail, FILE_ID_PREFIX, SUMMARY_ID_PREFIX,
};
use crate::services::llm::types::ParameterSchema;
use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

use super::{access_denied, require_session, string_arg, truncate_bytes};

pub const LCM_DESCRIBE_TOOL_NAME: &str = "lcm_describe";
const MAX_CONTENT_PREVIEW: usize = 2000;

const DESCRIPTION: &str = "Describe a file or summary by its ID.

For files (file_xxx): shows the original path, size in tokens, the exploration summary if one exists, and a content preview.
For summaries (sum_xxx): shows the kind (leaf or condensed), token count, parent summaries of condensed summaries, and the full content.

Only artifacts from this session or its parent sessions are visible.";

pub fn render_file(record: &LargeFileRecord) -> String {
    let mut output = String::new();
    output.push_str(&format!("File ID: {}\n", record.file_id));
    output.push_str(&format!("Path: {}\n", record.original_path));
    output.push_str(&format!("Size: {} tokens\n", record.token_count));

    if let Some(explorer) = record.explorer_used.as_deref().filter(|s| !s.is_empty()) {
        output.push_str(&format!("Explorer: {}\n", explorer));
    }
    if let Some(summary) = record.exploration_summary.as_deref().filter(|s| !s.is_empty()) {
        output.push_str(&format!("Exploration summary:\n{}\n", summary));
    }
    if let Some(content) = record.content.as_deref().filter(|s| !s.is_empty()) {
        output.push_str("\nContent preview:\n");
        if content.len() > MAX_CONTENT_PREVIEW {
            output.push_str(truncate_bytes(content, MAX_CONTENT_PREVIEW));
            output.push_str("\n... (truncated)");
        } else {
            output.push_str(content);
        }
        output.push('\n');
    }
    output
}

pub fn render_summary(detail: &SummaryDetail) -> String {
    let summary = &detail.summary;
    let mut output = String::new();
    output.push_str(&format!("Summary ID: {}\n", summary.summary_id));
    output.push_str(&format!("Kind: {}\n", summary.kind.as_str()));
    output.push_str(&format!("Tokens: {}\n", summary.token_count));

    if !detail.parent_ids.is_empty() {
        output.push_str(&format!("Parents: {}\n", detail.parent_ids.join(", ")));
    }
    if !summary.file_ids.is_empty() && summary.file_ids != "[]" {
        output.push_str(&format!("File IDs: {}\n", summary.file_ids));
    }
    output.push_str(&format!("\nContent:\n{}\n", summary.content));
    output
}

pub struct LcmDescribeTool {
    store: LcmStore,
}

impl LcmDescribeTool {
    pub fn new(store: LcmStore) -> Self {
        Self { store }
    }

    fn describe(&self, session_id: &str, id: &str) -> ToolResult {
        if id.starts_with(FILE_ID_PREFIX) {
            match self.store.large_file(session_id, id) {
                Ok(Scoped::Visible(record)) => ToolResult::ok(render_file(&record)),
                Ok(Scoped::Denied) => ToolResult::err(access_denied(id)),
                Ok(Scoped::Missing) => ToolResult::err(format!("File not found: {}", id)),
                Err(e) => ToolResult::err(format!("error querying file: {}", e)),
            }
        } else if id.starts_with(SUMMARY_ID_PREFIX) {
            match self.store.summary(session_id, id) {
                Ok(Scoped::Visible(detail)) => ToolResult::ok(render_summary(&detail)),
                Ok(Scoped::Denied) => ToolResult::err(access_denied(id)),
                Ok(Scoped::Missing) => ToolResult::err(format!("Summary not found: {}", id)),
                Err(e) => ToolResult::err(format!("error querying summary: {}", e)),
            }
        } else {
            ToolResult::err(format!(
                "Invalid ID format: {} (must start with file_ or sum_)",
                id
            ))
        }
    }
}

#[async_trait]
impl Tool for LcmDescribeTool {
    fn name(&self) -> &str {
        LCM_DESCRIBE_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "id".to_string(),
            ParameterSchema::string(Some("A file_xxx or sum_xxx identifier to describe")),
        );
        ParameterSchema::object(None, properties, vec!["id".to_string()])
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let id = string_arg(&args, "id");
        if id.is_empty() {
            return ToolResult::err("id is required");
        }
        let session_id = match require_session(ctx) {
            Ok(s) => s,
            Err(e) => return e,
        };
        self.describe(session_id, &id)
    }
}
