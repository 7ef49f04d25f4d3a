//! lcm_expand Tool Implementation
//!
//! Expands a summary back into the messages it subsumes, following the
//! parent-summary graph. Restricted to sub-agent sessions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::services::lcm::store::{LcmStore, MessageRow, Scoped};
use crate::services::llm::types::ParameterSchema;
use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

use super::{access_denied, require_session, string_arg};

pub const LCM_EXPAND_TOOL_NAME: &str = "lcm_expand";
pub const MAIN_SESSION_DENIED: &str = "This tool is only available to sub-agent (Task) sessions. To expand a summary, delegate this task to a Task sub-agent.";

const DESCRIPTION: &str = "Expand a summary to see the original messages it represents.

Only available to sub-agent (Task) sessions. Condensed summaries are expanded recursively through their parent summaries.

Parameters:
- summary_id: The sum_xxx identifier to expand

Returns the original messages in chronological order with their sequence numbers and roles.";

pub fn render_expansion(summary_id: &str, messages: &[MessageRow]) -> String {
    if messages.is_empty() {
        return "Summary contains no messages.\n".to_string();
    }
    let mut output = format!(
        "Expanded {} messages from summary {}:\n\n",
        messages.len(),
        summary_id
    );
    for msg in messages {
        output.push_str(&format!(
            "--- Message {} (seq: {}, role: {}) ---\n",
            msg.id, msg.seq, msg.role
        ));
        output.push_str(&msg.text());
        output.push_str("\n\n");
    }
    output
}

pub struct LcmExpandTool {
    store: LcmStore,
}

impl LcmExpandTool {
    pub fn new(store: LcmStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LcmExpandTool {
    fn name(&self) -> &str {
        LCM_EXPAND_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "summary_id".to_string(),
            ParameterSchema::string(Some("The sum_xxx identifier to expand")),
        );
        ParameterSchema::object(None, properties, vec!["summary_id".to_string()])
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let summary_id = string_arg(&args, "summary_id");
        if summary_id.is_empty() {
            return ToolResult::err("summary_id is required");
        }
        let session_id = match require_session(ctx) {
            Ok(s) => s,
            Err(e) => return e,
        };

        match self.store.is_sub_agent_session(session_id) {
            Ok(true) => {}
            Ok(false) => return ToolResult::err(MAIN_SESSION_DENIED),
            Err(e) => return ToolResult::err(format!("error checking session type: {}", e)),
        }

        match self.store.expand_summary(session_id, &summary_id) {
            Ok(Scoped::Visible(messages)) => ToolResult::ok(render_expansion(&summary_id, &messages)),
            Ok(Scoped::Denied) => ToolResult::err(access_denied(&summary_id)),
            Ok(Scoped::Missing) => ToolResult::err(format!("Summary not found: {}", summary_id)),
            Err(e) => ToolResult::err(format!("error expanding summary: {}", e)),
        }
    }
}
