//! Individual Tool Implementations
//!
//! Each coordinator tool is a separate struct implementing the `Tool` trait.
//! The small argument and session helpers below are shared by all of them.

pub mod agentic_map;
pub mod jsonl_map;
pub mod lcm_describe;
pub mod lcm_expand;
pub mod lcm_grep;
pub mod llm_map;
pub mod map_refresh;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agentic_map::AgenticMapTool;
pub use lcm_describe::LcmDescribeTool;
pub use lcm_expand::LcmExpandTool;
pub use lcm_grep::LcmGrepTool;
pub use llm_map::{CompletionClient, LlmMapTool};
pub use map_refresh::MapRefreshTool;

use serde_json::Value;

use agent_coordinator_core::ExecutionContext;

use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::ToolExecutionContext;

pub(crate) fn access_denied(id: &str) -> String {
    format!("Access denied: {} is outside this session lineage", id)
}

/// Session id of the calling step, or the error result to return.
pub(crate) fn require_session(ctx: &ToolExecutionContext) -> Result<&str, ToolResult> {
    ctx.session_id()
        .ok_or_else(|| ToolResult::err("Session ID not found in context"))
}

/// String argument by key; empty when missing or not a string.
pub(crate) fn string_arg(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Positive integer argument by key.
pub(crate) fn positive_arg(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64).filter(|n| *n > 0)
}

/// Longest prefix of `s` not exceeding `max` bytes that ends on a char boundary.
pub(crate) fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
