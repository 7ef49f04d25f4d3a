//! lcm_grep Tool Implementation
//!
//! Searches a conversation's messages with FTS5 (plain patterns) or a
//! regular expression (`/pattern/`), 50 results per page.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::services::lcm::store::{LcmStore, MessageRow};
use crate::services::llm::types::ParameterSchema;
use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};
use crate::utils::error::{AppError, AppResult};

use super::{require_session, string_arg};

pub const LCM_GREP_TOOL_NAME: &str = "lcm_grep";
const MAX_MATCHES: usize = 50;
const MAX_OUTPUT: usize = 40_000;
const MAX_MATCH_TEXT: usize = 200;

const DESCRIPTION: &str = "Search conversation history with full-text search or a regex pattern.

Parameters:
- pattern: Plain text for full-text search (all words must match), or /pattern/ for regex search
- conversation_id: The session ID to search within
- summary_id: (optional) Limit the search to messages a specific summary covers
- page: (optional) Page number, defaults to 1

Returns up to 50 matches per page, each with the message sequence number, role and truncated text.";

/// Search mode of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrepPattern {
    Regex(String),
    FullText(String),
}

impl GrepPattern {
    /// `/…/` with a non-empty body is a regex; anything else is full text.
    pub fn parse(pattern: &str) -> Self {
        if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
            GrepPattern::Regex(pattern[1..pattern.len() - 1].to_string())
        } else {
            GrepPattern::FullText(fts_query(pattern))
        }
    }
}

/// Whitespace-separated terms joined with `AND`.
pub fn fts_query(pattern: &str) -> String {
    let terms: Vec<&str> = pattern.split_whitespace().collect();
    if terms.is_empty() {
        return pattern.to_string();
    }
    terms.join(" AND ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Row offset of a 1-based page, or `None` when it falls past what the
/// store can address.
fn page_offset(page: u64) -> Option<usize> {
    let offset = page.checked_sub(1)?.checked_mul(MAX_MATCHES as u64)?;
    if offset > i64::MAX as u64 {
        return None;
    }
    usize::try_from(offset).ok()
}

/// Render a page of matches. `matches` may hold one extra row, which only
/// signals that another page exists.
pub fn render_matches(matches: &[MessageRow], page: usize) -> String {
    if matches.is_empty() {
        return "No matches found.\n".to_string();
    }
    let truncated = matches.len() > MAX_MATCHES;
    let shown = &matches[..matches.len().min(MAX_MATCHES)];

    let mut output = format!("Found {} matches", shown.len());
    if truncated {
        output.push_str(&format!(
            " (showing first {}, use page={} for more)",
            MAX_MATCHES,
            page.saturating_add(1)
        ));
    }
    output.push_str("\n\n");

    let mut total = 0usize;
    for m in shown {
        let line = format!(
            "[seq={}, role={}]: {}\n",
            m.seq,
            m.role,
            truncate_chars(&m.text(), MAX_MATCH_TEXT)
        );
        if total + line.len() > MAX_OUTPUT {
            output.push_str("\n(Output truncated. Use more specific pattern or page parameter.)\n");
            break;
        }
        total += line.len();
        output.push_str(&line);
    }
    output
}

pub struct LcmGrepTool {
    store: LcmStore,
}

impl LcmGrepTool {
    pub fn new(store: LcmStore) -> Self {
        Self { store }
    }

    fn search(
        &self,
        conversation_id: &str,
        pattern: &GrepPattern,
        summary_scope: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<MessageRow>> {
        match pattern {
            GrepPattern::FullText(query) => self.store.search_messages_fts(
                conversation_id,
                query,
                summary_scope,
                limit as i64,
                offset as i64,
            ),
            GrepPattern::Regex(expr) => {
                let re = regex::Regex::new(expr)
                    .map_err(|e| AppError::validation(format!("invalid regex pattern: {}", e)))?;
                let matches = self
                    .store
                    .session_messages_scoped(conversation_id, summary_scope)?
                    .into_iter()
                    .filter(|m| re.is_match(&m.text()))
                    .skip(offset)
                    .take(limit)
                    .collect();
                Ok(matches)
            }
        }
    }
}

#[async_trait]
impl Tool for LcmGrepTool {
    fn name(&self) -> &str {
        LCM_GREP_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "pattern".to_string(),
            ParameterSchema::string(Some(
                "Search pattern (plain text for FTS, or /regex/ for regex search)",
            )),
        );
        properties.insert(
            "conversation_id".to_string(),
            ParameterSchema::string(Some("Session ID to search in")),
        );
        properties.insert(
            "summary_id".to_string(),
            ParameterSchema::string(Some("Optional: limit search to a specific summary scope")),
        );
        properties.insert(
            "page".to_string(),
            ParameterSchema::integer(Some("Page number for pagination (default: 1)"))
                .with_default(serde_json::json!(1)),
        );
        ParameterSchema::object(
            None,
            properties,
            vec!["pattern".to_string(), "conversation_id".to_string()],
        )
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let pattern = string_arg(&args, "pattern");
        if pattern.is_empty() {
            return ToolResult::err("pattern is required");
        }
        let conversation_id = string_arg(&args, "conversation_id");
        if conversation_id.is_empty() {
            return ToolResult::err("conversation_id is required");
        }
        if let Err(e) = require_session(ctx) {
            return e;
        }

        let summary_id = string_arg(&args, "summary_id");
        let summary_scope = (!summary_id.is_empty()).then_some(summary_id.as_str());
        let page = args
            .get("page")
            .and_then(Value::as_i64)
            .unwrap_or(1)
            .max(1) as u64;
        let Some(offset) = page_offset(page) else {
            return ToolResult::ok(render_matches(&[], 0));
        };

        let parsed = GrepPattern::parse(&pattern);
        match self.search(&conversation_id, &parsed, summary_scope, offset, MAX_MATCHES + 1) {
            Ok(matches) => ToolResult::ok(render_matches(&matches, page as usize)),
            Err(e) => ToolResult::err(format!("Error searching messages: {}", e)),
        }
    }
}
