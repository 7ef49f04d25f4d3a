//! map_refresh Tool Implementation
//!
//! Rebuilds the repository map for the calling session, either inline or in
//! the background.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::services::llm::types::ParameterSchema;
use crate::services::repomap::controller::{
    RefreshFn, REFRESHED, REFRESH_SCHEDULED, REFRESH_UNAVAILABLE, SESSION_REQUIRED,
};
use crate::services::tools::executor::ToolResult;
use crate::services::tools::trait_def::{Tool, ToolExecutionContext};

use agent_coordinator_core::ExecutionContext;

pub const MAP_REFRESH_TOOL_NAME: &str = "map_refresh";

const DESCRIPTION: &str = "Refresh the repository map for the current session.

Use this tool when the repository map appears stale and you need it rebuilt.

By default this schedules an asynchronous refresh. Set sync=true to run synchronously.

This tool is safe to call repeatedly.";

pub struct MapRefreshTool {
    refresh_sync: Option<RefreshFn>,
    refresh_async: Option<RefreshFn>,
}

impl MapRefreshTool {
    pub fn new(refresh_sync: Option<RefreshFn>, refresh_async: Option<RefreshFn>) -> Self {
        Self {
            refresh_sync,
            refresh_async,
        }
    }
}

#[async_trait]
impl Tool for MapRefreshTool {
    fn name(&self) -> &str {
        MAP_REFRESH_TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "sync".to_string(),
            ParameterSchema::boolean(Some(
                "When true, run refresh synchronously and return after completion",
            ))
            .with_default(serde_json::json!(false)),
        );
        ParameterSchema::object(None, properties, vec![])
    }

    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        let Some(session_id) = ctx.session_id() else {
            return ToolResult::err(SESSION_REQUIRED);
        };
        let sync = args.get("sync").and_then(Value::as_bool).unwrap_or(false);

        let (refresh, done) = if sync {
            (&self.refresh_sync, REFRESHED)
        } else {
            (&self.refresh_async, REFRESH_SCHEDULED)
        };
        let Some(refresh) = refresh else {
            return ToolResult::err(REFRESH_UNAVAILABLE);
        };

        match refresh(session_id.to_string()).await {
            Ok(()) => ToolResult::ok(done),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }
}
