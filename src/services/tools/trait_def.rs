//! Tool Trait and Registry
//!
//! Defines the `Tool` trait every coordinator tool implements and the
//! `ToolRegistry` used to look tools up by name and dispatch calls.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agent_coordinator_core::{ExecutionContext, RequestContext, RunInjectionKey};
use tokio_util::sync::CancellationToken;

use crate::services::llm::types::{ParameterSchema, ToolDefinition};
use crate::services::tools::executor::ToolResult;

/// Context provided to each tool during execution.
///
/// Tools are pure functions of this context, their own wired services and
/// the call arguments. The session id is read from `request`.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    /// Session id and run key of the calling step
    pub request: RequestContext,
    /// Project root directory
    pub project_root: PathBuf,
    /// Current working directory; relative tool paths resolve against it
    pub working_directory: PathBuf,
    /// Cancellation token for cooperative cancellation
    pub cancellation_token: CancellationToken,
}

impl ToolExecutionContext {
    pub fn new(request: RequestContext, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            request,
            working_directory: project_root.clone(),
            project_root,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Resolve a tool path argument against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.working_directory.join(p)
        }
    }
}

impl ExecutionContext for ToolExecutionContext {
    fn session_id(&self) -> Option<&str> {
        self.request.session_id()
    }

    fn run_injection_key(&self) -> Option<&RunInjectionKey> {
        self.request.run_injection_key()
    }
}

/// Unified tool interface.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool (e.g., "lcm_grep")
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does
    fn description(&self) -> &str;

    /// JSON schema describing the tool's input parameters
    fn parameters_schema(&self) -> ParameterSchema;

    /// Whether this tool may run for a long time (batch tools).
    fn is_long_running(&self) -> bool {
        false
    }

    /// Execute the tool with the given context and arguments.
    ///
    /// Expected failures come back as `ToolResult::err`, never as panics.
    async fn execute(&self, ctx: &ToolExecutionContext, args: Value) -> ToolResult;
}

/// Registry of available tools.
///
/// Provides lookup by name and definitions in registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Insertion order for deterministic iteration
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. If a tool with the same name already exists, it is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.order.retain(|n| n != name);
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool definitions for the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    ///
    /// Returns `ToolResult::err` if the tool is not found.
    pub async fn execute(&self, name: &str, ctx: &ToolExecutionContext, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, args).await,
            None => ToolResult::err(format!("Unknown tool: {}", name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
