//! Prepare-Step Hooks
//!
//! Ordered composition of mutators applied to the message list right before
//! each model step.
//!
//! ## Architecture
//!
//! A pipeline is an ordered `Vec` of optional hooks. Application is a fold:
//! the context and prepared state returned by hook *i* are the inputs of hook
//! *i + 1*. Absent (`None`) hooks are skipped. The first error stops the fold
//! and the caller receives the failing hook's own context and prepared state,
//! including any partial changes it made, together with the error.
//!
//! Hooks never mutate their inputs in place; they return a new
//! [`PreparedStep`] (which may be a clone of the input when nothing changes).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use agent_coordinator_core::{ExecutionContext, RequestContext, RunInjectionKey};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::services::llm::types::Message;
use crate::utils::error::{AppError, AppResult};

// ============================================================================
// Hook Inputs
// ============================================================================

/// Ambient values for one model step.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Session id and run-injection key
    pub request: RequestContext,
    /// Working directory of the session
    pub working_directory: PathBuf,
    /// Cooperative cancellation for the step
    pub cancellation_token: CancellationToken,
}

impl HookContext {
    pub fn new(request: RequestContext, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            request,
            working_directory: working_directory.into(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }
}

impl ExecutionContext for HookContext {
    fn session_id(&self) -> Option<&str> {
        self.request.session_id()
    }

    fn run_injection_key(&self) -> Option<&RunInjectionKey> {
        self.request.run_injection_key()
    }
}

/// Step-level options supplied by the model loop.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Zero-based index of the step within the run
    pub step_number: u32,
    /// Model that will serve the step
    pub model_id: String,
}

/// State about to be sent to the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedStep {
    pub messages: Vec<Message>,
    /// Restriction of the tool set for this step, `None` for all tools
    pub active_tools: Option<Vec<String>>,
}

impl PreparedStep {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            active_tools: None,
        }
    }
}

// ============================================================================
// Hook Trait
// ============================================================================

/// A single prepare-step mutator.
#[async_trait]
pub trait PrepareStepHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Produce the context and prepared state for the next hook. A failing
    /// hook still returns the state it reached.
    async fn prepare(
        &self,
        ctx: &HookContext,
        opts: &StepOptions,
        prepared: &PreparedStep,
    ) -> HookOutcome;
}

/// Boxed async closure usable as a hook.
pub type PrepareStepFn = Box<
    dyn Fn(
            HookContext,
            StepOptions,
            PreparedStep,
        ) -> Pin<Box<dyn Future<Output = HookOutcome> + Send>>
        + Send
        + Sync,
>;

/// Adapter turning a [`PrepareStepFn`] into a [`PrepareStepHook`].
pub struct FnPrepareStepHook {
    name: String,
    func: PrepareStepFn,
}

impl FnPrepareStepHook {
    pub fn new(name: impl Into<String>, func: PrepareStepFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl PrepareStepHook for FnPrepareStepHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(
        &self,
        ctx: &HookContext,
        opts: &StepOptions,
        prepared: &PreparedStep,
    ) -> HookOutcome {
        (self.func)(ctx.clone(), opts.clone(), prepared.clone()).await
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Context and prepared state produced by a hook or by the whole pipeline.
#[derive(Debug)]
pub struct HookOutcome {
    pub ctx: HookContext,
    pub prepared: PreparedStep,
    /// Error of the hook that stopped the fold, if any
    pub error: Option<AppError>,
}

impl HookOutcome {
    pub fn ok(ctx: HookContext, prepared: PreparedStep) -> Self {
        Self {
            ctx,
            prepared,
            error: None,
        }
    }

    /// Failure carrying whatever state the hook reached before `error`.
    pub fn failed(ctx: HookContext, prepared: PreparedStep, error: AppError) -> Self {
        Self {
            ctx,
            prepared,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> AppResult<(HookContext, PreparedStep)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.ctx, self.prepared)),
        }
    }
}

/// Ordered sequence of prepare-step hooks.
#[derive(Default, Clone)]
pub struct HookPipeline {
    hooks: Vec<Option<Arc<dyn PrepareStepHook>>>,
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .hooks
            .iter()
            .map(|h| h.as_ref().map(|h| h.name()).unwrap_or("<none>"))
            .collect();
        f.debug_struct("HookPipeline").field("hooks", &names).finish()
    }
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pipeline from optional hooks; `None` entries are kept as
    /// placeholders and skipped at run time.
    pub fn from_hooks(hooks: impl IntoIterator<Item = Option<Arc<dyn PrepareStepHook>>>) -> Self {
        Self {
            hooks: hooks.into_iter().collect(),
        }
    }

    pub fn push(&mut self, hook: Option<Arc<dyn PrepareStepHook>>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Apply every hook in order, stopping at the first error.
    pub async fn apply(
        &self,
        ctx: HookContext,
        opts: &StepOptions,
        prepared: PreparedStep,
    ) -> HookOutcome {
        let mut ctx = ctx;
        let mut prepared = prepared;

        for (i, hook) in self.hooks.iter().enumerate() {
            let Some(hook) = hook else {
                continue;
            };
            let outcome = hook.prepare(&ctx, opts, &prepared).await;
            if let Some(e) = &outcome.error {
                warn!(hook = hook.name(), index = i, error = %e, "prepare-step hook failed");
                return outcome;
            }
            ctx = outcome.ctx;
            prepared = outcome.prepared;
        }

        debug!(hooks = self.hooks.len(), messages = prepared.messages.len(), "prepare-step hooks applied");
        HookOutcome::ok(ctx, prepared)
    }
}
