//! Request Context
//!
//! Ambient values that travel with a single model step or tool call:
//!
//! 1. `RunInjectionKey` - labels one run (top-level user turn plus every
//!    recursive step and queued continuation it triggers)
//! 2. `RequestContext` - immutable record carrying the session id and the
//!    run key for the current request
//! 3. `ExecutionContext` - read-only view shared by hook and tool contexts
//!
//! Values are carried explicitly instead of being looked up dynamically;
//! the async runtime context only carries cancellation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ============================================================================
// RunInjectionKey
// ============================================================================

/// Idempotency key for a single run.
///
/// `queue_generation` increments whenever a queued user message extends a run
/// that is still in progress, so a continuation is treated as a fresh run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunInjectionKey {
    pub root_user_message_id: String,
    pub queue_generation: i64,
}

impl RunInjectionKey {
    pub fn new(root_user_message_id: impl Into<String>, queue_generation: i64) -> Self {
        Self {
            root_user_message_id: root_user_message_id.into(),
            queue_generation,
        }
    }

    /// A key without a root user message cannot identify a run.
    pub fn is_valid(&self) -> bool {
        !self.root_user_message_id.trim().is_empty()
    }

    /// Key for the next queued continuation of the same run.
    pub fn next_generation(&self) -> Self {
        Self {
            root_user_message_id: self.root_user_message_id.clone(),
            queue_generation: self.queue_generation + 1,
        }
    }
}

impl fmt::Display for RunInjectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.root_user_message_id, self.queue_generation)
    }
}

// ============================================================================
// ExecutionContext Trait
// ============================================================================

/// Read-only access to the ambient request values.
pub trait ExecutionContext: Send + Sync {
    /// Session id of the caller, `None` when absent or empty.
    fn session_id(&self) -> Option<&str>;

    /// Run-injection key of the current run, `None` when absent or invalid.
    fn run_injection_key(&self) -> Option<&RunInjectionKey> {
        None
    }

    /// Session id or a `MissingContext` error.
    fn require_session_id(&self) -> CoreResult<&str> {
        self.session_id()
            .ok_or_else(|| CoreError::missing_context("session_id"))
    }
}

// ============================================================================
// RequestContext
// ============================================================================

/// Immutable request-scoped record.
///
/// Builders return a new value so a derived context never mutates the one it
/// was created from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    session_id: Option<String>,
    run_injection_key: Option<RunInjectionKey>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a session with no run key.
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self::new().with_session_id(session_id)
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_run_injection_key(mut self, key: RunInjectionKey) -> Self {
        self.run_injection_key = Some(key);
        self
    }

    pub fn without_run_injection_key(mut self) -> Self {
        self.run_injection_key = None;
        self
    }
}

impl ExecutionContext for RequestContext {
    fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    fn run_injection_key(&self) -> Option<&RunInjectionKey> {
        self.run_injection_key.as_ref().filter(|key| key.is_valid())
    }
}
