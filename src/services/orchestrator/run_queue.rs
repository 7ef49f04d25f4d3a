//! Run queue
//!
//! Issues run-injection keys. A run starts at a top-level user message with
//! generation 0; each queued message that extends the active run bumps the
//! generation.

use agent_coordinator_core::{RequestContext, RunInjectionKey};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RunQueue {
    active: DashMap<String, RunInjectionKey>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a run for the session rooted at `root_user_message_id`,
    /// replacing any active run.
    pub fn start_run(&self, session_id: &str, root_user_message_id: &str) -> RunInjectionKey {
        let key = RunInjectionKey::new(root_user_message_id, 0);
        self.active.insert(session_id.to_string(), key.clone());
        debug!(session_id, run = %key, "run started");
        key
    }

    /// Extend the active run with a queued message.
    ///
    /// Returns `None` when the session has no active run.
    pub fn enqueue(&self, session_id: &str) -> Option<RunInjectionKey> {
        let mut entry = self.active.get_mut(session_id)?;
        let key = entry.next_generation();
        *entry = key.clone();
        debug!(session_id, run = %key, "run extended");
        Some(key)
    }

    pub fn current(&self, session_id: &str) -> Option<RunInjectionKey> {
        self.active.get(session_id).map(|k| k.clone())
    }

    pub fn finish(&self, session_id: &str) -> Option<RunInjectionKey> {
        self.active.remove(session_id).map(|(_, key)| key)
    }

    /// Request context for the session carrying its active run key, if any.
    pub fn request_context(&self, session_id: &str) -> RequestContext {
        let ctx = RequestContext::for_session(session_id);
        match self.current(session_id) {
            Some(key) => ctx.with_run_injection_key(key),
            None => ctx,
        }
    }
}
