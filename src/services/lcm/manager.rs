//! LCM Manager
//!
//! Per-session context accounting. Tracks the token overheads that shrink a
//! session's usable window and derives its [`ContextBudget`].

use std::sync::Arc;

use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::config::LcmOptions;
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

use super::budget::{compute_budget, ContextBudget};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SessionOverheads {
    context_window: i64,
    system_prompt_tokens: i64,
    tool_tokens: i64,
    repo_map_tokens: i64,
}

pub struct LcmManager {
    db: Database,
    options: LcmOptions,
    model_output_limit: i64,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
    budgets: DashMap<String, ContextBudget>,
}

impl std::fmt::Debug for LcmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcmManager")
            .field("options", &self.options)
            .field("sessions", &self.budgets.len())
            .finish()
    }
}

impl LcmManager {
    pub fn new(db: Database, options: LcmOptions, model_output_limit: i64) -> Self {
        Self {
            db,
            options,
            model_output_limit,
            session_locks: DashMap::new(),
            budgets: DashMap::new(),
        }
    }

    pub fn options(&self) -> &LcmOptions {
        &self.options
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn budget_for(&self, o: &SessionOverheads) -> ContextBudget {
        compute_budget(
            o.context_window,
            o.system_prompt_tokens,
            o.tool_tokens,
            o.repo_map_tokens,
            self.options.ctx_cutoff_threshold,
            self.model_output_limit,
        )
    }

    fn load(&self, session_id: &str) -> AppResult<Option<SessionOverheads>> {
        let conn = self.db.get_connection()?;
        let row = conn
            .query_row(
                "SELECT context_window, system_prompt_tokens, tool_tokens, repo_map_tokens
                 FROM lcm_session_config WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionOverheads {
                        context_window: row.get(0)?,
                        system_prompt_tokens: row.get(1)?,
                        tool_tokens: row.get(2)?,
                        repo_map_tokens: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Register a session's window and fixed overheads.
    ///
    /// Any previously recorded repo-map tokens are kept.
    pub async fn init_session(
        &self,
        session_id: &str,
        context_window: i64,
        system_prompt_tokens: i64,
        tool_tokens: i64,
    ) -> AppResult<ContextBudget> {
        if session_id.trim().is_empty() {
            return Err(AppError::validation("session id is required"));
        }
        if context_window <= 0 {
            return Err(AppError::validation("context window must be positive"));
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let repo_map_tokens = self.load(session_id)?.map(|o| o.repo_map_tokens).unwrap_or(0);
        let overheads = SessionOverheads {
            context_window,
            system_prompt_tokens: system_prompt_tokens.max(0),
            tool_tokens: tool_tokens.max(0),
            repo_map_tokens,
        };

        let conn = self.db.get_connection()?;
        conn.execute(
            "INSERT INTO lcm_session_config
                (session_id, context_window, system_prompt_tokens, tool_tokens, repo_map_tokens, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(session_id) DO UPDATE SET
                context_window = excluded.context_window,
                system_prompt_tokens = excluded.system_prompt_tokens,
                tool_tokens = excluded.tool_tokens,
                updated_at = excluded.updated_at",
            params![
                session_id,
                overheads.context_window,
                overheads.system_prompt_tokens,
                overheads.tool_tokens,
                overheads.repo_map_tokens,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        let budget = self.budget_for(&overheads);
        self.budgets.insert(session_id.to_string(), budget);
        Ok(budget)
    }

    /// Record the token count of the map injected for the session.
    pub async fn set_repo_map_tokens(&self, session_id: &str, tokens: i64) -> AppResult<()> {
        if session_id.trim().is_empty() {
            return Err(AppError::validation("session id is required"));
        }
        let tokens = tokens.max(0);

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO lcm_session_config (session_id, repo_map_tokens, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
                repo_map_tokens = excluded.repo_map_tokens,
                updated_at = excluded.updated_at",
            params![session_id, tokens, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        if let Some(overheads) = self.load(session_id)? {
            if overheads.context_window > 0 {
                self.budgets
                    .insert(session_id.to_string(), self.budget_for(&overheads));
            }
        }
        debug!(session_id, tokens, "recorded repo map tokens");
        Ok(())
    }

    pub fn repo_map_tokens(&self, session_id: &str) -> AppResult<i64> {
        Ok(self.load(session_id)?.map(|o| o.repo_map_tokens).unwrap_or(0))
    }

    /// Current budget of an initialized session.
    pub fn get_budget(&self, session_id: &str) -> AppResult<ContextBudget> {
        if let Some(budget) = self.budgets.get(session_id) {
            return Ok(*budget);
        }
        match self.load(session_id)? {
            Some(overheads) if overheads.context_window > 0 => {
                let budget = self.budget_for(&overheads);
                self.budgets.insert(session_id.to_string(), budget);
                Ok(budget)
            }
            _ => Err(AppError::not_found(format!(
                "no context budget for session {}",
                session_id
            ))),
        }
    }
}
