//! SQLite Database
//!
//! Embedded store for sessions, messages and long-conversation memory
//! artifacts, using rusqlite with r2d2 connection pooling.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::database_path;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection handed out by [`Database::get_connection`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

impl Database {
    /// Create a database from an existing connection pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create an in-memory database for testing.
    ///
    /// A single connection keeps every caller on the same in-memory database.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open the default database under the coordinator directory
    pub fn new() -> AppResult<Self> {
        Self::open(&database_path()?)
    }

    /// Open (or create) a database file with connection pooling
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                parent_session_id TEXT,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                parts TEXT NOT NULL DEFAULT '[]',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(session_id, seq)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_seq ON messages(session_id, seq)",
            [],
        )?;

        // Full-text index over the text parts of each message, keyed by the
        // message rowid.
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(content)",
            [],
        )?;

        // Text comes from `data.text`, or a flat `text` when `data.text` is
        // absent, matching `extract_text_from_parts`. Recreated so older
        // databases pick up the current definition.
        conn.execute("DROP TRIGGER IF EXISTS messages_fts_insert", [])?;
        conn.execute(
            "CREATE TRIGGER messages_fts_insert AFTER INSERT ON messages BEGIN
                INSERT INTO messages_fts(rowid, content) VALUES (
                    new.rowid,
                    COALESCE((
                        SELECT group_concat(
                            CASE
                                WHEN json_type(value, '$.data.text') IS NOT NULL THEN
                                    CASE WHEN json_type(value, '$.data.text') = 'text'
                                        THEN json_extract(value, '$.data.text') END
                                WHEN json_type(value, '$.text') = 'text'
                                    THEN json_extract(value, '$.text')
                            END,
                            ' '
                        )
                        FROM json_each(CASE WHEN json_valid(new.parts) THEN new.parts ELSE '[]' END)
                        WHERE type = 'object' AND json_extract(value, '$.type') = 'text'
                    ), '')
                );
            END",
            [],
        )?;

        conn.execute(
            "CREATE TRIGGER IF NOT EXISTS messages_fts_delete AFTER DELETE ON messages BEGIN
                DELETE FROM messages_fts WHERE rowid = old.rowid;
            END",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lcm_large_files (
                file_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                original_path TEXT NOT NULL,
                content TEXT,
                token_count INTEGER NOT NULL DEFAULT 0,
                exploration_summary TEXT,
                explorer_used TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lcm_summaries (
                summary_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('leaf', 'condensed')),
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL DEFAULT 0,
                file_ids TEXT NOT NULL DEFAULT '[]',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lcm_summary_messages (
                summary_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                ord INTEGER NOT NULL,
                PRIMARY KEY (summary_id, message_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lcm_summary_parents (
                summary_id TEXT NOT NULL,
                parent_summary_id TEXT NOT NULL,
                ord INTEGER NOT NULL,
                PRIMARY KEY (summary_id, parent_summary_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lcm_session_config (
                session_id TEXT PRIMARY KEY,
                context_window INTEGER NOT NULL DEFAULT 0,
                system_prompt_tokens INTEGER NOT NULL DEFAULT 0,
                tool_tokens INTEGER NOT NULL DEFAULT 0,
                repo_map_tokens INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS repo_map_session_read_only (
                repo_key TEXT NOT NULL,
                session_id TEXT NOT NULL,
                path TEXT NOT NULL,
                PRIMARY KEY (repo_key, session_id, path)
            )",
            [],
        )?;

        Ok(())
    }

    /// Get a pooled connection
    pub fn get_connection(&self) -> AppResult<DbConnection> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }

    /// Check whether a table exists
    pub fn table_exists(&self, table: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
