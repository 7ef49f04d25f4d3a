//! LCM Store
//!
//! Row access for sessions, messages and the large-file and summary
//! artifacts. Every artifact read is scoped to the caller's lineage and
//! reports whether a miss was a denial or a true absence.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

use super::lineage::{has_parent, is_in_lineage, with_lineage};
use super::parts::extract_text_from_parts;

pub const FILE_ID_PREFIX: &str = "file_";
pub const SUMMARY_ID_PREFIX: &str = "sum_";

fn hashed_id(prefix: &str, session_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    let hex: String = hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}{}", prefix, hex)
}

pub fn generate_file_id(session_id: &str, content: &str) -> String {
    hashed_id(FILE_ID_PREFIX, session_id, content)
}

pub fn generate_summary_id(session_id: &str, content: &str) -> String {
    hashed_id(SUMMARY_ID_PREFIX, session_id, content)
}

/// Result of a lineage-scoped lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Scoped<T> {
    Visible(T),
    /// Exists, but owned by a session outside the caller's lineage
    Denied,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Leaf,
    Condensed,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Leaf => "leaf",
            SummaryKind::Condensed => "condensed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "leaf" => Some(SummaryKind::Leaf),
            "condensed" => Some(SummaryKind::Condensed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargeFileRecord {
    pub file_id: String,
    pub session_id: String,
    pub original_path: String,
    pub content: Option<String>,
    pub token_count: i64,
    pub exploration_summary: Option<String>,
    pub explorer_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub summary_id: String,
    pub session_id: String,
    pub kind: SummaryKind,
    pub content: String,
    pub token_count: i64,
    /// JSON array of referenced file ids, as stored
    pub file_ids: String,
}

/// A summary plus its parent ids in ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDetail {
    pub summary: SummaryRecord,
    pub parent_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub seq: i64,
    pub role: String,
    pub parts: String,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seq: row.get(1)?,
            role: row.get(2)?,
            parts: row.get(3)?,
        })
    }

    pub fn text(&self) -> String {
        extract_text_from_parts(&self.parts)
    }
}

fn large_file_from_row(row: &Row<'_>) -> rusqlite::Result<LargeFileRecord> {
    Ok(LargeFileRecord {
        file_id: row.get(0)?,
        session_id: row.get(1)?,
        original_path: row.get(2)?,
        content: row.get(3)?,
        token_count: row.get(4)?,
        exploration_summary: row.get(5)?,
        explorer_used: row.get(6)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SummaryRecord> {
    let kind: String = row.get(2)?;
    Ok(SummaryRecord {
        summary_id: row.get(0)?,
        session_id: row.get(1)?,
        kind: SummaryKind::parse(&kind).unwrap_or(SummaryKind::Leaf),
        content: row.get(3)?,
        token_count: row.get(4)?,
        file_ids: row.get(5)?,
    })
}

const EXPAND_QUERY: &str = ",
summary_tree(id) AS (
    SELECT s.summary_id FROM lcm_summaries s
    WHERE s.summary_id = ?2 AND s.session_id IN (SELECT id FROM lineage)
    UNION
    SELECT p.parent_summary_id FROM lcm_summary_parents p
    JOIN summary_tree t ON p.summary_id = t.id
    JOIN lcm_summaries ps ON ps.summary_id = p.parent_summary_id
    WHERE ps.session_id IN (SELECT id FROM lineage)
)
SELECT DISTINCT m.id, m.seq, m.role, m.parts
FROM lcm_summary_messages sm
JOIN summary_tree t ON sm.summary_id = t.id
JOIN messages m ON m.id = sm.message_id
ORDER BY m.seq ASC, m.id ASC";

/// Store over the shared database.
#[derive(Debug, Clone)]
pub struct LcmStore {
    db: Database,
}

impl LcmStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn conn(&self) -> AppResult<crate::storage::database::DbConnection> {
        self.db.get_connection()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn create_session(&self, id: &str, parent_session_id: Option<&str>, title: &str) -> AppResult<()> {
        if id.trim().is_empty() {
            return Err(AppError::validation("session id is required"));
        }
        self.conn()?.execute(
            "INSERT INTO sessions (id, parent_session_id, title) VALUES (?1, ?2, ?3)",
            params![id, parent_session_id, title],
        )?;
        Ok(())
    }

    /// Append a message, assigning the next sequence number for the session.
    pub fn insert_message(&self, session_id: &str, id: &str, role: &str, parts_json: &str) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO messages (id, session_id, seq, role, parts) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, session_id, seq, role, parts_json],
        )?;
        tx.commit()?;
        Ok(seq)
    }

    pub fn insert_large_file(&self, record: &LargeFileRecord) -> AppResult<()> {
        if !record.file_id.starts_with(FILE_ID_PREFIX) {
            return Err(AppError::validation(format!(
                "file id must start with {}: {}",
                FILE_ID_PREFIX, record.file_id
            )));
        }
        self.conn()?.execute(
            "INSERT INTO lcm_large_files
                (file_id, session_id, original_path, content, token_count, exploration_summary, explorer_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.file_id,
                record.session_id,
                record.original_path,
                record.content,
                record.token_count,
                record.exploration_summary,
                record.explorer_used,
            ],
        )?;
        Ok(())
    }

    pub fn insert_summary(&self, record: &SummaryRecord) -> AppResult<()> {
        if !record.summary_id.starts_with(SUMMARY_ID_PREFIX) {
            return Err(AppError::validation(format!(
                "summary id must start with {}: {}",
                SUMMARY_ID_PREFIX, record.summary_id
            )));
        }
        let file_ids = if record.file_ids.trim().is_empty() {
            "[]"
        } else {
            record.file_ids.as_str()
        };
        self.conn()?.execute(
            "INSERT INTO lcm_summaries (summary_id, session_id, kind, content, token_count, file_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.summary_id,
                record.session_id,
                record.kind.as_str(),
                record.content,
                record.token_count,
                file_ids,
            ],
        )?;
        Ok(())
    }

    /// Record the messages a leaf summary subsumes, in order.
    pub fn link_summary_messages(&self, summary_id: &str, message_ids: &[&str]) -> AppResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (ord, message_id) in message_ids.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO lcm_summary_messages (summary_id, message_id, ord) VALUES (?1, ?2, ?3)",
                params![summary_id, message_id, ord as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record the summaries a condensed summary combines, in order.
    pub fn link_summary_parents(&self, summary_id: &str, parent_ids: &[&str]) -> AppResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (ord, parent_id) in parent_ids.iter().enumerate() {
            if *parent_id == summary_id {
                return Err(AppError::validation(format!(
                    "summary {} cannot be its own parent",
                    summary_id
                )));
            }
            tx.execute(
                "INSERT OR REPLACE INTO lcm_summary_parents (summary_id, parent_summary_id, ord) VALUES (?1, ?2, ?3)",
                params![summary_id, parent_id, ord as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Lineage-scoped reads
    // ========================================================================

    /// Whether the session is a sub-agent session.
    pub fn is_sub_agent_session(&self, session_id: &str) -> AppResult<bool> {
        has_parent(&*self.conn()?, session_id)
    }

    fn owner_of(conn: &Connection, table_sql: &str, id: &str) -> AppResult<Option<String>> {
        Ok(conn
            .query_row(table_sql, params![id], |row| row.get(0))
            .optional()?)
    }

    fn classify_miss<T>(conn: &Connection, caller: &str, owner: Option<String>) -> AppResult<Scoped<T>> {
        match owner {
            None => Ok(Scoped::Missing),
            Some(owner) if !is_in_lineage(conn, caller, &owner)? => Ok(Scoped::Denied),
            Some(_) => Ok(Scoped::Missing),
        }
    }

    pub fn large_file(&self, caller_session_id: &str, file_id: &str) -> AppResult<Scoped<LargeFileRecord>> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                &with_lineage(
                    "SELECT f.file_id, f.session_id, f.original_path, f.content, f.token_count,
                            f.exploration_summary, f.explorer_used
                     FROM lcm_large_files f
                     WHERE f.file_id = ?2 AND f.session_id IN (SELECT id FROM lineage)",
                ),
                params![caller_session_id, file_id],
                large_file_from_row,
            )
            .optional()?;
        if let Some(record) = found {
            return Ok(Scoped::Visible(record));
        }
        let owner = Self::owner_of(
            &conn,
            "SELECT session_id FROM lcm_large_files WHERE file_id = ?1",
            file_id,
        )?;
        Self::classify_miss(&conn, caller_session_id, owner)
    }

    pub fn summary(&self, caller_session_id: &str, summary_id: &str) -> AppResult<Scoped<SummaryDetail>> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                &with_lineage(
                    "SELECT s.summary_id, s.session_id, s.kind, s.content, s.token_count, s.file_ids
                     FROM lcm_summaries s
                     WHERE s.summary_id = ?2 AND s.session_id IN (SELECT id FROM lineage)",
                ),
                params![caller_session_id, summary_id],
                summary_from_row,
            )
            .optional()?;

        let Some(summary) = found else {
            let owner = Self::owner_of(
                &conn,
                "SELECT session_id FROM lcm_summaries WHERE summary_id = ?1",
                summary_id,
            )?;
            return Self::classify_miss(&conn, caller_session_id, owner);
        };

        let mut stmt = conn.prepare(
            "SELECT parent_summary_id FROM lcm_summary_parents WHERE summary_id = ?1 ORDER BY ord ASC",
        )?;
        let parent_ids = stmt
            .query_map(params![summary_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Scoped::Visible(SummaryDetail { summary, parent_ids }))
    }

    /// Messages reachable from the summary through its parent closure,
    /// restricted to summaries in the caller's lineage, in sequence order.
    pub fn expand_summary(&self, caller_session_id: &str, summary_id: &str) -> AppResult<Scoped<Vec<MessageRow>>> {
        let conn = self.conn()?;
        let query = format!("WITH RECURSIVE {}{}", super::lineage::LINEAGE_CTE, EXPAND_QUERY);
        let mut stmt = conn.prepare(&query)?;
        let messages = stmt
            .query_map(params![caller_session_id, summary_id], MessageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        if !messages.is_empty() {
            return Ok(Scoped::Visible(messages));
        }

        let owner = Self::owner_of(
            &conn,
            "SELECT session_id FROM lcm_summaries WHERE summary_id = ?1",
            summary_id,
        )?;
        match owner {
            Some(owner) if is_in_lineage(&conn, caller_session_id, &owner)? => Ok(Scoped::Visible(Vec::new())),
            other => Self::classify_miss(&conn, caller_session_id, other),
        }
    }

    // ========================================================================
    // Message search
    // ========================================================================

    /// Messages whose indexed text matches the FTS query, in sequence order.
    ///
    /// With `summary_scope`, only messages the summary directly subsumes
    /// are considered.
    pub fn search_messages_fts(
        &self,
        session_id: &str,
        fts_query: &str,
        summary_scope: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<MessageRow>> {
        let conn = self.conn()?;
        let mut sql = String::from(
            "SELECT m.id, m.seq, m.role, m.parts FROM messages m
             WHERE m.session_id = ?1
               AND m.rowid IN (SELECT rowid FROM messages_fts WHERE messages_fts MATCH ?2)",
        );
        if summary_scope.is_some() {
            sql.push_str(
                "\n               AND m.id IN (SELECT message_id FROM lcm_summary_messages WHERE summary_id = ?5)",
            );
        }
        sql.push_str("\n             ORDER BY m.seq ASC\n             LIMIT ?3 OFFSET ?4");

        let mut stmt = conn.prepare(&sql)?;
        let rows = match summary_scope {
            Some(scope) => stmt
                .query_map(params![session_id, fts_query, limit, offset, scope], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![session_id, fts_query, limit, offset], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Messages of a session in sequence order, optionally limited to those
    /// a summary directly subsumes.
    pub fn session_messages_scoped(&self, session_id: &str, summary_scope: Option<&str>) -> AppResult<Vec<MessageRow>> {
        let conn = self.conn()?;
        let rows = match summary_scope {
            Some(scope) => {
                let mut stmt = conn.prepare(
                    "SELECT m.id, m.seq, m.role, m.parts FROM messages m
                     WHERE m.session_id = ?1
                       AND m.id IN (SELECT message_id FROM lcm_summary_messages WHERE summary_id = ?2)
                     ORDER BY m.seq ASC",
                )?;
                let rows = stmt
                    .query_map(params![session_id, scope], MessageRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, seq, role, parts FROM messages WHERE session_id = ?1 ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(params![session_id], MessageRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    /// All messages of a session, in sequence order.
    pub fn session_messages(&self, session_id: &str) -> AppResult<Vec<MessageRow>> {
        self.session_messages_scoped(session_id, None)
    }
}
