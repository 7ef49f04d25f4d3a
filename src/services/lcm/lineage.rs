//! Session lineage
//!
//! A session's lineage is itself plus every transitive parent. All LCM reads
//! are authorized by joining against this closure.

use rusqlite::{params, Connection, OptionalExtension};

use crate::utils::error::AppResult;

/// Recursive closure over `sessions.parent_session_id`, seeded with the
/// caller's session id as the first bound parameter.
pub const LINEAGE_CTE: &str = "lineage(id) AS (
    SELECT ?1
    UNION
    SELECT s.parent_session_id FROM sessions s
    JOIN lineage l ON s.id = l.id
    WHERE s.parent_session_id IS NOT NULL AND s.parent_session_id != ''
)";

/// `WITH RECURSIVE` prefix for queries scoped to a lineage.
pub fn with_lineage(query: &str) -> String {
    format!("WITH RECURSIVE {}\n{}", LINEAGE_CTE, query)
}

/// Session ids in the lineage of `session_id`, self first.
pub fn ancestor_session_ids(conn: &Connection, session_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(&with_lineage("SELECT id FROM lineage"))?;
    let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for id in rows {
        ids.push(id?);
    }
    Ok(ids)
}

/// Whether `owner_session_id` is in the lineage of `session_id`.
pub fn is_in_lineage(conn: &Connection, session_id: &str, owner_session_id: &str) -> AppResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &with_lineage("SELECT 1 FROM lineage WHERE id = ?2 LIMIT 1"),
            params![session_id, owner_session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Whether the session has a parent, i.e. is a sub-agent session.
pub fn has_parent(conn: &Connection, session_id: &str) -> AppResult<bool> {
    let parent: Option<Option<String>> = conn
        .query_row(
            "SELECT parent_session_id FROM sessions WHERE id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(matches!(parent, Some(Some(p)) if !p.is_empty()))
}
