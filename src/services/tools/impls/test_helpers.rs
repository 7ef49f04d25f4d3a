//! Shared test utilities for tool unit tests.

use std::path::Path;

use agent_coordinator_core::RequestContext;

use crate::services::lcm::parts::encode_text_parts;
use crate::services::lcm::store::{LargeFileRecord, LcmStore, SummaryKind, SummaryRecord};
use crate::services::tools::trait_def::ToolExecutionContext;
use crate::storage::database::Database;

/// Context for `session_id` with `dir` as both project root and working
/// directory. An empty session id yields a context without a session.
pub(crate) fn make_test_ctx(session_id: &str, dir: &Path) -> ToolExecutionContext {
    let request = if session_id.is_empty() {
        RequestContext::new()
    } else {
        RequestContext::for_session(session_id)
    };
    ToolExecutionContext::new(request, dir)
}

/// Store with sessions `main`, `sub` (child of `main`) and `other`, one
/// large file per session and a leaf summary in `main` and `other`.
pub(crate) fn seeded_store() -> LcmStore {
    let store = LcmStore::new(Database::new_in_memory().unwrap());
    store.create_session("main", None, "main").unwrap();
    store.create_session("sub", Some("main"), "sub").unwrap();
    store.create_session("other", None, "other").unwrap();

    for (id, session) in [("file_self", "sub"), ("file_ancestor", "main"), ("file_unrelated", "other")] {
        store
            .insert_large_file(&LargeFileRecord {
                file_id: id.to_string(),
                session_id: session.to_string(),
                original_path: format!("/repo/{}.log", id),
                content: Some(format!("content of {}", id)),
                token_count: 42,
                exploration_summary: None,
                explorer_used: None,
            })
            .unwrap();
    }

    store
        .insert_message("main", "msg_main_1", "user", &encode_text_parts(&["refactor the parser"]))
        .unwrap();
    store
        .insert_message("other", "msg_other_1", "user", &encode_text_parts(&["unrelated work"]))
        .unwrap();

    for (id, session, msg) in [("sum_main", "main", "msg_main_1"), ("sum_other", "other", "msg_other_1")] {
        store
            .insert_summary(&SummaryRecord {
                summary_id: id.to_string(),
                session_id: session.to_string(),
                kind: SummaryKind::Leaf,
                content: format!("summary of {}", session),
                token_count: 12,
                file_ids: "[]".to_string(),
            })
            .unwrap();
        store.link_summary_messages(id, &[msg]).unwrap();
    }
    store
}
