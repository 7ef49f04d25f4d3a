//! Long-Conversation Memory Integration Tests
//!
//! Exercises the lineage-scoped tools through the coordinator tool registry
//! against an in-memory SQLite database:
//! - lcm_describe lineage visibility
//! - lcm_expand sub-agent gate and summary-parent closure
//! - lcm_grep full-text and regex search

use serde_json::json;

use agent_coordinator::services::lcm::parts::encode_text_parts;
use agent_coordinator::services::lcm::store::{
    LargeFileRecord, LcmStore, SummaryKind, SummaryRecord,
};
use agent_coordinator::services::tools::impls::lcm_expand::MAIN_SESSION_DENIED;
use agent_coordinator::services::tools::{
    build_coordinator_tools, CoordinatorToolDeps, ToolExecutionContext, ToolRegistry,
};
use agent_coordinator::storage::database::Database;
use agent_coordinator::RequestContext;

// ============================================================================
// Helpers
// ============================================================================

fn summary(id: &str, session: &str, kind: SummaryKind) -> SummaryRecord {
    SummaryRecord {
        summary_id: id.to_string(),
        session_id: session.to_string(),
        kind,
        content: format!("summary {}", id),
        token_count: 10,
        file_ids: "[]".to_string(),
    }
}

/// Sessions `main`, `sub` (child of `main`) and `other`, with files,
/// messages and summaries owned by each.
fn seeded_store() -> LcmStore {
    let store = LcmStore::new(Database::new_in_memory().expect("in-memory database"));
    store.create_session("main", None, "main").unwrap();
    store.create_session("sub", Some("main"), "sub").unwrap();
    store.create_session("other", None, "other").unwrap();

    for (id, session) in [
        ("file_self", "sub"),
        ("file_ancestor", "main"),
        ("file_unrelated", "other"),
    ] {
        store
            .insert_large_file(&LargeFileRecord {
                file_id: id.to_string(),
                session_id: session.to_string(),
                original_path: format!("/repo/{}.txt", id),
                content: Some(format!("body of {}", id)),
                token_count: 100,
                exploration_summary: None,
                explorer_used: None,
            })
            .unwrap();
    }

    store
        .insert_message("main", "m1", "user", &encode_text_parts(&["refactor the tokenizer module"]))
        .unwrap();
    store
        .insert_message("main", "m2", "assistant", &encode_text_parts(&["tokenizer refactor done"]))
        .unwrap();
    store
        .insert_message("main", "m3", "user", &encode_text_parts(&["now update the docs"]))
        .unwrap();
    store
        .insert_message("other", "o1", "user", &encode_text_parts(&["tokenizer elsewhere"]))
        .unwrap();

    store.insert_summary(&summary("sum_main", "main", SummaryKind::Leaf)).unwrap();
    store.link_summary_messages("sum_main", &["m1"]).unwrap();

    store.insert_summary(&summary("sum_tail", "main", SummaryKind::Leaf)).unwrap();
    store.link_summary_messages("sum_tail", &["m2", "m3"]).unwrap();

    store.insert_summary(&summary("sum_root", "main", SummaryKind::Condensed)).unwrap();
    store.link_summary_parents("sum_root", &["sum_main", "sum_tail"]).unwrap();

    store.insert_summary(&summary("sum_other", "other", SummaryKind::Leaf)).unwrap();
    store.link_summary_messages("sum_other", &["o1"]).unwrap();

    store
}

fn registry(store: &LcmStore) -> ToolRegistry {
    build_coordinator_tools(CoordinatorToolDeps {
        lcm_store: Some(store.clone()),
        ..Default::default()
    })
}

fn ctx(session: &str) -> ToolExecutionContext {
    ToolExecutionContext::new(RequestContext::for_session(session), "/repo")
}

// ============================================================================
// lcm_describe
// ============================================================================

#[tokio::test]
async fn test_describe_follows_lineage() {
    let store = seeded_store();
    let tools = registry(&store);

    let own = tools
        .execute("lcm_describe", &ctx("sub"), json!({"id": "file_self"}))
        .await;
    assert!(own.success, "{:?}", own);

    let ancestor = tools
        .execute("lcm_describe", &ctx("sub"), json!({"id": "file_ancestor"}))
        .await;
    assert!(ancestor.success, "{:?}", ancestor);
    assert!(ancestor.to_content().contains("/repo/file_ancestor.txt"));

    let unrelated = tools
        .execute("lcm_describe", &ctx("sub"), json!({"id": "file_unrelated"}))
        .await;
    assert_eq!(
        unrelated.error.as_deref(),
        Some("Access denied: file_unrelated is outside this session lineage")
    );
}

#[tokio::test]
async fn test_describe_summary_lists_parents() {
    let store = seeded_store();
    let tools = registry(&store);

    let result = tools
        .execute("lcm_describe", &ctx("sub"), json!({"id": "sum_root"}))
        .await;
    assert!(result.success, "{:?}", result);
    let content = result.to_content();
    assert!(content.contains("sum_main"));
    assert!(content.contains("sum_tail"));

    let denied = tools
        .execute("lcm_describe", &ctx("main"), json!({"id": "sum_other"}))
        .await;
    assert!(denied.to_content().contains("Access denied"));
}

// ============================================================================
// lcm_expand
// ============================================================================

#[tokio::test]
async fn test_expand_is_gated_to_sub_agents() {
    let store = seeded_store();
    let tools = registry(&store);

    let from_main = tools
        .execute("lcm_expand", &ctx("main"), json!({"summary_id": "sum_main"}))
        .await;
    assert_eq!(from_main.error.as_deref(), Some(MAIN_SESSION_DENIED));

    let from_sub = tools
        .execute("lcm_expand", &ctx("sub"), json!({"summary_id": "sum_main"}))
        .await;
    assert!(from_sub.success, "{:?}", from_sub);
    let content = from_sub.to_content();
    assert!(content.starts_with("Expanded 1 messages from summary sum_main:"));
    assert!(content.contains("refactor the tokenizer module"));

    let unrelated = tools
        .execute("lcm_expand", &ctx("sub"), json!({"summary_id": "sum_other"}))
        .await;
    assert_eq!(
        unrelated.error.as_deref(),
        Some("Access denied: sum_other is outside this session lineage")
    );
}

#[tokio::test]
async fn test_expand_walks_parent_summaries_in_seq_order() {
    let store = seeded_store();
    let tools = registry(&store);

    let result = tools
        .execute("lcm_expand", &ctx("sub"), json!({"summary_id": "sum_root"}))
        .await;
    assert!(result.success, "{:?}", result);
    let content = result.to_content();
    assert!(content.starts_with("Expanded 3 messages from summary sum_root:"));

    let first = content.find("--- Message m1").unwrap();
    let second = content.find("--- Message m2").unwrap();
    let third = content.find("--- Message m3").unwrap();
    assert!(first < second && second < third);
}

// ============================================================================
// lcm_grep
// ============================================================================

#[tokio::test]
async fn test_grep_full_text_scoped_to_conversation() {
    let store = seeded_store();
    let tools = registry(&store);

    let result = tools
        .execute(
            "lcm_grep",
            &ctx("sub"),
            json!({"pattern": "tokenizer", "conversation_id": "main"}),
        )
        .await;
    assert!(result.success, "{:?}", result);
    let content = result.to_content();
    assert!(content.starts_with("Found 2 matches"));
    assert!(content.contains("[seq=1, role=user]: refactor the tokenizer module"));
    assert!(!content.contains("elsewhere"));
}

#[tokio::test]
async fn test_grep_regex_with_summary_scope() {
    let store = seeded_store();
    let tools = registry(&store);

    let result = tools
        .execute(
            "lcm_grep",
            &ctx("sub"),
            json!({"pattern": "/tok.nizer/", "conversation_id": "main", "summary_id": "sum_tail"}),
        )
        .await;
    assert!(result.success, "{:?}", result);
    let content = result.to_content();
    assert!(content.starts_with("Found 1 matches"));
    assert!(content.contains("tokenizer refactor done"));
}

#[tokio::test]
async fn test_grep_requires_session() {
    let store = seeded_store();
    let tools = registry(&store);
    let no_session = ToolExecutionContext::new(RequestContext::new(), "/repo");

    let result = tools
        .execute(
            "lcm_grep",
            &no_session,
            json!({"pattern": "tokenizer", "conversation_id": "main"}),
        )
        .await;
    assert!(result.is_error());
}

#[tokio::test]
async fn test_unknown_tool() {
    let store = seeded_store();
    let result = registry(&store)
        .execute("lcm_nope", &ctx("sub"), json!({}))
        .await;
    assert_eq!(result.error.as_deref(), Some("Unknown tool: lcm_nope"));
}
