//! Integration Tests Module
//!
//! End-to-end coverage of the coordinator through its public API: repo-map
//! injection through the hook pipeline, lineage-scoped memory tools, the
//! map-refresh tool and the JSONL map pool.

// Repo-map hook and pipeline tests
mod repo_map_injection_test;

// Long-conversation memory tool tests
mod lcm_scope_test;

// Map-refresh tool and controller tests
mod map_refresh_test;

// JSONL batch map tests
mod jsonl_map_test;
