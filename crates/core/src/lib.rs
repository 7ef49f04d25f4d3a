//! Agent Coordinator Core
//!
//! Foundational error types and the request-scoped context record shared by
//! the coordinator workspace. This crate has no dependency on storage,
//! model providers or the async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `context` - Ambient request values (`RequestContext`, `RunInjectionKey`, `ExecutionContext`)

pub mod context;
pub mod error;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Request Context ────────────────────────────────────────────────────
pub use context::{ExecutionContext, RequestContext, RunInjectionKey};
