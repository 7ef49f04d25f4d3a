//! Long-Conversation Memory
//!
//! Lineage-scoped storage of large-file and summary artifacts, plus
//! per-session context budgeting.

pub mod budget;
pub mod lineage;
pub mod manager;
pub mod parts;
pub mod store;

pub use budget::{compute_budget, estimate_tokens, ContextBudget};
pub use manager::LcmManager;
pub use store::{LcmStore, Scoped};
