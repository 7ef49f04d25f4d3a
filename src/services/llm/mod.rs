//! LLM Message Model
//!
//! Provider-agnostic message types and request annotations. Transport to
//! model providers lives outside this crate.

pub mod provider_options;
pub mod types;

pub use provider_options::*;
pub use types::*;
