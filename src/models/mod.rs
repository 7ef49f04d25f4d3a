//! Data Models
//!
//! Configuration structures shared across the coordinator.

pub mod config;

pub use config::*;
