//! Storage Layer
//!
//! Handles data persistence: the pooled SQLite database and the TOML config file.

pub mod config;
pub mod database;

pub use config::*;
pub use database::*;
