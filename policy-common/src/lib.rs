//! # Policy Common Library
//!
//! Shared code for the policy ingestion service:
//! - Common error and result types
//! - Bootstrap configuration loading (TOML, environment, CLI priority)
//! - SQLite database initialization and persisted row models

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
