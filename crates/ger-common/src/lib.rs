//! GER Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the GER workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all GER workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized `tracing` initialization
//! - **Types**: Shared domain types, most importantly [`types::Snapshot`]
//!
//! # Example
//!
//! ```
//! use ger_common::types::Snapshot;
//! use serde_json::json;
//!
//! let mut snapshot = Snapshot::new();
//! snapshot.set("name", json!("Ministry of Finance"));
//! snapshot.set("active", json!(true));
//! assert_eq!(snapshot.get("name"), Some(&json!("Ministry of Finance")));
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::Snapshot;
