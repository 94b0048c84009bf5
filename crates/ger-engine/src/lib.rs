//! GER Engine Library
//!
//! Change-audit and referential-integrity guard engine for the government
//! entity registry (sphere → institution → body → managing unit → sector →
//! position, plus the bank, creditor and document-category registries).
//!
//! # Overview
//!
//! - **Entity Schema Registry**: typed, immutable description of every
//!   governed entity type and its ownership relations
//! - **Diff Engine**: pure field-level deltas between record snapshots
//! - **Deletion Guard**: dependent-count checks that refuse deletions which
//!   would orphan child records
//! - **Mutation Recorder**: create/update/delete commands that persist the
//!   business change and its audit entry in one transaction
//! - **Audit Query Service**: filtered, paginated read access to the
//!   append-only audit trail
//!
//! # Architecture
//!
//! The engine follows a **CQRS (Command Query Responsibility Segregation)**
//! architecture:
//!
//! - **Commands** (write operations) modify governed records. Every command
//!   is audited: the audit entry is written in the same transaction as the
//!   business mutation, so either both commit or neither does. Deletes
//!   additionally pass the deletion guard inside that transaction.
//! - **Queries** (read operations) serve the audit trail and per-entry
//!   field diffs. They never write and are not audited.
//!
//! Failures are classified via [`error::Retryable`]: business-rule
//! refusals (a blocked deletion, an unknown filter token) are permanent,
//! while guard-check failures, detected races and aborted transactions are
//! transient and may be retried.
//!
//! ## Framework Stack
//!
//! - **SQLx**: SQLite-backed persistence; serializable transactions cover
//!   the guard-then-delete sequence
//! - **mediator**: command/query dispatch
//! - **tracing**: structured logging throughout
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ger_engine::{config::Config, cqrs, db, registry::EntityRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!     let registry = Arc::new(EntityRegistry::bootstrap()?);
//!     let _mediator = cqrs::build_mediator(pool, registry);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod cqrs;
pub mod db;
pub mod diff;
pub mod error;
pub mod features;
pub mod guard;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use error::Retryable;
pub use ger_common::Snapshot;
pub use registry::{EntityRegistry, EntityType};
