//! CQRS classification markers
//!
//! Commands are the write operations the mutation recorder audits; queries
//! are read-only and never audited. The markers keep the distinction
//! visible at the type level when wiring handlers.

/// Marker for write operations (create/update/delete). Every command is
/// audited in the transaction that applies it.
pub trait Command {}

/// Marker for read operations. Queries never write and are not audited.
pub trait Query {}
