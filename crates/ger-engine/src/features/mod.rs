//! Feature modules implementing the engine's caller-facing API
//!
//! Vertical slices following the CQRS (Command Query Responsibility
//! Segregation) pattern:
//!
//! - **mutations**: the mutation recorder: the three write operations
//!   (record create / update / delete), each auditing itself in the same
//!   transaction that applies the business change.
//! - **audit_trail**: the read side: filtered, paginated listing of audit
//!   entries and the per-entry field-diff view. Reads are never audited.
//!
//! Commands and queries implement the mediator pattern using the `mediator`
//! crate; see [`crate::cqrs::build_mediator`].

pub mod audit_trail;
pub mod mutations;
