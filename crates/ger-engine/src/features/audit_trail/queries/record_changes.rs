//! Per-entry field changes query
//!
//! Reconstructs the field-level delta of one audit entry from its stored
//! before/after snapshots. CREATE entries present every field as an
//! addition, DELETE entries as a removal, UPDATE entries as the computed
//! before/after diff. Diffs are presented in the entity's declared field
//! order (unknown fields last, lexicographically) so output is stable for
//! a given entry.

use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use ger_common::Snapshot;

use crate::audit::{self, AuditAction, AuditStoreError};
use crate::diff::{self, FieldDiff};
use crate::error::Retryable;
use crate::registry::EntityType;

/// Query for the field changes of one audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordChangesQuery {
    pub audit_entry_id: i64,
}

/// Response carrying the ordered field changes of one audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordChangesResponse {
    pub audit_entry_id: i64,
    pub entity_type: EntityType,
    pub record_id: Uuid,
    pub action: AuditAction,
    pub changes: Vec<FieldDiff>,
}

/// Errors that can occur when computing record changes
#[derive(Debug, thiserror::Error)]
pub enum RecordChangesError {
    #[error("Audit entry {0} not found")]
    NotFound(i64),

    #[error("Audit storage error: {0}")]
    Storage(#[from] AuditStoreError),
}

impl Retryable for RecordChangesError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(AuditStoreError::Database(_)))
    }
}

impl Request<Result<RecordChangesResponse, RecordChangesError>> for RecordChangesQuery {}

impl crate::cqrs::middleware::Query for RecordChangesQuery {}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: SqlitePool,
    query: RecordChangesQuery,
) -> Result<RecordChangesResponse, RecordChangesError> {
    let entry = audit::get_entry(&pool, query.audit_entry_id)
        .await?
        .ok_or(RecordChangesError::NotFound(query.audit_entry_id))?;

    let empty = Snapshot::new();
    let before = entry.before.as_ref().unwrap_or(&empty);
    let after = entry.after.as_ref().unwrap_or(&empty);

    let changes = diff::order_for_entity(diff::diff(before, after), entry.entity_type);

    Ok(RecordChangesResponse {
        audit_entry_id: entry.id,
        entity_type: entry.entity_type,
        record_id: entry.record_id,
        action: entry.action,
        changes,
    })
}
