//! Record-delete command
//!
//! The only path that physically removes a governed row. The deletion guard
//! runs inside the delete's own transaction, the row is removed, the guard
//! is re-evaluated immediately before commit (compare-and-delete), and the
//! DELETE audit entry is appended, all as one atomic unit. A refusal at
//! any step rolls the whole operation back.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use ger_common::Snapshot;

use crate::audit::{self, AuditAction, NewAuditEntry};
use crate::error::Retryable;
use crate::guard::{self, BlockingRelation, GuardError};
use crate::registry::{EntityRegistry, EntityType, RegistryError};
use crate::store;

use super::record_create::validate_id_field;

/// Command to hard-delete a governed record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDeleteCommand {
    pub entity_type: EntityType,
    pub record_id: Uuid,
    /// Last known state of the record; recorded as the entry's before
    /// snapshot.
    pub before: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Response from deleting a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDeleteResponse {
    pub record_id: Uuid,
    pub audit_entry_id: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Errors that can occur when deleting a record
#[derive(Debug, thiserror::Error)]
pub enum RecordDeleteError {
    #[error("Snapshot must contain at least one field")]
    EmptySnapshot,

    #[error("Invalid snapshot field name: {0:?}")]
    InvalidFieldName(String),

    #[error("Snapshot id field does not match record id '{0}'")]
    IdMismatch(Uuid),

    #[error("Record '{0}' not found")]
    NotFound(Uuid),

    /// Business-rule refusal: dependents still reference the record. Not
    /// retryable until they are removed or reassigned.
    #[error("Deletion blocked: {}", describe_blocking(.blocking))]
    DeletionBlocked { blocking: Vec<BlockingRelation> },

    /// The guard passed, but a dependent appeared before commit. The caller
    /// may re-issue the delete.
    #[error("A dependent record was inserted concurrently; deletion aborted")]
    ConcurrentDependencyInserted,

    /// A dependent-count query failed; deletion refused because no
    /// definitive "safe to delete" answer exists.
    #[error("Deletion guard check failed: {0}")]
    GuardCheckFailed(#[source] sqlx::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[from] sqlx::Error),
}

impl Retryable for RecordDeleteError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GuardCheckFailed(_)
                | Self::ConcurrentDependencyInserted
                | Self::TransactionAborted(_)
        )
    }
}

fn describe_blocking(blocking: &[BlockingRelation]) -> String {
    blocking
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Request<Result<RecordDeleteResponse, RecordDeleteError>> for RecordDeleteCommand {}

impl crate::cqrs::middleware::Command for RecordDeleteCommand {}

impl RecordDeleteCommand {
    /// Validates the command parameters
    pub fn validate(&self) -> Result<(), RecordDeleteError> {
        if self.before.is_empty() {
            return Err(RecordDeleteError::EmptySnapshot);
        }
        if let Some(field) = self.before.first_invalid_field_name() {
            return Err(RecordDeleteError::InvalidFieldName(field.to_string()));
        }
        validate_id_field(&self.before, self.record_id)
            .map_err(RecordDeleteError::IdMismatch)?;
        Ok(())
    }
}

#[tracing::instrument(
    skip(pool, registry, command),
    fields(entity_type = %command.entity_type, record_id = %command.record_id)
)]
pub async fn handle(
    pool: SqlitePool,
    registry: Arc<EntityRegistry>,
    command: RecordDeleteCommand,
) -> Result<RecordDeleteResponse, RecordDeleteError> {
    command.validate()?;

    let mut tx = pool.begin().await?;

    let decision =
        guard::evaluate(&mut tx, &registry, command.entity_type, command.record_id)
            .await
            .map_err(map_guard_error)?;
    if !decision.allowed() {
        tracing::warn!(
            blocking = decision.blocking.len(),
            "Deletion refused by guard"
        );
        return Err(RecordDeleteError::DeletionBlocked { blocking: decision.blocking });
    }

    let rows = store::delete_row(&mut tx, command.entity_type, command.record_id)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                // The FK backstop caught a dependent the guard could not
                // see yet.
                if db_err.is_foreign_key_violation() {
                    return RecordDeleteError::ConcurrentDependencyInserted;
                }
            }
            RecordDeleteError::TransactionAborted(e)
        })?;
    if rows == 0 {
        return Err(RecordDeleteError::NotFound(command.record_id));
    }

    // Compare-and-delete: re-validate before commit so a dependent inserted
    // after the first check aborts the whole operation.
    let recheck =
        guard::evaluate(&mut tx, &registry, command.entity_type, command.record_id)
            .await
            .map_err(map_guard_error)?;
    if !recheck.allowed() {
        return Err(RecordDeleteError::ConcurrentDependencyInserted);
    }

    let entry = audit::append_entry(
        &mut tx,
        NewAuditEntry {
            entity_type: command.entity_type,
            record_id: command.record_id,
            action: AuditAction::Delete,
            actor: command.actor.clone(),
            before: Some(command.before.clone()),
            after: None,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(audit_entry_id = entry.id, "Recorded delete");

    Ok(RecordDeleteResponse {
        record_id: command.record_id,
        audit_entry_id: entry.id,
        occurred_at: entry.occurred_at,
    })
}

fn map_guard_error(error: GuardError) -> RecordDeleteError {
    match error {
        GuardError::CheckFailed(e) => RecordDeleteError::GuardCheckFailed(e),
        GuardError::Registry(e) => RecordDeleteError::Registry(e),
    }
}
