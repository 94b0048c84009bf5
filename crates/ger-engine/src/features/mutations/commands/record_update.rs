//! Record-update command
//!
//! Applies an update to a governed record and appends the matching UPDATE
//! audit entry, carrying both the before and after snapshots, in the same
//! transaction. Toggling a logical-active flag goes through this path like
//! any other field change; it is never treated as a deletion.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use ger_common::Snapshot;

use crate::audit::{self, AuditAction, NewAuditEntry};
use crate::diff;
use crate::error::Retryable;
use crate::registry::EntityType;
use crate::store;

use super::record_create::validate_id_field;

/// Command to update a governed record
///
/// `before` is the caller's snapshot of the record prior to the change and
/// is recorded verbatim; `after` is the state the row is updated to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUpdateCommand {
    pub entity_type: EntityType,
    pub record_id: Uuid,
    pub before: Snapshot,
    pub after: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Response from updating a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUpdateResponse {
    pub record_id: Uuid,
    pub audit_entry_id: i64,
    pub occurred_at: DateTime<Utc>,
    /// Number of fields that actually changed between the snapshots.
    pub fields_changed: usize,
}

/// Errors that can occur when updating a record
#[derive(Debug, thiserror::Error)]
pub enum RecordUpdateError {
    #[error("Both snapshots must contain at least one field")]
    EmptySnapshot,

    #[error("At least one field besides 'id' must be provided for update")]
    NoFieldsToUpdate,

    #[error("Invalid snapshot field name: {0:?}")]
    InvalidFieldName(String),

    #[error("Snapshot id field does not match record id '{0}'")]
    IdMismatch(Uuid),

    #[error("Record '{0}' not found")]
    NotFound(Uuid),

    #[error("A referenced parent record does not exist")]
    ParentNotFound,

    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[from] sqlx::Error),
}

impl Retryable for RecordUpdateError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionAborted(_))
    }
}

impl Request<Result<RecordUpdateResponse, RecordUpdateError>> for RecordUpdateCommand {}

impl crate::cqrs::middleware::Command for RecordUpdateCommand {}

impl RecordUpdateCommand {
    /// Validates the command parameters
    pub fn validate(&self) -> Result<(), RecordUpdateError> {
        if self.before.is_empty() || self.after.is_empty() {
            return Err(RecordUpdateError::EmptySnapshot);
        }
        if !self.after.field_names().any(|field| field != "id") {
            return Err(RecordUpdateError::NoFieldsToUpdate);
        }
        for snapshot in [&self.before, &self.after] {
            if let Some(field) = snapshot.first_invalid_field_name() {
                return Err(RecordUpdateError::InvalidFieldName(field.to_string()));
            }
            validate_id_field(snapshot, self.record_id)
                .map_err(RecordUpdateError::IdMismatch)?;
        }
        Ok(())
    }
}

#[tracing::instrument(
    skip(pool, command),
    fields(entity_type = %command.entity_type, record_id = %command.record_id)
)]
pub async fn handle(
    pool: SqlitePool,
    command: RecordUpdateCommand,
) -> Result<RecordUpdateResponse, RecordUpdateError> {
    command.validate()?;

    let changes = diff::diff(&command.before, &command.after);

    let mut tx = pool.begin().await?;

    let rows = store::update_row(&mut tx, command.entity_type, command.record_id, &command.after)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_foreign_key_violation() {
                    return RecordUpdateError::ParentNotFound;
                }
            }
            RecordUpdateError::TransactionAborted(e)
        })?;
    if rows == 0 {
        return Err(RecordUpdateError::NotFound(command.record_id));
    }

    let entry = audit::append_entry(
        &mut tx,
        NewAuditEntry {
            entity_type: command.entity_type,
            record_id: command.record_id,
            action: AuditAction::Update,
            actor: command.actor.clone(),
            before: Some(command.before.clone()),
            after: Some(command.after.clone()),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        audit_entry_id = entry.id,
        fields_changed = changes.len(),
        "Recorded update"
    );

    Ok(RecordUpdateResponse {
        record_id: command.record_id,
        audit_entry_id: entry.id,
        occurred_at: entry.occurred_at,
        fields_changed: changes.len(),
    })
}
