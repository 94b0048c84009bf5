//! Record-create command
//!
//! Applies the creation of a governed record and appends the matching
//! CREATE audit entry in the same transaction. Either both the business
//! row and the audit entry commit, or neither does.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use ger_common::Snapshot;

use crate::audit::{self, AuditAction, NewAuditEntry};
use crate::error::Retryable;
use crate::registry::EntityType;
use crate::store;

/// Command to create a governed record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCreateCommand {
    pub entity_type: EntityType,
    pub record_id: Uuid,
    /// Full state of the new record.
    pub after: Snapshot,
    /// Opaque actor identifier; `None` means system/unauthenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Response from creating a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCreateResponse {
    pub record_id: Uuid,
    pub audit_entry_id: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Errors that can occur when creating a record
#[derive(Debug, thiserror::Error)]
pub enum RecordCreateError {
    #[error("Snapshot must contain at least one field")]
    EmptySnapshot,

    #[error("Invalid snapshot field name: {0:?}")]
    InvalidFieldName(String),

    #[error("Snapshot id field does not match record id '{0}'")]
    IdMismatch(Uuid),

    #[error("Record '{0}' already exists")]
    DuplicateRecord(Uuid),

    #[error("A referenced parent record does not exist")]
    ParentNotFound,

    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[from] sqlx::Error),
}

impl Retryable for RecordCreateError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionAborted(_))
    }
}

impl Request<Result<RecordCreateResponse, RecordCreateError>> for RecordCreateCommand {}

impl crate::cqrs::middleware::Command for RecordCreateCommand {}

impl RecordCreateCommand {
    /// Validates the command parameters
    ///
    /// # Errors
    ///
    /// - `EmptySnapshot` - the after snapshot carries no fields
    /// - `InvalidFieldName` - a field name fails the identifier rules
    /// - `IdMismatch` - the snapshot carries an `id` field that differs
    ///   from `record_id`
    pub fn validate(&self) -> Result<(), RecordCreateError> {
        if self.after.is_empty() {
            return Err(RecordCreateError::EmptySnapshot);
        }
        if let Some(field) = self.after.first_invalid_field_name() {
            return Err(RecordCreateError::InvalidFieldName(field.to_string()));
        }
        validate_id_field(&self.after, self.record_id)
            .map_err(RecordCreateError::IdMismatch)?;
        Ok(())
    }
}

/// Check that a snapshot's `id` field, when present, equals the record id.
pub(crate) fn validate_id_field(snapshot: &Snapshot, record_id: Uuid) -> Result<(), Uuid> {
    match snapshot.get("id") {
        None => Ok(()),
        Some(value) if value.as_str() == Some(record_id.to_string().as_str()) => Ok(()),
        Some(_) => Err(record_id),
    }
}

#[tracing::instrument(
    skip(pool, command),
    fields(entity_type = %command.entity_type, record_id = %command.record_id)
)]
pub async fn handle(
    pool: SqlitePool,
    command: RecordCreateCommand,
) -> Result<RecordCreateResponse, RecordCreateError> {
    command.validate()?;

    let mut tx = pool.begin().await?;

    store::insert_row(&mut tx, command.entity_type, command.record_id, &command.after)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return RecordCreateError::DuplicateRecord(command.record_id);
                }
                if db_err.is_foreign_key_violation() {
                    return RecordCreateError::ParentNotFound;
                }
            }
            RecordCreateError::TransactionAborted(e)
        })?;

    let entry = audit::append_entry(
        &mut tx,
        NewAuditEntry {
            entity_type: command.entity_type,
            record_id: command.record_id,
            action: AuditAction::Create,
            actor: command.actor.clone(),
            before: None,
            after: Some(command.after.clone()),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(audit_entry_id = entry.id, "Recorded create");

    Ok(RecordCreateResponse {
        record_id: command.record_id,
        audit_entry_id: entry.id,
        occurred_at: entry.occurred_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sphere_command() -> RecordCreateCommand {
        RecordCreateCommand {
            entity_type: EntityType::Sphere,
            record_id: Uuid::new_v4(),
            after: [
                ("name".to_string(), json!("State administration")),
                ("active".to_string(), json!(true)),
            ]
            .into_iter()
            .collect(),
            actor: Some("registrar-1".to_string()),
        }
    }

    #[test]
    fn test_validation_success() {
        assert!(sphere_command().validate().is_ok());
    }

    #[test]
    fn test_validation_empty_snapshot() {
        let mut cmd = sphere_command();
        cmd.after = Snapshot::new();
        assert!(matches!(cmd.validate(), Err(RecordCreateError::EmptySnapshot)));
    }

    #[test]
    fn test_validation_bad_field_name() {
        let mut cmd = sphere_command();
        cmd.after.set("bad name", json!(1));
        assert!(matches!(
            cmd.validate(),
            Err(RecordCreateError::InvalidFieldName(_))
        ));
    }

    #[test]
    fn test_validation_id_mismatch() {
        let mut cmd = sphere_command();
        cmd.after.set("id", json!(Uuid::new_v4().to_string()));
        assert!(matches!(cmd.validate(), Err(RecordCreateError::IdMismatch(_))));
    }

    #[test]
    fn test_validation_matching_id_is_accepted() {
        let mut cmd = sphere_command();
        let id = cmd.record_id;
        cmd.after.set("id", json!(id.to_string()));
        assert!(cmd.validate().is_ok());
    }

    #[sqlx::test]
    async fn test_handle_writes_row_and_audit_entry(pool: SqlitePool) -> sqlx::Result<()> {
        let cmd = sphere_command();
        let record_id = cmd.record_id;

        let response = handle(pool.clone(), cmd).await.unwrap();
        assert_eq!(response.record_id, record_id);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spheres WHERE id = ?")
            .bind(record_id.to_string())
            .fetch_one(&pool)
            .await?;
        assert_eq!(rows, 1);

        let entries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE record_id = ?")
                .bind(record_id.to_string())
                .fetch_one(&pool)
                .await?;
        assert_eq!(entries, 1);
        Ok(())
    }

    #[sqlx::test]
    async fn test_handle_duplicate_record(pool: SqlitePool) -> sqlx::Result<()> {
        let cmd = sphere_command();
        let dup = cmd.clone();

        handle(pool.clone(), cmd).await.unwrap();
        let result = handle(pool.clone(), dup).await;
        assert!(matches!(result, Err(RecordCreateError::DuplicateRecord(_))));
        Ok(())
    }

    #[sqlx::test]
    async fn test_handle_missing_parent(pool: SqlitePool) -> sqlx::Result<()> {
        let cmd = RecordCreateCommand {
            entity_type: EntityType::Institution,
            record_id: Uuid::new_v4(),
            after: [
                ("name".to_string(), json!("Orphan ministry")),
                ("sphere_id".to_string(), json!(Uuid::new_v4().to_string())),
                ("active".to_string(), json!(true)),
            ]
            .into_iter()
            .collect(),
            actor: None,
        };
        let record_id = cmd.record_id;

        let result = handle(pool.clone(), cmd).await;
        assert!(matches!(result, Err(RecordCreateError::ParentNotFound)));
        assert!(!result.unwrap_err().is_retryable());

        // Nothing was committed, audit trail included.
        let entries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE record_id = ?")
                .bind(record_id.to_string())
                .fetch_one(&pool)
                .await?;
        assert_eq!(entries, 0);
        Ok(())
    }
}
