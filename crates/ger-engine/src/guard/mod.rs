//! Deletion Guard Evaluator
//!
//! Decides whether a governed record may be hard-deleted by counting
//! dependent rows for every child relation the registry declares. The
//! evaluation must run on the same connection (transaction) that performs
//! the delete, so the counts and the delete commit as one unit; the delete
//! command additionally re-evaluates immediately before commit
//! (compare-and-delete) to close any remaining race window.
//!
//! A failed count never falls through to "safe to delete": it surfaces as
//! [`GuardError::CheckFailed`] and the deletion is refused.

use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::registry::{ChildRelation, DependentScope, EntityRegistry, EntityType, RegistryError};

/// One child relation that currently blocks a deletion.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BlockingRelation {
    pub child: EntityType,
    pub foreign_key: &'static str,
    /// Dependent rows counted under the relation's scope.
    pub dependents: i64,
}

impl std::fmt::Display for BlockingRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} record(s) still reference it via {}",
            self.dependents,
            self.child.table(),
            self.foreign_key
        )
    }
}

/// Outcome of a guard evaluation. Blocking relations appear in registry
/// declaration order so callers can report the first or all reasons
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision {
    pub blocking: Vec<BlockingRelation>,
}

impl GuardDecision {
    pub fn allowed(&self) -> bool {
        self.blocking.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Dependent count query failed: {0}")]
    CheckFailed(#[source] sqlx::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Evaluate whether `record_id` of `entity_type` can be deleted.
///
/// Issues one dependent-count query per owned child relation on the
/// caller's connection. Returns an allowed decision only when every count
/// is zero.
pub async fn evaluate(
    conn: &mut SqliteConnection,
    registry: &EntityRegistry,
    entity_type: EntityType,
    record_id: Uuid,
) -> Result<GuardDecision, GuardError> {
    let mut blocking = Vec::new();
    for relation in registry.relations_owned_by(entity_type)? {
        let dependents = count_dependents(conn, relation, record_id)
            .await
            .map_err(GuardError::CheckFailed)?;
        if dependents > 0 {
            blocking.push(BlockingRelation {
                child: relation.child,
                foreign_key: relation.foreign_key,
                dependents,
            });
        }
    }

    debug!(
        entity_type = %entity_type,
        record_id = %record_id,
        blocking = blocking.len(),
        "Evaluated deletion guard"
    );

    Ok(GuardDecision { blocking })
}

async fn count_dependents(
    conn: &mut SqliteConnection,
    relation: &ChildRelation,
    record_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let mut sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?",
        relation.child.table(),
        relation.foreign_key
    );
    if relation.scope == DependentScope::ActiveOnly {
        sql.push_str(" AND active = 1");
    }

    sqlx::query_scalar(&sql)
        .bind(record_id.to_string())
        .fetch_one(&mut *conn)
        .await
}
