//! Audit data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ger_common::Snapshot;

use crate::registry::EntityType;

// ============================================================================
// Audit Query Constants
// ============================================================================

/// Hard cap on audit entries returned per page. Requests asking for more are
/// truncated to this value, not rejected.
pub const PAGE_SIZE_CAP: i64 = 100;

/// The three mutations the recorder documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse an action token. `None` for anything but the three known
    /// tokens; the caller decides how to reject.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable audit trail entry as stored.
///
/// Exactly one of `before`/`after` is absent for DELETE/CREATE respectively;
/// both are present for UPDATE. Entries are append-only: nothing in the
/// engine updates or deletes them once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic identifier; the tie-break for newest-first ordering.
    pub id: i64,
    pub entity_type: EntityType,
    pub record_id: Uuid,
    pub action: AuditAction,
    /// Opaque actor identifier; `None` means system/unauthenticated.
    pub actor: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// State before the mutation (UPDATE/DELETE).
    pub before: Option<Snapshot>,
    /// State after the mutation (CREATE/UPDATE).
    pub after: Option<Snapshot>,
}

/// Input for appending an audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub entity_type: EntityType,
    pub record_id: Uuid,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
}

impl NewAuditEntry {
    /// Create a builder for constructing audit entries
    pub fn builder() -> AuditEntryBuilder {
        AuditEntryBuilder::default()
    }
}

/// Builder for audit entries; `try_build` enforces the before/after
/// presence invariants per action.
#[derive(Debug, Clone, Default)]
pub struct AuditEntryBuilder {
    entity_type: Option<EntityType>,
    record_id: Option<Uuid>,
    action: Option<AuditAction>,
    actor: Option<String>,
    before: Option<Snapshot>,
    after: Option<Snapshot>,
}

impl AuditEntryBuilder {
    pub fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn record_id(mut self, record_id: Uuid) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn before(mut self, before: Snapshot) -> Self {
        self.before = Some(before);
        self
    }

    pub fn after(mut self, after: Snapshot) -> Self {
        self.after = Some(after);
        self
    }

    /// Build the NewAuditEntry
    ///
    /// # Panics
    /// Panics if required fields are missing or the snapshots do not match
    /// the action. Use `try_build()` for fallible construction.
    pub fn build(self) -> NewAuditEntry {
        self.try_build()
            .expect("AuditEntryBuilder: entity_type, record_id, action and matching snapshots are required")
    }

    /// Try to build the NewAuditEntry, checking the per-action snapshot
    /// invariants.
    pub fn try_build(self) -> Result<NewAuditEntry, &'static str> {
        let entity_type = self.entity_type.ok_or("entity_type is required")?;
        let record_id = self.record_id.ok_or("record_id is required")?;
        let action = self.action.ok_or("action is required")?;

        match action {
            AuditAction::Create => {
                if self.before.is_some() {
                    return Err("create entries must not carry a before snapshot");
                }
                if self.after.is_none() {
                    return Err("create entries require an after snapshot");
                }
            },
            AuditAction::Update => {
                if self.before.is_none() || self.after.is_none() {
                    return Err("update entries require both snapshots");
                }
            },
            AuditAction::Delete => {
                if self.before.is_none() {
                    return Err("delete entries require a before snapshot");
                }
                if self.after.is_some() {
                    return Err("delete entries must not carry an after snapshot");
                }
            },
        }

        Ok(NewAuditEntry {
            entity_type,
            record_id,
            action,
            actor: self.actor,
            before: self.before,
            after: self.after,
        })
    }
}

/// Filter for audit trail listings. Every field is optional; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<EntityType>,
    pub action: Option<AuditAction>,
    pub record_id: Option<Uuid>,
    pub actor: Option<String>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: PAGE_SIZE_CAP, offset: 0 }
    }
}

impl Page {
    /// Clamp to sane bounds: limit within `1..=PAGE_SIZE_CAP` (oversized
    /// requests are truncated), non-negative offset.
    pub fn normalized(self) -> Self {
        Self {
            limit: self.limit.clamp(1, PAGE_SIZE_CAP),
            offset: self.offset.max(0),
        }
    }
}
