//! Audit trail listing query
//!
//! Read-side entry point for the audit trail: optional filters (entity
//! type, action, record, actor, time range), offset/limit pagination with
//! the page-size cap, and a total match count for UI pagination. Unknown
//! entity-type or action tokens are rejected as filter errors at this
//! boundary, never treated as wildcards; the explicit `"all"` sentinel is
//! how a caller opts out of a filter.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::{
    self, AuditAction, AuditEntry, AuditFilter, AuditStoreError, Page, PAGE_SIZE_CAP,
};
use crate::error::Retryable;
use crate::registry::EntityType;

/// Sentinel filter token matching every entity type or action.
pub const FILTER_ALL: &str = "all";

/// Query for listing audit trail entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAuditTrailQuery {
    /// Entity type token, or `"all"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Action token, or `"all"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

/// Response from listing audit trail entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAuditTrailResponse {
    pub entries: Vec<AuditEntry>,
    pub pagination: PaginationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMetadata {
    pub limit: i64,
    pub offset: i64,
    /// Total rows matching the filter, independent of the page window.
    pub total: i64,
}

/// Errors that can occur when listing the audit trail
#[derive(Debug, thiserror::Error)]
pub enum ListAuditTrailError {
    #[error("Unknown entity type filter: {0:?}")]
    UnknownEntityTypeFilter(String),

    #[error("Unknown action filter: {0:?}")]
    UnknownActionFilter(String),

    #[error("Time range is inverted: occurred_after is later than occurred_before")]
    InvalidTimeRange,

    #[error("Limit must be greater than 0")]
    InvalidLimit,

    #[error("Offset must be non-negative")]
    InvalidOffset,

    #[error("Audit storage error: {0}")]
    Storage(#[from] AuditStoreError),
}

impl Retryable for ListAuditTrailError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(AuditStoreError::Database(_)))
    }
}

impl Request<Result<ListAuditTrailResponse, ListAuditTrailError>> for ListAuditTrailQuery {}

impl crate::cqrs::middleware::Query for ListAuditTrailQuery {}

impl ListAuditTrailQuery {
    /// Parse and validate the raw filter tokens into a typed filter and a
    /// normalized page window.
    pub fn parse(&self) -> Result<(AuditFilter, Page), ListAuditTrailError> {
        let entity_type = match self.entity_type.as_deref() {
            None => None,
            Some(token) if token.eq_ignore_ascii_case(FILTER_ALL) => None,
            Some(token) => Some(token.parse::<EntityType>().map_err(|_| {
                ListAuditTrailError::UnknownEntityTypeFilter(token.to_string())
            })?),
        };

        let action = match self.action.as_deref() {
            None => None,
            Some(token) if token.eq_ignore_ascii_case(FILTER_ALL) => None,
            Some(token) => Some(AuditAction::parse(token).ok_or_else(|| {
                ListAuditTrailError::UnknownActionFilter(token.to_string())
            })?),
        };

        if let (Some(after), Some(before)) = (self.occurred_after, self.occurred_before) {
            if after > before {
                return Err(ListAuditTrailError::InvalidTimeRange);
            }
        }

        if matches!(self.limit, Some(limit) if limit < 1) {
            return Err(ListAuditTrailError::InvalidLimit);
        }
        if matches!(self.offset, Some(offset) if offset < 0) {
            return Err(ListAuditTrailError::InvalidOffset);
        }

        let filter = AuditFilter {
            entity_type,
            action,
            record_id: self.record_id,
            actor: self.actor.clone(),
            occurred_after: self.occurred_after,
            occurred_before: self.occurred_before,
        };
        // Oversized limits are truncated to the cap, not rejected.
        let page = Page {
            limit: self.limit.unwrap_or(PAGE_SIZE_CAP),
            offset: self.offset.unwrap_or(0),
        }
        .normalized();

        Ok((filter, page))
    }
}

#[tracing::instrument(skip(pool, query))]
pub async fn handle(
    pool: SqlitePool,
    query: ListAuditTrailQuery,
) -> Result<ListAuditTrailResponse, ListAuditTrailError> {
    let (filter, page) = query.parse()?;

    let (entries, total) = audit::list_entries(&pool, &filter, page).await?;

    Ok(ListAuditTrailResponse {
        entries,
        pagination: PaginationMetadata {
            limit: page.limit,
            offset: page.offset,
            total,
        },
    })
}
