//! Database queries for the audit trail

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use ger_common::Snapshot;

use super::models::{AuditAction, AuditEntry, AuditFilter, NewAuditEntry, Page, PAGE_SIZE_CAP};
use crate::registry::EntityType;

/// Errors from the audit read side.
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("Audit query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored audit entry {id} is malformed: {reason}")]
    Malformed { id: i64, reason: String },
}

/// Append one audit entry on the caller's connection.
///
/// This is the only write path into `audit_log`, and the mutation recorder
/// is its only caller, always inside the transaction that applies the
/// business mutation, so the entry and the mutation commit or roll back
/// together.
pub async fn append_entry(
    conn: &mut SqliteConnection,
    entry: NewAuditEntry,
) -> Result<AuditEntry, sqlx::Error> {
    let occurred_at = Utc::now();
    let before_state = encode_snapshot(entry.before.as_ref())?;
    let after_state = encode_snapshot(entry.after.as_ref())?;

    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (
            entity_type, record_id, action, actor,
            occurred_at, before_state, after_state
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.entity_type.as_str())
    .bind(entry.record_id.to_string())
    .bind(entry.action.as_str())
    .bind(&entry.actor)
    .bind(format_timestamp(&occurred_at))
    .bind(&before_state)
    .bind(&after_state)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();

    debug!(
        audit_entry_id = id,
        action = %entry.action,
        entity_type = %entry.entity_type,
        "Appended audit entry"
    );

    Ok(AuditEntry {
        id,
        entity_type: entry.entity_type,
        record_id: entry.record_id,
        action: entry.action,
        actor: entry.actor,
        occurred_at,
        before: entry.before,
        after: entry.after,
    })
}

/// List audit entries matching `filter`, newest first (`occurred_at DESC`,
/// ties broken by `id DESC`), plus the total match count for pagination.
pub async fn list_entries(
    pool: &SqlitePool,
    filter: &AuditFilter,
    page: Page,
) -> Result<(Vec<AuditEntry>, i64), AuditStoreError> {
    let page = page.normalized();
    let where_clause = build_where_clause(filter);

    let count_sql = format!("SELECT COUNT(*) FROM audit_log{where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(entity_type) = filter.entity_type {
        count_query = count_query.bind(entity_type.as_str());
    }
    if let Some(action) = filter.action {
        count_query = count_query.bind(action.as_str());
    }
    if let Some(record_id) = filter.record_id {
        count_query = count_query.bind(record_id.to_string());
    }
    if let Some(ref actor) = filter.actor {
        count_query = count_query.bind(actor);
    }
    if let Some(ref occurred_after) = filter.occurred_after {
        count_query = count_query.bind(format_timestamp(occurred_after));
    }
    if let Some(ref occurred_before) = filter.occurred_before {
        count_query = count_query.bind(format_timestamp(occurred_before));
    }
    let total = count_query.fetch_one(pool).await?;

    let select_sql = format!(
        r#"
        SELECT id, entity_type, record_id, action, actor,
               occurred_at, before_state, after_state
        FROM audit_log{where_clause}
        ORDER BY occurred_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#
    );
    let mut select_query = sqlx::query_as::<_, AuditRow>(&select_sql);
    if let Some(entity_type) = filter.entity_type {
        select_query = select_query.bind(entity_type.as_str());
    }
    if let Some(action) = filter.action {
        select_query = select_query.bind(action.as_str());
    }
    if let Some(record_id) = filter.record_id {
        select_query = select_query.bind(record_id.to_string());
    }
    if let Some(ref actor) = filter.actor {
        select_query = select_query.bind(actor);
    }
    if let Some(ref occurred_after) = filter.occurred_after {
        select_query = select_query.bind(format_timestamp(occurred_after));
    }
    if let Some(ref occurred_before) = filter.occurred_before {
        select_query = select_query.bind(format_timestamp(occurred_before));
    }

    let rows = select_query
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    let entries = rows
        .into_iter()
        .map(AuditRow::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

    debug!(count = entries.len(), total, "Listed audit entries");

    Ok((entries, total))
}

/// Fetch one audit entry by id.
pub async fn get_entry(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<AuditEntry>, AuditStoreError> {
    let row = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT id, entity_type, record_id, action, actor,
               occurred_at, before_state, after_state
        FROM audit_log
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(AuditRow::into_entry).transpose()
}

/// Audit trail of one record, newest first.
pub async fn record_trail(
    pool: &SqlitePool,
    entity_type: EntityType,
    record_id: Uuid,
    limit: Option<i64>,
) -> Result<Vec<AuditEntry>, AuditStoreError> {
    let limit = limit.unwrap_or(PAGE_SIZE_CAP).clamp(1, PAGE_SIZE_CAP);

    let rows = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT id, entity_type, record_id, action, actor,
               occurred_at, before_state, after_state
        FROM audit_log
        WHERE entity_type = ? AND record_id = ?
        ORDER BY occurred_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(entity_type.as_str())
    .bind(record_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AuditRow::into_entry).collect()
}

fn build_where_clause(filter: &AuditFilter) -> String {
    let mut conditions: Vec<&'static str> = Vec::new();
    if filter.entity_type.is_some() {
        conditions.push("entity_type = ?");
    }
    if filter.action.is_some() {
        conditions.push("action = ?");
    }
    if filter.record_id.is_some() {
        conditions.push("record_id = ?");
    }
    if filter.actor.is_some() {
        conditions.push("actor = ?");
    }
    if filter.occurred_after.is_some() {
        conditions.push("occurred_at >= ?");
    }
    if filter.occurred_before.is_some() {
        conditions.push("occurred_at <= ?");
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Fixed-width RFC 3339 UTC so lexicographic order matches chronological
/// order in SQL comparisons.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_snapshot(snapshot: Option<&Snapshot>) -> Result<Option<String>, sqlx::Error> {
    snapshot
        .map(|s| serde_json::to_string(s).map_err(|e| sqlx::Error::Encode(Box::new(e))))
        .transpose()
}

/// Raw `audit_log` row; decoded into [`AuditEntry`] with token validation.
#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    entity_type: String,
    record_id: String,
    action: String,
    actor: Option<String>,
    occurred_at: String,
    before_state: Option<String>,
    after_state: Option<String>,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditEntry, AuditStoreError> {
        let malformed = |reason: String| AuditStoreError::Malformed { id: self.id, reason };

        let entity_type = self
            .entity_type
            .parse::<EntityType>()
            .map_err(|_| malformed(format!("unknown entity type {:?}", self.entity_type)))?;
        let action = AuditAction::parse(&self.action)
            .ok_or_else(|| malformed(format!("unknown action {:?}", self.action)))?;
        let record_id = Uuid::parse_str(&self.record_id)
            .map_err(|e| malformed(format!("bad record id: {e}")))?;
        let occurred_at = DateTime::parse_from_rfc3339(&self.occurred_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| malformed(format!("bad timestamp: {e}")))?;
        let before = self
            .before_state
            .as_deref()
            .map(serde_json::from_str::<Snapshot>)
            .transpose()
            .map_err(|e| malformed(format!("bad before snapshot: {e}")))?;
        let after = self
            .after_state
            .as_deref()
            .map(serde_json::from_str::<Snapshot>)
            .transpose()
            .map_err(|e| malformed(format!("bad after snapshot: {e}")))?;

        Ok(AuditEntry {
            id: self.id,
            entity_type,
            record_id,
            action,
            actor: self.actor,
            occurred_at,
            before,
            after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(name: &str) -> Snapshot {
        [("name".to_string(), json!(name))].into_iter().collect()
    }

    async fn append(
        pool: &SqlitePool,
        entry: NewAuditEntry,
    ) -> Result<AuditEntry, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        append_entry(&mut conn, entry).await
    }

    #[sqlx::test]
    async fn test_append_and_read_back(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
        let record_id = Uuid::new_v4();
        let entry = NewAuditEntry::builder()
            .entity_type(EntityType::Sphere)
            .record_id(record_id)
            .action(AuditAction::Create)
            .actor("registrar-3")
            .after(snapshot("State sphere"))
            .build();

        let appended = append(&pool, entry).await?;
        assert!(appended.id > 0);

        let fetched = get_entry(&pool, appended.id).await?.unwrap();
        assert_eq!(fetched.entity_type, EntityType::Sphere);
        assert_eq!(fetched.record_id, record_id);
        assert_eq!(fetched.action, AuditAction::Create);
        assert_eq!(fetched.actor.as_deref(), Some("registrar-3"));
        assert!(fetched.before.is_none());
        assert_eq!(fetched.after, Some(snapshot("State sphere")));
        Ok(())
    }

    #[sqlx::test]
    async fn test_list_filters_by_action_and_entity(
        pool: SqlitePool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for i in 0..3 {
            let entry = NewAuditEntry::builder()
                .entity_type(EntityType::Bank)
                .record_id(Uuid::new_v4())
                .action(AuditAction::Create)
                .after(snapshot(&format!("Bank {i}")))
                .build();
            append(&pool, entry).await?;
        }
        let entry = NewAuditEntry::builder()
            .entity_type(EntityType::Creditor)
            .record_id(Uuid::new_v4())
            .action(AuditAction::Update)
            .before(snapshot("Old"))
            .after(snapshot("New"))
            .build();
        append(&pool, entry).await?;

        let filter = AuditFilter {
            entity_type: Some(EntityType::Bank),
            ..Default::default()
        };
        let (entries, total) = list_entries(&pool, &filter, Page::default()).await?;
        assert_eq!(total, 3);
        assert!(entries.iter().all(|e| e.entity_type == EntityType::Bank));

        let filter = AuditFilter {
            action: Some(AuditAction::Update),
            ..Default::default()
        };
        let (entries, total) = list_entries(&pool, &filter, Page::default()).await?;
        assert_eq!(total, 1);
        assert_eq!(entries[0].entity_type, EntityType::Creditor);
        Ok(())
    }

    #[sqlx::test]
    async fn test_listing_is_newest_first_with_id_tie_break(
        pool: SqlitePool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for i in 0..5 {
            let entry = NewAuditEntry::builder()
                .entity_type(EntityType::Sphere)
                .record_id(Uuid::new_v4())
                .action(AuditAction::Create)
                .after(snapshot(&format!("S{i}")))
                .build();
            append(&pool, entry).await?;
        }

        let (entries, _) = list_entries(&pool, &AuditFilter::default(), Page::default()).await?;
        for pair in entries.windows(2) {
            assert!(pair[0].occurred_at >= pair[1].occurred_at);
            if pair[0].occurred_at == pair[1].occurred_at {
                assert!(pair[0].id > pair[1].id);
            }
        }
        Ok(())
    }

    #[sqlx::test]
    async fn test_oversized_limit_is_truncated(
        pool: SqlitePool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for _ in 0..3 {
            let entry = NewAuditEntry::builder()
                .entity_type(EntityType::Sphere)
                .record_id(Uuid::new_v4())
                .action(AuditAction::Create)
                .after(snapshot("S"))
                .build();
            append(&pool, entry).await?;
        }

        let page = Page { limit: 5000, offset: 0 };
        let (entries, total) = list_entries(&pool, &AuditFilter::default(), page).await?;
        assert_eq!(entries.len(), 3);
        assert_eq!(total, 3);
        Ok(())
    }

    #[sqlx::test]
    async fn test_record_trail(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
        let record_id = Uuid::new_v4();
        let create = NewAuditEntry::builder()
            .entity_type(EntityType::Bank)
            .record_id(record_id)
            .action(AuditAction::Create)
            .after(snapshot("v1"))
            .build();
        append(&pool, create).await?;
        let update = NewAuditEntry::builder()
            .entity_type(EntityType::Bank)
            .record_id(record_id)
            .action(AuditAction::Update)
            .before(snapshot("v1"))
            .after(snapshot("v2"))
            .build();
        append(&pool, update).await?;

        let trail = record_trail(&pool, EntityType::Bank, record_id, None).await?;
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::Update);
        assert_eq!(trail[1].action, AuditAction::Create);
        Ok(())
    }
}
