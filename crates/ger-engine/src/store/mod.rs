//! Generic governed-row persistence
//!
//! Builds parameterized INSERT/UPDATE/DELETE statements for governed
//! entity tables from a record's snapshot. Table names come from the
//! registry's closed [`EntityType`] set and field names must have passed
//! snapshot identifier validation before reaching this module, so the
//! generated SQL contains no caller-controlled identifiers.
//!
//! All functions take the caller's open connection (usually a transaction),
//! so a row write and its audit entry share one atomic unit of work.

use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqliteConnection};
use uuid::Uuid;

use ger_common::Snapshot;
use serde_json::Value as JsonValue;

use crate::registry::EntityType;

/// Insert a governed row from its snapshot. The `id` column is always bound
/// from `record_id`; a snapshot `id` field (validated upstream to match) is
/// skipped.
pub async fn insert_row(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    record_id: Uuid,
    snapshot: &Snapshot,
) -> Result<(), sqlx::Error> {
    let mut columns = vec!["id"];
    let mut placeholders = vec!["?"];
    for (field, _) in data_fields(snapshot) {
        columns.push(field);
        placeholders.push("?");
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entity_type.table(),
        columns.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query(&sql).bind(record_id.to_string());
    for (_, value) in data_fields(snapshot) {
        query = bind_value(query, value);
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

/// Update a governed row to match the `after` snapshot. Returns the number
/// of affected rows (0 when the record does not exist).
pub async fn update_row(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    record_id: Uuid,
    after: &Snapshot,
) -> Result<u64, sqlx::Error> {
    let assignments: Vec<String> = data_fields(after)
        .map(|(field, _)| format!("{field} = ?"))
        .collect();

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        entity_type.table(),
        assignments.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for (_, value) in data_fields(after) {
        query = bind_value(query, value);
    }
    let result = query.bind(record_id.to_string()).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Hard-delete a governed row. Returns the number of affected rows
/// (0 when the record does not exist).
pub async fn delete_row(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    record_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = ?", entity_type.table());
    let result = sqlx::query(&sql)
        .bind(record_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

fn data_fields(snapshot: &Snapshot) -> impl Iterator<Item = (&str, &JsonValue)> {
    snapshot.iter().filter(|(field, _)| *field != "id")
}

/// Bind one snapshot value with its natural SQL scalar type; nested
/// structures are bound as their JSON text.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q JsonValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        JsonValue::Null => query.bind(None::<String>),
        JsonValue::Bool(flag) => query.bind(*flag),
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                query.bind(int)
            } else if let Some(float) = number.as_f64() {
                query.bind(float)
            } else {
                query.bind(number.to_string())
            }
        },
        JsonValue::String(text) => query.bind(text.as_str()),
        nested => query.bind(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::SqlitePool;

    fn sphere_snapshot(name: &str) -> Snapshot {
        [
            ("name".to_string(), json!(name)),
            ("code".to_string(), json!("01")),
            ("active".to_string(), json!(true)),
        ]
        .into_iter()
        .collect()
    }

    #[sqlx::test]
    async fn test_insert_update_delete_round_trip(pool: SqlitePool) -> sqlx::Result<()> {
        let mut conn = pool.acquire().await?;
        let record_id = Uuid::new_v4();

        insert_row(&mut conn, EntityType::Sphere, record_id, &sphere_snapshot("Fiscal")).await?;

        let name: String = sqlx::query_scalar("SELECT name FROM spheres WHERE id = ?")
            .bind(record_id.to_string())
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(name, "Fiscal");

        let rows = update_row(
            &mut conn,
            EntityType::Sphere,
            record_id,
            &sphere_snapshot("Monetary"),
        )
        .await?;
        assert_eq!(rows, 1);

        let rows = delete_row(&mut conn, EntityType::Sphere, record_id).await?;
        assert_eq!(rows, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spheres")
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(count, 0);
        Ok(())
    }

    #[sqlx::test]
    async fn test_update_missing_row_affects_nothing(pool: SqlitePool) -> sqlx::Result<()> {
        let mut conn = pool.acquire().await?;
        let rows = update_row(
            &mut conn,
            EntityType::Sphere,
            Uuid::new_v4(),
            &sphere_snapshot("Ghost"),
        )
        .await?;
        assert_eq!(rows, 0);
        Ok(())
    }

    #[sqlx::test]
    async fn test_null_binds_as_sql_null(pool: SqlitePool) -> sqlx::Result<()> {
        let mut conn = pool.acquire().await?;
        let record_id = Uuid::new_v4();
        let snapshot: Snapshot = [
            ("name".to_string(), json!("No code")),
            ("code".to_string(), JsonValue::Null),
            ("active".to_string(), json!(true)),
        ]
        .into_iter()
        .collect();

        insert_row(&mut conn, EntityType::Sphere, record_id, &snapshot).await?;

        let code: Option<String> = sqlx::query_scalar("SELECT code FROM spheres WHERE id = ?")
            .bind(record_id.to_string())
            .fetch_one(&mut *conn)
            .await?;
        assert_eq!(code, None);
        Ok(())
    }
}
