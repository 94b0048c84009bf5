//! Shared fixtures for integration tests

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use sqlx::SqlitePool;
use uuid::Uuid;

use ger_common::Snapshot;
use ger_engine::features::mutations::commands::record_create::{
    handle as record_create, RecordCreateCommand,
};
use ger_engine::registry::{EntityRegistry, EntityType};

pub fn registry() -> Arc<EntityRegistry> {
    Arc::new(EntityRegistry::bootstrap().expect("builtin registry must validate"))
}

pub fn snapshot(pairs: &[(&str, JsonValue)]) -> Snapshot {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn sphere_snapshot(name: &str) -> Snapshot {
    snapshot(&[("name", json!(name)), ("active", json!(true))])
}

pub fn institution_snapshot(name: &str, sphere_id: Uuid) -> Snapshot {
    snapshot(&[
        ("name", json!(name)),
        ("sphere_id", json!(sphere_id.to_string())),
        ("active", json!(true)),
    ])
}

/// Create a governed record through the recorder (so the fixture rows carry
/// their CREATE audit entries like production data would).
pub async fn seed_record(
    pool: &SqlitePool,
    entity_type: EntityType,
    after: Snapshot,
) -> Uuid {
    let record_id = Uuid::new_v4();
    record_create(
        pool.clone(),
        RecordCreateCommand {
            entity_type,
            record_id,
            after,
            actor: Some("fixture".to_string()),
        },
    )
    .await
    .expect("fixture record must be created");
    record_id
}

pub async fn seed_sphere(pool: &SqlitePool, name: &str) -> Uuid {
    seed_record(pool, EntityType::Sphere, sphere_snapshot(name)).await
}

pub async fn seed_institution(pool: &SqlitePool, name: &str, sphere_id: Uuid) -> Uuid {
    seed_record(
        pool,
        EntityType::Institution,
        institution_snapshot(name, sphere_id),
    )
    .await
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar(&sql)
        .fetch_one(pool)
        .await
        .expect("count query must succeed")
}

pub async fn count_audit_entries(pool: &SqlitePool, record_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE record_id = ?")
        .bind(record_id.to_string())
        .fetch_one(pool)
        .await
        .expect("count query must succeed")
}
