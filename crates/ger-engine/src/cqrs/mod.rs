pub use mediator::DefaultAsyncMediator;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::registry::EntityRegistry;

pub mod middleware;

pub type AppMediator = DefaultAsyncMediator;

/// Wire every command and query handler onto one mediator.
///
/// The registry is the process-wide immutable schema value; handlers that
/// consult it receive a shared reference, never a mutable global.
pub fn build_mediator(pool: SqlitePool, registry: Arc<EntityRegistry>) -> AppMediator {
    DefaultAsyncMediator::builder()
        // Mutations
        .add_handler({
            let pool = pool.clone();
            move |cmd| {
                let pool = pool.clone();
                async move {
                    crate::features::mutations::commands::record_create::handle(pool, cmd).await
                }
            }
        })
        .add_handler({
            let pool = pool.clone();
            move |cmd| {
                let pool = pool.clone();
                async move {
                    crate::features::mutations::commands::record_update::handle(pool, cmd).await
                }
            }
        })
        .add_handler({
            let pool = pool.clone();
            let registry = registry.clone();
            move |cmd| {
                let pool = pool.clone();
                let registry = registry.clone();
                async move {
                    crate::features::mutations::commands::record_delete::handle(
                        pool, registry, cmd,
                    )
                    .await
                }
            }
        })
        // Audit trail
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move {
                    crate::features::audit_trail::queries::list::handle(pool, query).await
                }
            }
        })
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move {
                    crate::features::audit_trail::queries::record_changes::handle(pool, query)
                        .await
                }
            }
        })
        .build()
}
