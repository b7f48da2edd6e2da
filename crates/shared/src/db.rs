//! Database pool construction and migrations

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create the main application pool.
///
/// Sized for the pooler URL (PgBouncer-compatible): modest connection count,
/// short acquire timeout so a saturated pool surfaces quickly instead of
/// queueing requests indefinitely.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await
}

/// Create a pool for running migrations.
///
/// Migrations need a direct connection (prepared statements don't survive
/// transaction-mode poolers) and can legitimately take longer than a request.
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}

/// Run all pending migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations complete");
    Ok(())
}
