//! Idempotency ledger
//!
//! Append-only record of externally-sourced event ids already applied. Rows
//! are never updated or deleted; the `(provider, event_id)` unique constraint
//! is what turns a duplicate-delivery race into a rejected second insert.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{PaymentsError, PaymentsResult};

/// Provider tag for ledger rows written by this pipeline
pub const PROVIDER: &str = "stripe";

/// A ledger row
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct ProcessedEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_id: String,
    pub processed_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct EventLedger {
    pool: PgPool,
}

impl EventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether an event has already been applied
    pub async fn is_processed(&self, event_id: &str) -> PaymentsResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE provider = $1 AND event_id = $2)",
        )
        .bind(PROVIDER)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    /// Record an event as applied.
    ///
    /// Returns `true` if this call inserted the row, `false` if another
    /// delivery got there first (ON CONFLICT DO NOTHING).
    pub async fn mark_processed(&self, event_id: &str) -> PaymentsResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (provider, event_id)
            VALUES ($1, $2)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(PROVIDER)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record an event as applied inside an open transaction.
    ///
    /// Plain INSERT on purpose: when the ledger write is part of an atomic
    /// unit (order + item + ledger), a unique violation must abort the whole
    /// transaction rather than let a duplicate order slip through.
    pub async fn mark_processed_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: &str,
    ) -> PaymentsResult<()> {
        sqlx::query("INSERT INTO processed_events (provider, event_id) VALUES ($1, $2)")
            .bind(PROVIDER)
            .bind(event_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    PaymentsError::DuplicateEvent(event_id.to_string())
                }
                _ => PaymentsError::Database(e.to_string()),
            })?;

        Ok(())
    }

    /// Fetch the ledger row for an event, if present
    pub async fn get(&self, event_id: &str) -> PaymentsResult<Option<ProcessedEvent>> {
        let record: Option<ProcessedEvent> = sqlx::query_as(
            r#"
            SELECT id, provider, event_id, processed_at
            FROM processed_events
            WHERE provider = $1 AND event_id = $2
            "#,
        )
        .bind(PROVIDER)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
