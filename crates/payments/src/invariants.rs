//! Payments invariants
//!
//! Runnable consistency checks for the webhook pipeline's persisted state.
//! Safe to run after any mutation or webhook replay: checks only read.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::PaymentsResult;

/// A single invariant violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Rows affected, by id
    pub record_ids: Vec<Uuid>,
    /// Human-readable description
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Entitlements or money are wrong
    Critical,
    /// Data inconsistency that needs attention
    High,
    /// Potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of a full invariant run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MultipleDefaultsRow {
    stripe_customer_id: String,
    default_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct OrphanOrderRow {
    order_id: Uuid,
    stripe_session_id: String,
}

#[derive(Debug, sqlx::FromRow)]
struct BlankSnapshotRow {
    item_id: Uuid,
    order_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerMismatchRow {
    payment_method_id: Uuid,
    stripe_customer_id: String,
}

/// Runs the pipeline's consistency checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run every check and return a summary
    pub async fn run_all_checks(&self) -> PaymentsResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_default_per_customer().await?);
        violations.extend(self.check_orders_have_items().await?);
        violations.extend(self.check_item_snapshots_nonblank().await?);
        violations.extend(self.check_customer_user_mapping().await?);

        let checks_run = 4;
        let checks_failed = violations.len();

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// At most one default payment method per external customer
    async fn check_single_default_per_customer(&self) -> PaymentsResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleDefaultsRow> = sqlx::query_as(
            r#"
            SELECT stripe_customer_id, COUNT(*) AS default_count
            FROM payment_methods
            WHERE is_default = TRUE
            GROUP BY stripe_customer_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_default_per_customer".to_string(),
                record_ids: vec![],
                description: format!(
                    "Customer {} has {} default payment methods",
                    row.stripe_customer_id, row.default_count
                ),
                context: serde_json::json!({
                    "stripe_customer_id": row.stripe_customer_id,
                    "default_count": row.default_count,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Every paid order carries at least one entitlement
    async fn check_orders_have_items(&self) -> PaymentsResult<Vec<InvariantViolation>> {
        let rows: Vec<OrphanOrderRow> = sqlx::query_as(
            r#"
            SELECT o.id AS order_id, o.stripe_session_id
            FROM orders o
            LEFT JOIN order_items oi ON oi.order_id = o.id
            WHERE oi.id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "order_has_entitlement".to_string(),
                record_ids: vec![row.order_id],
                description: format!(
                    "Order {} (session {}) has no items; the fan paid and owns nothing",
                    row.order_id, row.stripe_session_id
                ),
                context: serde_json::json!({
                    "order_id": row.order_id,
                    "stripe_session_id": row.stripe_session_id,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Entitlement snapshots must reference a deliverable
    async fn check_item_snapshots_nonblank(&self) -> PaymentsResult<Vec<InvariantViolation>> {
        let rows: Vec<BlankSnapshotRow> = sqlx::query_as(
            r#"
            SELECT id AS item_id, order_id
            FROM order_items
            WHERE file_storage_id = ''
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "entitlement_snapshot_nonblank".to_string(),
                record_ids: vec![row.item_id],
                description: format!(
                    "Order item {} snapshots an empty file reference",
                    row.item_id
                ),
                context: serde_json::json!({
                    "item_id": row.item_id,
                    "order_id": row.order_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Payment-method rows must agree with their user's customer mapping
    async fn check_customer_user_mapping(&self) -> PaymentsResult<Vec<InvariantViolation>> {
        let rows: Vec<CustomerMismatchRow> = sqlx::query_as(
            r#"
            SELECT pm.id AS payment_method_id, pm.stripe_customer_id
            FROM payment_methods pm
            JOIN users u ON u.id = pm.user_id
            WHERE u.stripe_customer_id IS DISTINCT FROM pm.stripe_customer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "payment_method_customer_mapping".to_string(),
                record_ids: vec![row.payment_method_id],
                description: format!(
                    "Payment method {} is filed under customer {} but its user maps elsewhere",
                    row.payment_method_id, row.stripe_customer_id
                ),
                context: serde_json::json!({
                    "payment_method_id": row.payment_method_id,
                    "stripe_customer_id": row.stripe_customer_id,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }
}
