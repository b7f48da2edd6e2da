//! Payment-method read model
//!
//! Local mirror of a customer's saved card instruments, written only by the
//! webhook dispatcher. User-facing reads come from this table alone and never
//! call the payment processor, so the read path stays deterministic and free
//! of external latency.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{PaymentsError, PaymentsResult};
use crate::events::PaymentMethodAttach;

/// A saved payment method, as mirrored locally
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_payment_method_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: i32,
    pub exp_year: i32,
    pub is_default: bool,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Maintains the payment-method read model from the webhook stream
#[derive(Clone)]
pub struct PaymentMethodProjector {
    pool: PgPool,
}

impl PaymentMethodProjector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply an attach-shaped event (setup succeeded or payment-method
    /// attached — both carry overlapping information and funnel here).
    ///
    /// Upserts by external payment-method id, so double delivery of the two
    /// event types cannot produce duplicate rows. `is_default` is the value
    /// the dispatcher freshly queried from the processor at event time.
    pub async fn upsert_from_attach(
        &self,
        attach: &PaymentMethodAttach,
        is_default: bool,
    ) -> PaymentsResult<Uuid> {
        let user_id = self.resolve_user(&attach.customer_id).await?;

        let mut tx = self.pool.begin().await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO payment_methods (
                user_id, stripe_customer_id, stripe_payment_method_id,
                brand, last4, exp_month, exp_year, is_default,
                billing_name, billing_email
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (stripe_payment_method_id) DO UPDATE SET
                brand = EXCLUDED.brand,
                last4 = EXCLUDED.last4,
                exp_month = EXCLUDED.exp_month,
                exp_year = EXCLUDED.exp_year,
                is_default = EXCLUDED.is_default,
                billing_name = EXCLUDED.billing_name,
                billing_email = EXCLUDED.billing_email,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&attach.customer_id)
        .bind(&attach.payment_method_id)
        .bind(&attach.card.brand)
        .bind(&attach.card.last4)
        .bind(attach.card.exp_month)
        .bind(attach.card.exp_year)
        .bind(is_default)
        .bind(&attach.billing_name)
        .bind(&attach.billing_email)
        .fetch_one(&mut *tx)
        .await?;

        // A newly-attached default displaces any previous one.
        if is_default {
            sqlx::query(
                r#"
                UPDATE payment_methods
                SET is_default = FALSE, updated_at = NOW()
                WHERE stripe_customer_id = $1
                  AND stripe_payment_method_id != $2
                  AND is_default = TRUE
                "#,
            )
            .bind(&attach.customer_id)
            .bind(&attach.payment_method_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            payment_method_id = %attach.payment_method_id,
            brand = %attach.card.brand,
            last4 = %attach.card.last4,
            is_default = is_default,
            "Payment method upserted"
        );

        Ok(id)
    }

    /// Remove a payment method by external id.
    ///
    /// Returns whether a row was actually removed. Removing an already-absent
    /// row is not an error — detach events may be delivered more than once.
    pub async fn remove_by_external_id(&self, payment_method_id: &str) -> PaymentsResult<bool> {
        let result = sqlx::query("DELETE FROM payment_methods WHERE stripe_payment_method_id = $1")
            .bind(payment_method_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        tracing::info!(
            payment_method_id = %payment_method_id,
            deleted = deleted,
            "Payment method detach applied"
        );

        Ok(deleted)
    }

    /// Make `payment_method_id` the single default for a customer.
    ///
    /// Both updates carry an `is_default` predicate, so rows whose value would
    /// not change are never written. Returns the number of rows touched.
    pub async fn set_default_by_customer(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> PaymentsResult<u64> {
        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query(
            r#"
            UPDATE payment_methods
            SET is_default = FALSE, updated_at = NOW()
            WHERE stripe_customer_id = $1
              AND stripe_payment_method_id != $2
              AND is_default = TRUE
            "#,
        )
        .bind(customer_id)
        .bind(payment_method_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let set = sqlx::query(
            r#"
            UPDATE payment_methods
            SET is_default = TRUE, updated_at = NOW()
            WHERE stripe_customer_id = $1
              AND stripe_payment_method_id = $2
              AND is_default = FALSE
            "#,
        )
        .bind(customer_id)
        .bind(payment_method_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::info!(
            customer_id = %customer_id,
            payment_method_id = %payment_method_id,
            rows_changed = cleared + set,
            "Default payment method updated"
        );

        Ok(cleared + set)
    }

    /// All saved methods for a user: default first, then newest first.
    ///
    /// This two-key ordering is the only sort rule callers rely on.
    pub async fn list_for_user(&self, user_id: Uuid) -> PaymentsResult<Vec<PaymentMethod>> {
        let methods: Vec<PaymentMethod> = sqlx::query_as(
            r#"
            SELECT id, user_id, stripe_customer_id, stripe_payment_method_id,
                   brand, last4, exp_month, exp_year, is_default,
                   billing_name, billing_email, created_at, updated_at
            FROM payment_methods
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    /// Map an external customer id to the internal user.
    ///
    /// An unknown customer is a fatal input error: the event references a
    /// customer this platform never created, and redelivery won't change that.
    async fn resolve_user(&self, customer_id: &str) -> PaymentsResult<Uuid> {
        let result: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        result
            .map(|(id,)| id)
            .ok_or_else(|| PaymentsError::CustomerNotFound(customer_id.to_string()))
    }
}
