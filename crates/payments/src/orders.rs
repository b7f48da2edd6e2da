//! Order and entitlement records
//!
//! Creates orders from completed checkouts and serves purchase history.
//! An order item snapshots the product's deliverable reference at purchase
//! time, so later edits or deletion of the product never revoke access.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{PaymentsError, PaymentsResult};
use crate::events::CheckoutCompleted;
use crate::ledger::EventLedger;

/// A paid order
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub fan_user_id: Uuid,
    pub total_amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub stripe_session_id: String,
    pub created_at: OffsetDateTime,
}

impl Order {
    /// Total in major units, for display
    pub fn total_amount(&self) -> f64 {
        self.total_amount_cents as f64 / 100.0
    }
}

/// One purchased product within an order
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub kind: String,
    pub price_cents: i64,
    /// Snapshot of the product's deliverable reference at purchase time
    pub file_storage_id: String,
    pub created_at: OffsetDateTime,
}

/// An order with its items, as returned to callers
#[derive(Debug, Clone, serde::Serialize)]
pub struct Purchase {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Product fields captured into the order item at purchase time.
///
/// Built only by `fetch_product_snapshot`, so holding one means the product
/// existed and had a deliverable when the snapshot was taken.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub kind: String,
    pub price_cents: i64,
    pub file_storage_id: String,
}

/// Writes orders from checkout events and serves purchase reads
#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    ledger: EventLedger,
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        let ledger = EventLedger::new(pool.clone());
        Self { pool, ledger }
    }

    /// Create the order and entitlement for a completed checkout, exactly once.
    ///
    /// The order, its item, and the ledger row land in one transaction: either
    /// all three exist afterward, or none do. A concurrent duplicate delivery
    /// hits the ledger's unique constraint, aborts this transaction whole, and
    /// surfaces as a retryable `DuplicateEvent` — the retry finds the winner's
    /// order below and returns it.
    pub async fn record_checkout(
        &self,
        event_id: &str,
        checkout: &CheckoutCompleted,
    ) -> PaymentsResult<Uuid> {
        // Defensive re-check, independent of the dispatcher's. If the event is
        // already in the ledger there must be an order for its session;
        // anything else means entitlement bookkeeping diverged from
        // idempotency bookkeeping.
        if self.ledger.is_processed(event_id).await? {
            let existing: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM orders WHERE stripe_session_id = $1")
                    .bind(&checkout.session_id)
                    .fetch_optional(&self.pool)
                    .await?;

            return match existing {
                Some((order_id,)) => {
                    tracing::info!(
                        event_id = %event_id,
                        order_id = %order_id,
                        session_id = %checkout.session_id,
                        "Checkout event already processed, returning existing order"
                    );
                    Ok(order_id)
                }
                None => {
                    tracing::error!(
                        event_id = %event_id,
                        session_id = %checkout.session_id,
                        "RECONCILIATION NEEDED: event marked processed but no order exists \
                         for its session. The atomic-write guarantee was violated. \
                         Manual intervention required."
                    );
                    Err(PaymentsError::ConsistencyFault(format!(
                        "event {} marked processed but no order for session {}",
                        event_id, checkout.session_id
                    )))
                }
            };
        }

        // Validate the product before any write. A missing product or missing
        // deliverable is a data problem upstream; retrying won't fix it.
        let snapshot = self.fetch_product_snapshot(checkout.product_id).await?;

        let mut tx = self.pool.begin().await?;

        let order_id = self.insert_order_tx(&mut tx, checkout).await?;
        self.insert_entitlement_tx(&mut tx, order_id, checkout.product_id, &snapshot)
            .await?;
        self.ledger.mark_processed_tx(&mut tx, event_id).await?;

        tx.commit().await?;

        tracing::info!(
            event_id = %event_id,
            order_id = %order_id,
            fan_user_id = %checkout.fan_user_id,
            product_id = %checkout.product_id,
            amount_cents = checkout.amount_total,
            currency = %checkout.currency,
            "Order created from checkout"
        );

        Ok(order_id)
    }

    /// Read and validate the product fields the entitlement will snapshot
    pub async fn fetch_product_snapshot(&self, product_id: Uuid) -> PaymentsResult<ProductSnapshot> {
        let row: Option<(String, i64, Option<String>)> = sqlx::query_as(
            "SELECT kind, price_cents, file_storage_id FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        let (kind, price_cents, file_storage_id) =
            row.ok_or(PaymentsError::ProductNotFound(product_id))?;
        let file_storage_id =
            file_storage_id.ok_or(PaymentsError::MissingFileReference(product_id))?;

        Ok(ProductSnapshot {
            kind,
            price_cents,
            file_storage_id,
        })
    }

    /// Insert the order row within an open transaction
    pub async fn insert_order_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        checkout: &CheckoutCompleted,
    ) -> PaymentsResult<Uuid> {
        let (order_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO orders (fan_user_id, total_amount_cents, currency, status, stripe_session_id)
            VALUES ($1, $2, $3, 'paid', $4)
            RETURNING id
            "#,
        )
        .bind(checkout.fan_user_id)
        .bind(checkout.amount_total)
        .bind(&checkout.currency)
        .bind(&checkout.session_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(order_id)
    }

    /// Insert the entitlement row within the same transaction as its order
    pub async fn insert_entitlement_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: Uuid,
        product_id: Uuid,
        snapshot: &ProductSnapshot,
    ) -> PaymentsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, kind, price_cents, file_storage_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order_id)
        .bind(product_id)
        .bind(&snapshot.kind)
        .bind(snapshot.price_cents)
        .bind(&snapshot.file_storage_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// All purchases for a user, newest order first
    pub async fn purchases_for_user(&self, user_id: Uuid) -> PaymentsResult<Vec<Purchase>> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, fan_user_id, total_amount_cents, currency, status,
                   stripe_session_id, created_at
            FROM orders
            WHERE fan_user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items: Vec<OrderItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, kind, price_cents, file_storage_id, created_at
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut purchases: Vec<Purchase> = orders
            .into_iter()
            .map(|order| Purchase {
                order,
                items: Vec::new(),
            })
            .collect();

        for item in items {
            if let Some(purchase) = purchases.iter_mut().find(|p| p.order.id == item.order_id) {
                purchase.items.push(item);
            }
        }

        Ok(purchases)
    }

    /// A single order with its items; `NotAuthorized` unless `user_id` owns it
    pub async fn order_for_user(&self, order_id: Uuid, user_id: Uuid) -> PaymentsResult<Purchase> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, fan_user_id, total_amount_cents, currency, status,
                   stripe_session_id, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let order = order.ok_or_else(|| PaymentsError::NotFound(format!("order {}", order_id)))?;

        if order.fan_user_id != user_id {
            return Err(PaymentsError::NotAuthorized);
        }

        let items: Vec<OrderItem> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, kind, price_cents, file_storage_id, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Purchase { order, items })
    }
}
