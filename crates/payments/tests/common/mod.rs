// Test support - expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use encore_payments::{
    CardSummary, CheckoutCompleted, EventPayload, PaymentMethodAttach, PaymentProvider,
    PaymentsError, PaymentsResult, WebhookDispatcher, WebhookEvent,
};

/// Provider stub: serves canned card metadata and a configurable default flag
pub struct StubProvider {
    pub attach: Option<PaymentMethodAttach>,
    pub default_payment_method_id: Option<String>,
}

impl StubProvider {
    pub fn empty() -> Self {
        Self {
            attach: None,
            default_payment_method_id: None,
        }
    }

    pub fn with_attach(attach: PaymentMethodAttach) -> Self {
        Self {
            attach: Some(attach),
            default_payment_method_id: None,
        }
    }
}

#[async_trait]
impl PaymentProvider for StubProvider {
    async fn payment_method_card(
        &self,
        payment_method_id: &str,
    ) -> PaymentsResult<PaymentMethodAttach> {
        self.attach
            .clone()
            .filter(|a| a.payment_method_id == payment_method_id)
            .ok_or_else(|| {
                PaymentsError::StripeApi(format!("no such payment method: {}", payment_method_id))
            })
    }

    async fn is_default_payment_method(
        &self,
        _customer_id: &str,
        payment_method_id: &str,
    ) -> PaymentsResult<bool> {
        Ok(self.default_payment_method_id.as_deref() == Some(payment_method_id))
    }
}

pub fn dispatcher(provider: StubProvider, pool: PgPool) -> WebhookDispatcher {
    WebhookDispatcher::new(Arc::new(provider), "whsec_test", pool)
}

pub async fn seed_user(pool: &PgPool, email: &str, customer_id: Option<&str>) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (email, display_name, role, stripe_customer_id)
        VALUES ($1, $2, 'fan', $3)
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(email.split('@').next().unwrap())
    .bind(customer_id)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

pub async fn seed_product(pool: &PgPool, artist_id: Uuid, file: Option<&str>) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO products (artist_id, title, kind, price_cents, file_storage_id)
        VALUES ($1, 'Live Set', 'track', 999, $2)
        RETURNING id
        "#,
    )
    .bind(artist_id)
    .bind(file)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

pub fn checkout_event(
    event_id: &str,
    session_id: &str,
    fan_user_id: Uuid,
    product_id: Uuid,
    amount_total: i64,
) -> WebhookEvent {
    WebhookEvent {
        id: event_id.to_string(),
        payload: EventPayload::CheckoutCompleted(CheckoutCompleted {
            session_id: session_id.to_string(),
            fan_user_id,
            product_id,
            amount_total,
            currency: "usd".to_string(),
        }),
    }
}

pub fn attach_payload(payment_method_id: &str, customer_id: &str) -> PaymentMethodAttach {
    PaymentMethodAttach {
        payment_method_id: payment_method_id.to_string(),
        customer_id: customer_id.to_string(),
        card: CardSummary {
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
        },
        billing_name: Some("Alex Fan".to_string()),
        billing_email: Some("alex@example.com".to_string()),
    }
}

pub fn attach_event(event_id: &str, attach: PaymentMethodAttach) -> WebhookEvent {
    WebhookEvent {
        id: event_id.to_string(),
        payload: EventPayload::PaymentMethodAttached(attach),
    }
}

pub fn detach_event(event_id: &str, payment_method_id: &str) -> WebhookEvent {
    WebhookEvent {
        id: event_id.to_string(),
        payload: EventPayload::PaymentMethodDetached {
            payment_method_id: payment_method_id.to_string(),
        },
    }
}

pub async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
