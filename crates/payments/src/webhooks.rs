//! Stripe webhook handling
//!
//! Verifies inbound deliveries, validates them into typed events, checks the
//! idempotency ledger, and routes each event to exactly one handler.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, Webhook};
use uuid::Uuid;

use crate::client::PaymentProvider;
use crate::error::{PaymentsError, PaymentsResult};
use crate::events::{EventPayload, WebhookEvent};
use crate::ledger::EventLedger;
use crate::orders::OrderService;
use crate::payment_methods::PaymentMethodProjector;

type HmacSha256 = Hmac<Sha256>;

/// What a successful dispatch did
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The event was applied before; this delivery had no side effects
    AlreadyProcessed { event_id: String },
    OrderCreated { order_id: Uuid },
    PaymentMethodUpserted { payment_method_id: String },
    PaymentMethodRemoved { deleted: bool },
    DefaultPaymentMethodSet { rows_changed: u64 },
    /// Valid event with nothing to apply (e.g. customer update without a
    /// default payment method)
    Ignored { reason: String },
}

impl DispatchOutcome {
    pub fn already_processed(&self) -> bool {
        matches!(self, DispatchOutcome::AlreadyProcessed { .. })
    }
}

/// Receives verified processor events and routes them to handlers
#[derive(Clone)]
pub struct WebhookDispatcher {
    provider: Arc<dyn PaymentProvider>,
    webhook_secret: String,
    ledger: EventLedger,
    orders: OrderService,
    payment_methods: PaymentMethodProjector,
}

impl WebhookDispatcher {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        webhook_secret: impl Into<String>,
        pool: PgPool,
    ) -> Self {
        Self {
            provider,
            webhook_secret: webhook_secret.into(),
            ledger: EventLedger::new(pool.clone()),
            orders: OrderService::new(pool.clone()),
            payment_methods: PaymentMethodProjector::new(pool),
        }
    }

    /// Verify and parse a raw webhook delivery.
    ///
    /// Tries the SDK's construct_event first, then falls back to manual
    /// signature verification — the SDK rejects payloads rendered by newer
    /// Stripe API versions even when the signature is valid.
    pub fn verify_event(&self, payload: &str, signature: &str) -> PaymentsResult<Event> {
        match Webhook::construct_event(payload, signature, &self.webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "SDK webhook parsing failed, trying manual verification"
                );
            }
        }

        verify_with_secret(payload, signature, &self.webhook_secret)
    }

    /// Verify, validate, and dispatch a raw delivery in one step
    pub async fn ingest(&self, payload: &str, signature: &str) -> PaymentsResult<DispatchOutcome> {
        let event = self.verify_event(payload, signature)?;
        let event = WebhookEvent::from_stripe(event)?;
        self.dispatch(&event).await
    }

    /// Route a validated event to its handler, exactly once.
    ///
    /// The ledger row is written only after the handler succeeds; a handler
    /// error leaves the event unmarked so the caller's retry re-attempts the
    /// full handler. The order path writes its ledger row inside the writer's
    /// own transaction instead, and must not be marked again here.
    pub async fn dispatch(&self, event: &WebhookEvent) -> PaymentsResult<DispatchOutcome> {
        if self.ledger.is_processed(&event.id).await? {
            tracing::info!(
                event_id = %event.id,
                event_type = event.payload.kind(),
                "Duplicate webhook event, skipping"
            );
            return Ok(DispatchOutcome::AlreadyProcessed {
                event_id: event.id.clone(),
            });
        }

        tracing::info!(
            event_id = %event.id,
            event_type = event.payload.kind(),
            "Processing webhook event"
        );

        match &event.payload {
            EventPayload::CheckoutCompleted(checkout) => {
                let order_id = self.orders.record_checkout(&event.id, checkout).await?;
                Ok(DispatchOutcome::OrderCreated { order_id })
            }
            EventPayload::SetupSucceeded(setup) => {
                // The event carries only a reference; resolve the card through
                // the provider, then funnel into the same upsert as attach.
                let attach = self
                    .provider
                    .payment_method_card(&setup.payment_method_id)
                    .await?;
                let is_default = self
                    .provider
                    .is_default_payment_method(&attach.customer_id, &attach.payment_method_id)
                    .await?;
                self.payment_methods
                    .upsert_from_attach(&attach, is_default)
                    .await?;
                self.mark_handled(event).await?;
                Ok(DispatchOutcome::PaymentMethodUpserted {
                    payment_method_id: attach.payment_method_id,
                })
            }
            EventPayload::PaymentMethodAttached(attach) => {
                let is_default = self
                    .provider
                    .is_default_payment_method(&attach.customer_id, &attach.payment_method_id)
                    .await?;
                self.payment_methods
                    .upsert_from_attach(attach, is_default)
                    .await?;
                self.mark_handled(event).await?;
                Ok(DispatchOutcome::PaymentMethodUpserted {
                    payment_method_id: attach.payment_method_id.clone(),
                })
            }
            EventPayload::PaymentMethodDetached { payment_method_id } => {
                let deleted = self
                    .payment_methods
                    .remove_by_external_id(payment_method_id)
                    .await?;
                self.mark_handled(event).await?;
                Ok(DispatchOutcome::PaymentMethodRemoved { deleted })
            }
            EventPayload::CustomerUpdated(update) => {
                let outcome = match &update.default_payment_method_id {
                    Some(payment_method_id) => {
                        let rows_changed = self
                            .payment_methods
                            .set_default_by_customer(&update.customer_id, payment_method_id)
                            .await?;
                        DispatchOutcome::DefaultPaymentMethodSet { rows_changed }
                    }
                    None => DispatchOutcome::Ignored {
                        reason: "customer update carries no default payment method".to_string(),
                    },
                };
                self.mark_handled(event).await?;
                Ok(outcome)
            }
        }
    }

    async fn mark_handled(&self, event: &WebhookEvent) -> PaymentsResult<()> {
        let inserted = self.ledger.mark_processed(&event.id).await?;
        if !inserted {
            // Both handler paths are idempotent upserts/deletes, so losing
            // this race changed nothing the winner didn't also apply.
            tracing::warn!(
                event_id = %event.id,
                event_type = event.payload.kind(),
                "Concurrent delivery already recorded this event"
            );
        }
        Ok(())
    }

    /// The `isEventProcessed` read used by operators and the admin surface
    pub async fn is_event_processed(&self, event_id: &str) -> PaymentsResult<bool> {
        self.ledger.is_processed(event_id).await
    }
}

/// Manual signature verification against the raw `Stripe-Signature` header.
///
/// The header has the form `t=timestamp,v1=signature[,v0=signature]`; the
/// signed payload is `{timestamp}.{body}` under HMAC-SHA256 of the endpoint
/// secret. Deliveries older than five minutes are rejected regardless of
/// signature validity.
pub(crate) fn verify_with_secret(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
) -> PaymentsResult<Event> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;
    for part in signature.split(',') {
        match part.splitn(2, '=').collect::<Vec<_>>().as_slice() {
            ["t", value] => timestamp = value.parse().ok(),
            ["v1", value] => v1_signature = Some((*value).to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentsError::WebhookSignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(PaymentsError::WebhookSignatureInvalid)?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| PaymentsError::WebhookSignatureInvalid)?
        .as_secs() as i64;
    if (now - timestamp).abs() > 300 {
        tracing::error!(
            timestamp = timestamp,
            now = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(PaymentsError::WebhookSignatureInvalid);
    }

    let secret_key = webhook_secret.strip_prefix("whsec_").unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| PaymentsError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(PaymentsError::WebhookSignatureInvalid);
    }

    let event: Event = serde_json::from_str(payload).map_err(|e| {
        tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
        PaymentsError::WebhookSignatureInvalid
    })?;

    tracing::debug!(
        event_type = %event.type_,
        event_id = %event.id,
        "Manual webhook verification passed"
    );

    Ok(event)
}
