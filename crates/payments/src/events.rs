//! Webhook event envelope
//!
//! Converts raw Stripe events into a validated tagged union at the dispatcher
//! boundary. Handlers downstream never re-check payload shape: if a
//! `WebhookEvent` exists, its fields already parsed.

use std::collections::HashMap;

use stripe::{EventObject, EventType};
use uuid::Uuid;

use crate::error::{PaymentsError, PaymentsResult};

/// A verified, validated webhook event ready for dispatch
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// External event id (`evt_...`), the idempotency key
    pub id: String,
    pub payload: EventPayload,
}

/// Type-specific payload, keyed by the external event type
#[derive(Debug, Clone)]
pub enum EventPayload {
    CheckoutCompleted(CheckoutCompleted),
    /// Carries only the payment-method reference; card metadata is resolved
    /// through the provider before the upsert.
    SetupSucceeded(SetupSucceeded),
    PaymentMethodAttached(PaymentMethodAttach),
    PaymentMethodDetached { payment_method_id: String },
    CustomerUpdated(CustomerUpdate),
}

impl EventPayload {
    /// External event type name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::CheckoutCompleted(_) => "checkout.session.completed",
            EventPayload::SetupSucceeded(_) => "setup_intent.succeeded",
            EventPayload::PaymentMethodAttached(_) => "payment_method.attached",
            EventPayload::PaymentMethodDetached { .. } => "payment_method.detached",
            EventPayload::CustomerUpdated(_) => "customer.updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub fan_user_id: Uuid,
    pub product_id: Uuid,
    /// Integer minor units, as delivered by the processor
    pub amount_total: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct SetupSucceeded {
    pub payment_method_id: String,
}

#[derive(Debug, Clone)]
pub struct PaymentMethodAttach {
    pub payment_method_id: String,
    pub customer_id: String,
    pub card: CardSummary,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CardSummary {
    pub brand: String,
    pub last4: String,
    pub exp_month: i32,
    pub exp_year: i32,
}

#[derive(Debug, Clone)]
pub struct CustomerUpdate {
    pub customer_id: String,
    pub default_payment_method_id: Option<String>,
}

/// Event types this pipeline handles
pub fn is_supported(event_type: &EventType) -> bool {
    matches!(
        event_type,
        EventType::CheckoutSessionCompleted
            | EventType::SetupIntentSucceeded
            | EventType::PaymentMethodAttached
            | EventType::PaymentMethodDetached
            | EventType::CustomerUpdated
    )
}

impl WebhookEvent {
    /// Validate a verified Stripe event into the typed envelope.
    ///
    /// Unknown event types are an explicit error so operators can detect
    /// schema drift; they are never silently dropped.
    pub fn from_stripe(event: stripe::Event) -> PaymentsResult<Self> {
        let id = event.id.to_string();

        let payload = match (event.type_, event.data.object) {
            (EventType::CheckoutSessionCompleted, EventObject::CheckoutSession(session)) => {
                EventPayload::CheckoutCompleted(parse_checkout(
                    session.id.as_str(),
                    session.metadata.as_ref(),
                    session.amount_total,
                    session.currency.map(|c| c.to_string()),
                )?)
            }
            (EventType::SetupIntentSucceeded, EventObject::SetupIntent(intent)) => {
                let payment_method_id = match &intent.payment_method {
                    Some(stripe::Expandable::Id(id)) => id.to_string(),
                    Some(stripe::Expandable::Object(pm)) => pm.id.to_string(),
                    None => {
                        return Err(PaymentsError::MissingMetadata(format!(
                            "setup intent {} has no payment method",
                            intent.id
                        )))
                    }
                };
                EventPayload::SetupSucceeded(SetupSucceeded { payment_method_id })
            }
            (EventType::PaymentMethodAttached, EventObject::PaymentMethod(pm)) => {
                EventPayload::PaymentMethodAttached(PaymentMethodAttach::from_payment_method(&pm)?)
            }
            (EventType::PaymentMethodDetached, EventObject::PaymentMethod(pm)) => {
                EventPayload::PaymentMethodDetached {
                    payment_method_id: pm.id.to_string(),
                }
            }
            (EventType::CustomerUpdated, EventObject::Customer(customer)) => {
                let default_payment_method_id = customer
                    .invoice_settings
                    .as_ref()
                    .and_then(|s| s.default_payment_method.as_ref())
                    .map(|pm| match pm {
                        stripe::Expandable::Id(id) => id.to_string(),
                        stripe::Expandable::Object(obj) => obj.id.to_string(),
                    });
                EventPayload::CustomerUpdated(CustomerUpdate {
                    customer_id: customer.id.to_string(),
                    default_payment_method_id,
                })
            }
            (event_type, _) => {
                return Err(PaymentsError::UnsupportedEvent(event_type.to_string()));
            }
        };

        Ok(Self { id, payload })
    }
}

impl PaymentMethodAttach {
    /// Build the attach payload from a full payment-method object.
    ///
    /// Used for both `payment_method.attached` payloads and provider lookups,
    /// so the two overlapping event shapes funnel into identical data.
    pub fn from_payment_method(pm: &stripe::PaymentMethod) -> PaymentsResult<Self> {
        let customer_id = match &pm.customer {
            Some(stripe::Expandable::Id(id)) => id.to_string(),
            Some(stripe::Expandable::Object(c)) => c.id.to_string(),
            None => {
                return Err(PaymentsError::InvalidInput(format!(
                    "Payment method {} is not attached to a customer",
                    pm.id
                )))
            }
        };

        let card = pm.card.as_ref().ok_or_else(|| {
            PaymentsError::InvalidInput(format!("Payment method {} has no card details", pm.id))
        })?;

        Ok(Self {
            payment_method_id: pm.id.to_string(),
            customer_id,
            card: CardSummary {
                brand: card.brand.clone(),
                last4: card.last4.clone(),
                exp_month: card.exp_month as i32,
                exp_year: card.exp_year as i32,
            },
            billing_name: pm.billing_details.name.clone(),
            billing_email: pm.billing_details.email.clone(),
        })
    }
}

/// Validate checkout-session fields into a `CheckoutCompleted`.
///
/// All metadata requirements live here: a session without `fan_user_id` and
/// `product_id` metadata cannot be fulfilled and must fail loudly before any
/// handler runs.
fn parse_checkout(
    session_id: &str,
    metadata: Option<&HashMap<String, String>>,
    amount_total: Option<i64>,
    currency: Option<String>,
) -> PaymentsResult<CheckoutCompleted> {
    let metadata = metadata.ok_or_else(|| {
        PaymentsError::MissingMetadata(format!("checkout session {} has no metadata", session_id))
    })?;

    let fan_user_id = metadata
        .get("fan_user_id")
        .ok_or_else(|| PaymentsError::MissingMetadata("fan_user_id".to_string()))?;
    let fan_user_id = Uuid::parse_str(fan_user_id)
        .map_err(|e| PaymentsError::InvalidInput(format!("Invalid fan_user_id: {}", e)))?;

    let product_id = metadata
        .get("product_id")
        .ok_or_else(|| PaymentsError::MissingMetadata("product_id".to_string()))?;
    let product_id = Uuid::parse_str(product_id)
        .map_err(|e| PaymentsError::InvalidInput(format!("Invalid product_id: {}", e)))?;

    let amount_total = amount_total.ok_or_else(|| {
        PaymentsError::MissingMetadata(format!("checkout session {} has no total", session_id))
    })?;

    let currency = currency.ok_or_else(|| {
        PaymentsError::MissingMetadata(format!("checkout session {} has no currency", session_id))
    })?;

    Ok(CheckoutCompleted {
        session_id: session_id.to_string(),
        fan_user_id,
        product_id,
        amount_total,
        currency,
    })
}
