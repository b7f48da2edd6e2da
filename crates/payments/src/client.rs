//! Stripe client wrapper and provider abstraction

use async_trait::async_trait;

use crate::error::{PaymentsError, PaymentsResult};
use crate::events::PaymentMethodAttach;

/// Stripe configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Requires `STRIPE_SECRET_KEY` and `STRIPE_WEBHOOK_SECRET`.
    pub fn from_env() -> PaymentsResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentsError::Internal("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentsError::Internal("STRIPE_WEBHOOK_SECRET not set".to_string()))?;

        Ok(Self {
            secret_key,
            webhook_secret,
        })
    }
}

/// Wrapper around the Stripe SDK client.
///
/// Constructed once and injected into the dispatcher, never reached for as a
/// global, so tests can substitute a stub via the `PaymentProvider` trait.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self { client, config }
    }

    pub fn from_env() -> PaymentsResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// Access the underlying SDK client
    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

/// The two lookups the webhook pipeline makes against the payment processor.
///
/// Read-model queries from user-facing code never go through here — they only
/// read local tables. This seam exists solely so the dispatcher can resolve
/// card metadata for setup-succeeded events (which carry only a payment-method
/// id) and the customer's current default flag at attach time.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Fetch full card metadata for a payment method by external id.
    async fn payment_method_card(&self, payment_method_id: &str)
        -> PaymentsResult<PaymentMethodAttach>;

    /// Whether the given payment method is the customer's current default.
    async fn is_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> PaymentsResult<bool>;
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn payment_method_card(
        &self,
        payment_method_id: &str,
    ) -> PaymentsResult<PaymentMethodAttach> {
        let pm_id = payment_method_id
            .parse::<stripe::PaymentMethodId>()
            .map_err(|e| {
                PaymentsError::InvalidInput(format!("Invalid payment method id: {}", e))
            })?;

        let pm = stripe::PaymentMethod::retrieve(&self.client, &pm_id, &[]).await?;

        PaymentMethodAttach::from_payment_method(&pm)
    }

    async fn is_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> PaymentsResult<bool> {
        let cus_id = customer_id
            .parse::<stripe::CustomerId>()
            .map_err(|e| PaymentsError::InvalidInput(format!("Invalid customer id: {}", e)))?;

        let customer = stripe::Customer::retrieve(&self.client, &cus_id, &[]).await?;

        let default_pm = customer
            .invoice_settings
            .as_ref()
            .and_then(|s| s.default_payment_method.as_ref())
            .map(|pm| match pm {
                stripe::Expandable::Id(id) => id.to_string(),
                stripe::Expandable::Object(obj) => obj.id.to_string(),
            });

        Ok(default_pm.as_deref() == Some(payment_method_id))
    }
}
