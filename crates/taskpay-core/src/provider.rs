use crate::events::PaymentEvent;
use crate::model::{PayoutDestination, PayoutStatus, ProviderKind};
use crate::{Error, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub task_id: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Vendor id used to match later webhooks back to the task.
    pub reference: String,
    pub redirect_url: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentConfirmation {
    Succeeded,
    Pending,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub task_id: String,
    pub payout_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub destination: PayoutDestination,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub reference: String,
    pub status: PayoutStatus,
}

/// Inbound webhook headers with lowercased names.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders(BTreeMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// One payment vendor. The engine only ever talks to vendors through this.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// True when talking to a vendor sandbox rather than live money.
    fn is_sandbox(&self) -> bool;

    /// Start a hosted checkout for a task.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Settle or look up a payment started by [`create_checkout`](Self::create_checkout).
    async fn confirm_payment(&self, reference: &str) -> Result<PaymentConfirmation>;

    /// Send the helper's share to their destination.
    async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutReceipt>;

    /// Check a webhook's signature against the raw body.
    async fn verify_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<()>;

    /// Translate a verified webhook body into a [`PaymentEvent`].
    fn parse_webhook(&self, body: &[u8]) -> Result<PaymentEvent>;
}

/// The configured vendors, with one of them selected for new payments.
///
/// Webhooks are routed by kind, so a provider that is configured but not
/// active still reconciles payments it started earlier.
#[derive(Clone)]
pub struct ProviderRegistry {
    active: ProviderKind,
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new(active: ProviderKind) -> Self {
        Self {
            active,
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn active_kind(&self) -> ProviderKind {
        self.active
    }

    pub fn active(&self) -> Result<Arc<dyn PaymentProvider>> {
        self.get(self.active)
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::ProviderNotConfigured(kind.to_string()))
    }

    pub fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }
}
