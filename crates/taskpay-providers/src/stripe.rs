use crate::config::StripeConfig;
use crate::error::ensure_success;
use crate::webhook::{first_str, parse_body, required_str, verify_hex, within_tolerance};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use taskpay_core::fees::to_minor_units;
use taskpay_core::{
    CheckoutRequest, CheckoutSession, EventKind, PaymentConfirmation, PaymentEvent,
    PaymentProvider, PayoutDestination, PayoutReceipt, PayoutRequest, PayoutStatus, ProviderKind,
    TaskRef, WebhookHeaders,
};
use uuid::Uuid;

const PROVIDER: &str = "stripe";
const SIGNATURE_HEADER: &str = "stripe-signature";

/// Fresh per attempt, so a retry after a failed or expired session opens a new one.
fn checkout_idempotency_key(task_id: &str) -> String {
    format!("checkout-{}-{}", task_id, Uuid::new_v4())
}

pub struct StripeProvider {
    config: StripeConfig,
    client: Client,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = ensure_success(PROVIDER, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Check a `stripe-signature` header (`t=…,v1=…`) against the raw body.
    pub fn verify_signature(&self, header: &str, body: &[u8], now: i64) -> Result<()> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for item in header.split(',') {
            match item.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(Error::InvalidSignature)?;
        if !within_tolerance(timestamp, now, self.config.webhook_tolerance_secs) {
            tracing::warn!("Stripe webhook timestamp {} outside tolerance", timestamp);
            return Err(Error::InvalidSignature);
        }

        let signed_prefix = format!("{}.", timestamp);
        let valid = signatures.iter().any(|sig| {
            verify_hex(
                &self.config.webhook_secret,
                &[signed_prefix.as_bytes(), body],
                sig,
            )
            .is_ok()
        });

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }

    pub fn map_event(event_type: &str) -> EventKind {
        match event_type {
            "checkout.session.completed" | "payment_intent.succeeded" => {
                EventKind::PaymentSucceeded
            }
            "payment_intent.payment_failed" | "checkout.session.expired" => {
                EventKind::PaymentFailed
            }
            "charge.refunded" => EventKind::PaymentRefunded,
            "transfer.created" => EventKind::PayoutProcessing,
            "transfer.paid" | "payout.paid" => EventKind::PayoutCompleted,
            "transfer.failed" | "transfer.reversed" | "payout.failed" => EventKind::PayoutFailed,
            _ => EventKind::Ignored,
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn is_sandbox(&self) -> bool {
        self.config.secret_key.starts_with("sk_test_")
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> taskpay_core::Result<CheckoutSession> {
        tracing::info!("Creating Stripe checkout session for task {}", request.task_id);

        let unit_amount = to_minor_units(request.amount)?;
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
            ("client_reference_id".to_string(), request.task_id.clone()),
            ("metadata[task_id]".to_string(), request.task_id.clone()),
            (
                "payment_intent_data[metadata][task_id]".to_string(),
                request.task_id.clone(),
            ),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                unit_amount.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        if let Some(ref email) = request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        let session: SessionResponse = self
            .post_form(
                "checkout/sessions",
                &form,
                Some(&checkout_idempotency_key(&request.task_id)),
            )
            .await?;

        Ok(CheckoutSession {
            reference: session.id,
            redirect_url: session.url,
            client_secret: None,
        })
    }

    async fn confirm_payment(&self, reference: &str) -> taskpay_core::Result<PaymentConfirmation> {
        let response = self
            .client
            .get(self.url(&format!("checkout/sessions/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(Error::from)?;
        let session: SessionResponse = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(Error::from)?;

        Ok(match (session.payment_status.as_deref(), session.status.as_deref()) {
            (Some("paid"), _) | (Some("no_payment_required"), _) => PaymentConfirmation::Succeeded,
            (_, Some("expired")) => PaymentConfirmation::Failed,
            _ => PaymentConfirmation::Pending,
        })
    }

    async fn create_payout(&self, request: &PayoutRequest) -> taskpay_core::Result<PayoutReceipt> {
        let PayoutDestination::StripeAccount(ref account) = request.destination else {
            return Err(Error::UnsupportedDestination(PROVIDER).into());
        };

        tracing::info!(
            "Creating Stripe transfer of {} {} to {}",
            request.amount,
            request.currency,
            account
        );

        let form = vec![
            ("amount".to_string(), to_minor_units(request.amount)?.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("destination".to_string(), account.clone()),
            ("transfer_group".to_string(), request.task_id.clone()),
            ("description".to_string(), request.note.clone()),
            ("metadata[task_id]".to_string(), request.task_id.clone()),
            ("metadata[payout_id]".to_string(), request.payout_id.clone()),
        ];

        let transfer: TransferResponse = self
            .post_form("transfers", &form, Some(&request.payout_id))
            .await?;

        // Transfers land in the connected account's balance immediately.
        let status = if transfer.reversed {
            PayoutStatus::Failed
        } else {
            PayoutStatus::Completed
        };

        Ok(PayoutReceipt {
            reference: transfer.id,
            status,
        })
    }

    async fn verify_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> taskpay_core::Result<()> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or(Error::InvalidSignature)?;
        self.verify_signature(header, body, chrono::Utc::now().timestamp())?;
        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> taskpay_core::Result<PaymentEvent> {
        let payload = parse_body(body)?;
        let event_id = required_str(&payload, "/id")?;
        let event_type = required_str(&payload, "/type")?;
        let kind = Self::map_event(&event_type);

        let reference = match first_str(
            &payload,
            &[
                "/data/object/metadata/task_id",
                "/data/object/client_reference_id",
            ],
        ) {
            Some(task_id) => TaskRef::Task(task_id),
            None => match first_str(&payload, &["/data/object/id"]) {
                Some(id) if kind.is_payout() => TaskRef::Payout(id),
                Some(id) => TaskRef::Payment(id),
                None => TaskRef::None,
            },
        };

        Ok(PaymentEvent {
            provider: ProviderKind::Stripe,
            event_id,
            event_type,
            reference,
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
    #[serde(default)]
    reversed: bool,
}
