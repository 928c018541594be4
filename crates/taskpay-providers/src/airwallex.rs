use crate::config::AirwallexConfig;
use crate::error::ensure_success;
use crate::webhook::{first_str, parse_body, required_str, verify_hex, within_tolerance};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use taskpay_core::fees::format_amount;
use taskpay_core::{
    CheckoutRequest, CheckoutSession, EventKind, PaymentConfirmation, PaymentEvent,
    PaymentProvider, PayoutDestination, PayoutReceipt, PayoutRequest, PayoutStatus, ProviderKind,
    TaskRef, WebhookHeaders,
};
use tokio::sync::Mutex;
use uuid::Uuid;

const PROVIDER: &str = "airwallex";

/// Airwallex access tokens live for 30 minutes; refresh a little early.
const TOKEN_LIFETIME_MINUTES: i64 = 25;

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct AirwallexProvider {
    config: AirwallexConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl AirwallexProvider {
    pub fn new(config: AirwallexConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Bearer token from `/authentication/login`, reused until close to expiry.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(ref token) = *cached {
            if token.expires_at > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        tracing::debug!("Requesting Airwallex access token");

        let response = self
            .client
            .post(self.url("authentication/login"))
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| Error::AuthError(format!("Failed to request token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::AuthError(format!(
                "Airwallex login failed ({}): {}",
                status, error_text
            )));
        }

        let login: LoginResponse = response.json().await?;
        *cached = Some(CachedToken {
            token: login.token.clone(),
            expires_at: Utc::now() + Duration::minutes(TOKEN_LIFETIME_MINUTES),
        });

        Ok(login.token)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &Value) -> Result<T> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        Ok(ensure_success(PROVIDER, response).await?.json().await?)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let token = self.access_token().await?;
        let response = self.client.get(self.url(path)).bearer_auth(token).send().await?;

        Ok(ensure_success(PROVIDER, response).await?.json().await?)
    }

    /// Pass beneficiary details to `/beneficiaries/validate`, returning Airwallex's verdict verbatim.
    pub async fn validate_beneficiary(&self, beneficiary: &Value) -> Result<Value> {
        tracing::info!("Validating Airwallex beneficiary");
        self.post_json("beneficiaries/validate", beneficiary).await
    }

    /// Check `x-airwallex-signature` over `x-timestamp` (milliseconds) and the raw body.
    pub fn verify_signature(&self, headers: &WebhookHeaders, body: &[u8], now: i64) -> Result<()> {
        let signature = headers
            .get("x-airwallex-signature")
            .or_else(|| headers.get("x-signature"))
            .ok_or(Error::InvalidSignature)?;
        let timestamp = headers.get("x-timestamp").ok_or(Error::InvalidSignature)?;

        let sent_at = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::InvalidSignature)?
            / 1000;
        if !within_tolerance(sent_at, now, self.config.webhook_tolerance_secs) {
            tracing::warn!("Airwallex webhook timestamp {} outside tolerance", timestamp);
            return Err(Error::InvalidSignature);
        }

        verify_hex(
            &self.config.webhook_secret,
            &[timestamp.as_bytes(), body],
            signature,
        )
    }

    pub fn map_event(name: &str) -> EventKind {
        match name {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.requires_capture" => EventKind::PaymentAuthorized,
            "payment_intent.cancelled" | "payment_attempt.failed" => EventKind::PaymentFailed,
            "refund.succeeded" | "refund.settled" => EventKind::PaymentRefunded,
            "transfer.processing" | "payout.transfer.processing" => EventKind::PayoutProcessing,
            "transfer.settled" | "payout.transfer.paid" => EventKind::PayoutCompleted,
            "transfer.failed" | "payout.transfer.failed" | "payout.transfer.cancelled" => {
                EventKind::PayoutFailed
            }
            _ => EventKind::Ignored,
        }
    }

    fn transfer_status(status: &str) -> PayoutStatus {
        match status {
            "PAID" | "SETTLED" => PayoutStatus::Completed,
            "FAILED" | "CANCELLED" => PayoutStatus::Failed,
            _ => PayoutStatus::Processing,
        }
    }
}

#[async_trait]
impl PaymentProvider for AirwallexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Airwallex
    }

    fn is_sandbox(&self) -> bool {
        self.config.base_url.contains("-demo.")
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> taskpay_core::Result<CheckoutSession> {
        tracing::info!("Creating Airwallex payment intent for task {}", request.task_id);

        let body = json!({
            "request_id": Uuid::new_v4().to_string(),
            "amount": format_amount(request.amount),
            "currency": request.currency,
            "merchant_order_id": request.task_id,
            "descriptor": request.description.chars().take(32).collect::<String>(),
            "return_url": self.config.return_url,
            "metadata": { "task_id": request.task_id },
        });

        let intent: IntentResponse = self.post_json("pa/payment_intents/create", &body).await?;

        Ok(CheckoutSession {
            reference: intent.id,
            redirect_url: None,
            client_secret: intent.client_secret,
        })
    }

    async fn confirm_payment(&self, reference: &str) -> taskpay_core::Result<PaymentConfirmation> {
        let intent: IntentResponse = self
            .get_json(&format!("pa/payment_intents/{}", reference))
            .await?;

        Ok(match intent.status.as_deref() {
            Some("SUCCEEDED") => PaymentConfirmation::Succeeded,
            Some("CANCELLED") => PaymentConfirmation::Failed,
            _ => PaymentConfirmation::Pending,
        })
    }

    async fn create_payout(&self, request: &PayoutRequest) -> taskpay_core::Result<PayoutReceipt> {
        let PayoutDestination::AirwallexBeneficiary(ref beneficiary_id) = request.destination
        else {
            return Err(Error::UnsupportedDestination(PROVIDER).into());
        };

        tracing::info!(
            "Creating Airwallex transfer of {} {} to beneficiary {}",
            request.amount,
            request.currency,
            beneficiary_id
        );

        let body = json!({
            "request_id": request.payout_id,
            "beneficiary_id": beneficiary_id,
            "source_currency": self.config.source_currency.as_deref().unwrap_or(&request.currency),
            "transfer_currency": request.currency,
            "transfer_amount": format_amount(request.amount),
            "transfer_method": "LOCAL",
            "reason": "professional_business_services",
            "reference": request.note.chars().take(140).collect::<String>(),
            "metadata": { "task_id": request.task_id, "payout_id": request.payout_id },
        });

        // Airwallex rejects stale or incomplete bank details here rather than at transfer time
        let beneficiary: Value = self
            .get_json(&format!("beneficiaries/{}", beneficiary_id))
            .await?;
        self.validate_beneficiary(&beneficiary).await?;

        let transfer: TransferResponse = self.post_json("transfers/create", &body).await?;

        Ok(PayoutReceipt {
            status: Self::transfer_status(&transfer.status),
            reference: transfer.id,
        })
    }

    async fn verify_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> taskpay_core::Result<()> {
        self.verify_signature(headers, body, Utc::now().timestamp())?;
        Ok(())
    }

    fn parse_webhook(&self, body: &[u8]) -> taskpay_core::Result<PaymentEvent> {
        let payload = parse_body(body)?;
        let event_id = required_str(&payload, "/id")?;
        let event_type = required_str(&payload, "/name")?;
        let kind = Self::map_event(&event_type);

        let task_id = first_str(
            &payload,
            &[
                "/data/object/metadata/task_id",
                "/data/object/merchant_order_id",
            ],
        );
        // Refunds and payment attempts point back at their intent
        let object_id = if kind.is_payout() {
            first_str(&payload, &["/data/object/id"])
        } else {
            first_str(
                &payload,
                &["/data/object/payment_intent_id", "/data/object/id"],
            )
        };
        let reference = match (task_id, object_id) {
            (Some(task_id), _) => TaskRef::Task(task_id),
            (None, Some(id)) if kind.is_payout() => TaskRef::Payout(id),
            (None, Some(id)) => TaskRef::Payment(id),
            (None, None) => TaskRef::None,
        };

        Ok(PaymentEvent {
            provider: ProviderKind::Airwallex,
            event_id,
            event_type,
            reference,
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
    #[serde(default)]
    status: String,
}
