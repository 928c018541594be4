use crate::config::PayPalConfig;
use crate::error::ensure_success;
use crate::webhook::{first_str, parse_body, required_str};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Value};
use taskpay_core::fees::format_amount;
use taskpay_core::{
    CheckoutRequest, CheckoutSession, EventKind, PaymentConfirmation, PaymentEvent,
    PaymentProvider, PayoutDestination, PayoutReceipt, PayoutRequest, PayoutStatus, ProviderKind,
    TaskRef, WebhookHeaders,
};
use tokio::sync::Mutex;

const PROVIDER: &str = "paypal";

fn transmission_header<'a>(headers: &'a WebhookHeaders, name: &str) -> Result<&'a str> {
    headers.get(name).ok_or_else(|| {
        tracing::warn!("PayPal webhook missing header {}", name);
        Error::InvalidSignature
    })
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct PayPalProvider {
    config: PayPalConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalProvider {
    pub fn new(config: PayPalConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            token: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// OAuth client-credentials token from `/v1/oauth2/token`.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(ref token) = *cached {
            if token.expires_at > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        tracing::debug!("Requesting PayPal access token");

        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::AuthError(format!("Failed to request token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::AuthError(format!(
                "PayPal token request failed ({}): {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await?;
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds((token.expires_in - 60).max(0)),
        });

        Ok(token.access_token)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        Ok(self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?)
    }

    pub fn map_event(event_type: &str) -> EventKind {
        match event_type {
            "CHECKOUT.ORDER.APPROVED" => EventKind::PaymentAuthorized,
            "PAYMENT.CAPTURE.COMPLETED" => EventKind::PaymentSucceeded,
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => EventKind::PaymentFailed,
            "PAYMENT.CAPTURE.REFUNDED" => EventKind::PaymentRefunded,
            "PAYMENT.PAYOUTSBATCH.PROCESSING" => EventKind::PayoutProcessing,
            "PAYMENT.PAYOUTS-ITEM.SUCCEEDED" => EventKind::PayoutCompleted,
            "PAYMENT.PAYOUTS-ITEM.FAILED"
            | "PAYMENT.PAYOUTS-ITEM.DENIED"
            | "PAYMENT.PAYOUTS-ITEM.RETURNED"
            | "PAYMENT.PAYOUTS-ITEM.BLOCKED"
            | "PAYMENT.PAYOUTS-ITEM.CANCELED" => EventKind::PayoutFailed,
            _ => EventKind::Ignored,
        }
    }

    fn capture_confirmation(order: &Value) -> PaymentConfirmation {
        let capture_status = first_str(
            order,
            &["/purchase_units/0/payments/captures/0/status", "/status"],
        );

        match capture_status.as_deref() {
            Some("COMPLETED") => PaymentConfirmation::Succeeded,
            Some("DECLINED") | Some("FAILED") | Some("VOIDED") => PaymentConfirmation::Failed,
            _ => PaymentConfirmation::Pending,
        }
    }

    fn batch_status(status: &str) -> PayoutStatus {
        match status {
            "SUCCESS" => PayoutStatus::Completed,
            "DENIED" | "CANCELED" => PayoutStatus::Failed,
            _ => PayoutStatus::Processing,
        }
    }
}

#[async_trait]
impl PaymentProvider for PayPalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PayPal
    }

    fn is_sandbox(&self) -> bool {
        self.config.base_url.contains("sandbox")
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> taskpay_core::Result<CheckoutSession> {
        tracing::info!("Creating PayPal order for task {}", request.task_id);

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.task_id,
                "custom_id": request.task_id,
                "description": request.description.chars().take(127).collect::<String>(),
                "amount": {
                    "currency_code": request.currency,
                    "value": format_amount(request.amount),
                },
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let response = self.post_json("/v2/checkout/orders", &body).await?;
        let order: OrderResponse = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(Error::from)?;

        let redirect_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone());

        Ok(CheckoutSession {
            reference: order.id,
            redirect_url,
            client_secret: None,
        })
    }

    async fn confirm_payment(&self, reference: &str) -> taskpay_core::Result<PaymentConfirmation> {
        tracing::info!("Capturing PayPal order {}", reference);

        let response = self
            .post_json(&format!("/v2/checkout/orders/{}/capture", reference), &json!({}))
            .await?;

        if response.status().as_u16() == 422 {
            let body = response.text().await.map_err(Error::from)?;
            if body.contains("ORDER_ALREADY_CAPTURED") {
                tracing::info!("PayPal order {} was already captured", reference);
                return Ok(PaymentConfirmation::Succeeded);
            }
            return Err(Error::ApiError {
                provider: PROVIDER,
                status: 422,
                body,
            }
            .into());
        }

        let order: Value = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(Error::from)?;

        Ok(Self::capture_confirmation(&order))
    }

    async fn create_payout(&self, request: &PayoutRequest) -> taskpay_core::Result<PayoutReceipt> {
        let PayoutDestination::PayPalEmail(ref email) = request.destination else {
            return Err(Error::UnsupportedDestination(PROVIDER).into());
        };

        tracing::info!(
            "Creating PayPal payout of {} {} to {}",
            request.amount,
            request.currency,
            email
        );

        let body = json!({
            "sender_batch_header": {
                "sender_batch_id": request.payout_id,
                "email_subject": "You have a payout!",
                "email_message": request.note,
            },
            "items": [{
                "recipient_type": "EMAIL",
                "receiver": email,
                "note": request.note,
                "sender_item_id": request.task_id,
                "amount": {
                    "value": format_amount(request.amount),
                    "currency": request.currency,
                },
            }],
        });

        let response = self.post_json("/v1/payments/payouts", &body).await?;
        let batch: PayoutBatchResponse = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(Error::from)?;

        Ok(PayoutReceipt {
            status: Self::batch_status(&batch.batch_header.batch_status),
            reference: batch.batch_header.payout_batch_id,
        })
    }

    async fn verify_webhook(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> taskpay_core::Result<()> {
        // The event goes back to PayPal byte for byte
        let request = VerificationRequest {
            auth_algo: transmission_header(headers, "paypal-auth-algo")?,
            cert_url: transmission_header(headers, "paypal-cert-url")?,
            transmission_id: transmission_header(headers, "paypal-transmission-id")?,
            transmission_sig: transmission_header(headers, "paypal-transmission-sig")?,
            transmission_time: transmission_header(headers, "paypal-transmission-time")?,
            webhook_id: &self.config.webhook_id,
            webhook_event: serde_json::from_slice(body)
                .map_err(|e| Error::MalformedPayload(e.to_string()))?,
        };

        let response = self
            .post_json("/v1/notifications/verify-webhook-signature", &request)
            .await?;
        let verification: VerificationResponse = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(Error::from)?;

        if verification.verification_status == "SUCCESS" {
            Ok(())
        } else {
            Err(Error::InvalidSignature.into())
        }
    }

    fn parse_webhook(&self, body: &[u8]) -> taskpay_core::Result<PaymentEvent> {
        let payload = parse_body(body)?;
        let event_id = required_str(&payload, "/id")?;
        let event_type = required_str(&payload, "/event_type")?;
        let kind = Self::map_event(&event_type);

        let task_id = first_str(
            &payload,
            &[
                "/resource/custom_id",
                "/resource/purchase_units/0/custom_id",
                "/resource/payout_item/sender_item_id",
            ],
        );

        let reference = if let Some(task_id) = task_id {
            TaskRef::Task(task_id)
        } else if kind.is_payout() {
            first_str(
                &payload,
                &[
                    "/resource/batch_header/payout_batch_id",
                    "/resource/payout_batch_id",
                ],
            )
            .map(TaskRef::Payout)
            .unwrap_or(TaskRef::None)
        } else {
            first_str(
                &payload,
                &[
                    "/resource/supplementary_data/related_ids/order_id",
                    "/resource/id",
                ],
            )
            .map(TaskRef::Payment)
            .unwrap_or(TaskRef::None)
        };

        Ok(PaymentEvent {
            provider: ProviderKind::PayPal,
            event_id,
            event_type,
            reference,
            kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PayoutBatchResponse {
    batch_header: BatchHeader,
}

#[derive(Debug, Deserialize)]
struct BatchHeader {
    payout_batch_id: String,
    batch_status: String,
}

#[derive(Debug, Serialize)]
struct VerificationRequest<'a> {
    auth_algo: &'a str,
    cert_url: &'a str,
    transmission_id: &'a str,
    transmission_sig: &'a str,
    transmission_time: &'a str,
    webhook_id: &'a str,
    webhook_event: &'a RawValue,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    verification_status: String,
}
