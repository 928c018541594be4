use crate::config::EmailConfig;
use crate::error::ensure_success;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use taskpay_core::fees::format_amount;
use taskpay_core::{Notifier, PaymentStore, Payout, Task};

const PROVIDER: &str = "email";

#[derive(Debug, Serialize)]
struct EmailMessage<'a> {
    from: &'a str,
    to: Vec<String>,
    subject: String,
    html: String,
}

/// Sends payment and payout notices through a transactional email API.
pub struct EmailNotifier {
    config: EmailConfig,
    client: Client,
    store: Arc<dyn PaymentStore>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, store: Arc<dyn PaymentStore>) -> Self {
        Self {
            config,
            client: Client::new(),
            store,
        }
    }

    async fn email_for(&self, profile_id: &str) -> Result<Option<String>> {
        let profile = self.store.get_profile(profile_id).await?;
        Ok(profile.and_then(|p| p.email).filter(|e| !e.is_empty()))
    }

    async fn send(&self, to: String, subject: String, html: String) -> Result<()> {
        let message = EmailMessage {
            from: &self.config.from,
            to: vec![to],
            subject,
            html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&message)
            .send()
            .await?;

        ensure_success(PROVIDER, response).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn payment_received(&self, task: &Task) -> taskpay_core::Result<()> {
        let Some(helper_id) = task.helper_id.as_deref() else {
            return Ok(());
        };
        let Some(to) = self.email_for(helper_id).await? else {
            tracing::debug!("Helper {} has no email, skipping payment notice", helper_id);
            return Ok(());
        };

        tracing::info!("Sending payment notice for task {} to {}", task.id, to);

        self.send(
            to,
            format!("Payment received for \"{}\"", task.title),
            format!(
                "<p>The tasker has paid {} {} for <strong>{}</strong>. You can start work.</p>",
                format_amount(task.price),
                task.currency,
                task.title
            ),
        )
        .await
        .map_err(Into::into)
    }

    async fn payout_sent(&self, task: &Task, payout: &Payout) -> taskpay_core::Result<()> {
        let Some(to) = self.email_for(&payout.helper_id).await? else {
            tracing::debug!(
                "Helper {} has no email, skipping payout notice",
                payout.helper_id
            );
            return Ok(());
        };

        tracing::info!("Sending payout notice for task {} to {}", task.id, to);

        self.send(
            to,
            format!("You've been paid for \"{}\"", task.title),
            format!(
                "<p>{} {} is on its way to you for <strong>{}</strong> \
                 (task price {} less {} platform fee).</p>",
                format_amount(payout.net_amount),
                payout.currency,
                task.title,
                format_amount(payout.gross_amount),
                format_amount(payout.platform_fee)
            ),
        )
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use taskpay_core::{FeeSchedule, InMemoryStore, Profile, ProviderKind};

    fn config(base_url: &str) -> EmailConfig {
        EmailConfig {
            api_key: "re_test".to_string(),
            from: "TaskPay <payments@example.com>".to_string(),
            base_url: base_url.to_string(),
        }
    }

    async fn store_with_helper(email: Option<&str>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let mut helper = Profile::new("helper-1".to_string(), "Helper".to_string());
        helper.email = email.map(str::to_string);
        store.save_profile(&helper).await.unwrap();
        store
    }

    fn task() -> Task {
        Task::new(
            "Fix fence".to_string(),
            "tasker-1".to_string(),
            dec!(80),
            "AUD".to_string(),
        )
        .assign("helper-1".to_string())
    }

    #[tokio::test]
    async fn test_payout_notice_sent_to_helper() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "to": ["helper@example.com"],
            })))
            .with_status(200)
            .with_body(r#"{"id":"email-1"}"#)
            .create_async()
            .await;

        let store = store_with_helper(Some("helper@example.com")).await;
        let notifier = EmailNotifier::new(config(&server.url()), store);

        let task = task();
        let split = FeeSchedule::default().split(task.price).unwrap();
        let payout = Payout::new(&task, "helper-1".to_string(), ProviderKind::Stripe, &split);

        notifier.payout_sent(&task, &payout).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_email_is_skipped() {
        let server = mockito::Server::new_async().await;
        let store = store_with_helper(None).await;
        let notifier = EmailNotifier::new(config(&server.url()), store);

        notifier.payment_received(&task()).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body(r#"{"message":"invalid from"}"#)
            .create_async()
            .await;

        let store = store_with_helper(Some("helper@example.com")).await;
        let notifier = EmailNotifier::new(config(&server.url()), store);

        let result = notifier.payment_received(&task()).await;
        assert!(matches!(
            result,
            Err(taskpay_core::Error::ProviderApi { status: 422, .. })
        ));
    }
}
