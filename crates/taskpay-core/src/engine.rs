use crate::events::{reconcile, next_payout_status, EventKind, PaymentEvent, TaskRef};
use crate::fees::{FeeSchedule, FeeSplit};
use crate::model::{PaymentStatus, Payout, PayoutStatus, ProviderKind, Task, TaskState};
use crate::notify::{NoopNotifier, Notifier};
use crate::provider::{
    CheckoutRequest, CheckoutSession, PaymentConfirmation, PaymentProvider, PayoutRequest,
    ProviderRegistry, WebhookHeaders,
};
use crate::store::{EventRecord, PaymentStore, PaymentSummary};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Result of processing one inbound webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { task_id: String, state: TaskState },
    Unchanged { task_id: String },
    Duplicate { event_id: String },
    Unmatched { event_type: String },
    Ignored { event_type: String },
}

/// Drives checkout, confirmation, webhook reconciliation and payouts.
#[derive(Clone)]
pub struct PaymentEngine {
    providers: Arc<ProviderRegistry>,
    store: Arc<dyn PaymentStore>,
    notifier: Arc<dyn Notifier>,
    fees: FeeSchedule,
    auto_payout: bool,
}

impl PaymentEngine {
    pub fn new(providers: ProviderRegistry, store: Arc<dyn PaymentStore>) -> Self {
        Self {
            providers: Arc::new(providers),
            store,
            notifier: Arc::new(NoopNotifier),
            fees: FeeSchedule::default(),
            auto_payout: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Send the payout as soon as a payment webhook confirms the money arrived.
    pub fn with_auto_payout(mut self, auto_payout: bool) -> Self {
        self.auto_payout = auto_payout;
        self
    }

    pub fn active_provider(&self) -> ProviderKind {
        self.providers.active_kind()
    }

    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        self.providers.configured()
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fees.rate()
    }

    pub fn quote(&self, amount: Decimal) -> Result<FeeSplit> {
        self.fees.split(amount)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    pub async fn payout_for_task(&self, task_id: &str) -> Result<Option<Payout>> {
        self.store.find_payout_for_task(task_id).await
    }

    pub async fn summary(&self) -> Result<PaymentSummary> {
        self.store.payment_summary().await
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Open a checkout with the active provider for an assigned task.
    pub async fn start_checkout(
        &self,
        task_id: &str,
        customer_email: Option<String>,
    ) -> Result<CheckoutSession> {
        let task = self.get_task(task_id).await?;

        if task.helper_id.is_none() {
            return Err(Error::InvalidTaskState(format!(
                "task {} has no assigned helper",
                task.id
            )));
        }
        if task.price <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "task {} has no agreed price",
                task.id
            )));
        }
        if !matches!(
            task.payment_status,
            PaymentStatus::Unpaid | PaymentStatus::Failed
        ) {
            return Err(Error::InvalidTaskState(format!(
                "task {} payment is already {}",
                task.id, task.payment_status
            )));
        }

        let provider = self.providers.active()?;
        let request = CheckoutRequest {
            task_id: task.id.clone(),
            description: task.title.clone(),
            amount: task.price,
            currency: task.currency.clone(),
            customer_email,
        };

        let session = provider.create_checkout(&request).await?;
        tracing::info!(
            "Checkout {} opened with {} for task {}",
            session.reference,
            provider.kind(),
            task.id
        );

        self.store
            .set_payment_reference(&task.id, provider.kind(), &session.reference)
            .await?;
        self.transition(task, EventKind::PaymentAuthorized).await?;

        Ok(session)
    }

    /// Ask the provider whether the task's payment went through, capturing it if needed.
    pub async fn confirm_payment(&self, task_id: &str) -> Result<Task> {
        let task = self.get_task(task_id).await?;
        let reference = task.payment_reference.clone().ok_or_else(|| {
            Error::InvalidTaskState(format!("task {} has no checkout in progress", task.id))
        })?;
        let provider = self.provider_for(&task)?;

        let confirmation = provider.confirm_payment(&reference).await?;
        tracing::info!(
            "Payment {} for task {} confirmed as {:?}",
            reference,
            task.id,
            confirmation
        );

        let kind = match confirmation {
            PaymentConfirmation::Succeeded => EventKind::PaymentSucceeded,
            PaymentConfirmation::Failed => EventKind::PaymentFailed,
            PaymentConfirmation::Pending => return Ok(task),
        };

        let (task, changed) = self.transition(task, kind).await?;
        if changed && kind == EventKind::PaymentSucceeded {
            self.after_payment(&task).await;
        }

        Ok(task)
    }

    /// Mark a sandbox payment as succeeded without going through the vendor.
    pub async fn simulate_payment(&self, task_id: &str) -> Result<Task> {
        let task = self.get_task(task_id).await?;
        let provider = self.provider_for(&task)?;

        if !provider.is_sandbox() {
            return Err(Error::Validation(format!(
                "{} is running against live money; simulation is disabled",
                provider.kind()
            )));
        }

        tracing::warn!("Simulating {} payment for task {}", provider.kind(), task.id);

        let (task, changed) = self.transition(task, EventKind::PaymentSucceeded).await?;
        if changed {
            self.after_payment(&task).await;
        }

        Ok(task)
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    pub async fn handle_webhook(
        &self,
        kind: ProviderKind,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> Result<WebhookOutcome> {
        let provider = self.providers.get(kind)?;

        if let Err(e) = provider.verify_webhook(headers, body).await {
            tracing::warn!("Rejected {} webhook: {}", kind, e);
            return Err(e);
        }

        let event = provider.parse_webhook(body)?;
        tracing::info!(
            "Received {} webhook {} ({})",
            kind,
            event.event_type,
            event.event_id
        );

        if event.kind == EventKind::Ignored {
            tracing::debug!("Unhandled {} event type: {}", kind, event.event_type);
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let (task, payout) = self.resolve(&event).await?;
        let Some(task) = task else {
            tracing::warn!(
                "No task matches {} event {} ({:?})",
                kind,
                event.event_id,
                event.reference
            );
            return Ok(WebhookOutcome::Unmatched {
                event_type: event.event_type,
            });
        };

        let fresh = self
            .store
            .record_event(&EventRecord {
                provider: kind,
                event_id: event.event_id.clone(),
                event_type: event.event_type.clone(),
                task_id: Some(task.id.clone()),
                received_at: Utc::now(),
            })
            .await?;
        if !fresh {
            tracing::info!("Duplicate {} event {}, skipping", kind, event.event_id);
            return Ok(WebhookOutcome::Duplicate {
                event_id: event.event_id,
            });
        }

        match self.apply_event(&event, task, payout).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Release the event id so the vendor's retry is processed
                if let Err(forget_err) = self.store.forget_event(kind, &event.event_id).await {
                    tracing::error!(
                        "Failed to release {} event {}: {}",
                        kind,
                        event.event_id,
                        forget_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply_event(
        &self,
        event: &PaymentEvent,
        task: Task,
        payout: Option<Payout>,
    ) -> Result<WebhookOutcome> {
        if let Some(mut payout) = payout.filter(|_| event.kind.is_payout()) {
            if let Some(status) = next_payout_status(payout.status, event.kind) {
                payout.mark(status);
                self.store.update_payout(&payout).await?;

                if status == PayoutStatus::Completed {
                    if let Err(e) = self.notifier.payout_sent(&task, &payout).await {
                        tracing::warn!("Failed to send payout notice for {}: {}", task.id, e);
                    }
                }
            }
        }

        let task_id = task.id.clone();
        let (task, changed) = self.transition(task, event.kind).await?;
        if !changed {
            return Ok(WebhookOutcome::Unchanged { task_id });
        }

        if event.kind == EventKind::PaymentSucceeded {
            self.after_payment(&task).await;
        }

        Ok(WebhookOutcome::Applied {
            task_id,
            state: task.state(),
        })
    }

    // ========================================================================
    // Payouts
    // ========================================================================

    /// Pay the helper their share of a paid task through the active provider.
    pub async fn create_payout(&self, task_id: &str) -> Result<Payout> {
        let task = self.get_task(task_id).await?;

        if task.payment_status != PaymentStatus::Paid {
            return Err(Error::InvalidTaskState(format!(
                "task {} payment is {}, not paid",
                task.id, task.payment_status
            )));
        }

        if let Some(existing) = self.store.find_payout_for_task(&task.id).await? {
            if existing.status.is_active() {
                tracing::info!(
                    "Payout {} for task {} already {}",
                    existing.id,
                    task.id,
                    existing.status
                );
                return Ok(existing);
            }
        }

        let helper_id = task.helper_id.clone().ok_or_else(|| {
            Error::InvalidTaskState(format!("task {} has no assigned helper", task.id))
        })?;
        let profile = self
            .store
            .get_profile(&helper_id)
            .await?
            .ok_or_else(|| Error::ProfileNotFound(helper_id.clone()))?;

        let provider = self.providers.active()?;
        let destination = profile.destination_for(provider.kind()).ok_or_else(|| {
            Error::Validation(format!(
                "helper {} has no {} payout destination",
                helper_id,
                provider.kind()
            ))
        })?;

        let split = self.fees.split(task.price)?;
        let mut payout = Payout::new(&task, helper_id, provider.kind(), &split);
        match self.store.insert_payout(&payout).await {
            Ok(()) => {}
            Err(Error::PayoutInProgress(_)) => {
                // Lost a race with another caller; theirs is the payout
                tracing::info!("Payout for task {} started concurrently", task.id);
                return self
                    .store
                    .find_payout_for_task(&task.id)
                    .await?
                    .ok_or_else(|| Error::PayoutInProgress(task.id.clone()));
            }
            Err(e) => return Err(e),
        }

        let mut pending = task.state();
        pending.payout_status = PayoutStatus::Pending;
        self.store.update_task_state(&task.id, pending).await?;
        let mut task = task;
        task.apply(pending);

        tracing::info!(
            "Paying out {} {} (fee {}) to helper {} via {}",
            split.net,
            payout.currency,
            split.platform_fee,
            payout.helper_id,
            provider.kind()
        );

        let request = PayoutRequest {
            task_id: task.id.clone(),
            payout_id: payout.id.clone(),
            amount: split.net,
            currency: payout.currency.clone(),
            destination,
            note: format!("Payout for task: {}", task.title),
        };

        match provider.create_payout(&request).await {
            Ok(receipt) => {
                payout.provider_reference = Some(receipt.reference.clone());
                payout.mark(receipt.status);
                self.store.update_payout(&payout).await?;

                let kind = match receipt.status {
                    PayoutStatus::Processing => EventKind::PayoutProcessing,
                    PayoutStatus::Completed => EventKind::PayoutCompleted,
                    PayoutStatus::Failed => EventKind::PayoutFailed,
                    PayoutStatus::None | PayoutStatus::Pending => EventKind::Ignored,
                };
                let (task, _) = self.transition(task, kind).await?;

                if receipt.status == PayoutStatus::Completed {
                    if let Err(e) = self.notifier.payout_sent(&task, &payout).await {
                        tracing::warn!("Failed to send payout notice for {}: {}", task.id, e);
                    }
                }

                Ok(payout)
            }
            Err(e) => {
                tracing::error!("Payout for task {} failed: {}", task.id, e);

                payout.fail(e.to_string());
                if let Err(store_err) = self.store.update_payout(&payout).await {
                    tracing::error!("Failed to record payout failure: {}", store_err);
                }
                if let Err(store_err) = self.transition(task, EventKind::PayoutFailed).await {
                    tracing::error!("Failed to record payout failure: {}", store_err);
                }

                Err(e)
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn provider_for(&self, task: &Task) -> Result<Arc<dyn PaymentProvider>> {
        match task.payment_provider {
            Some(kind) => self.providers.get(kind),
            None => self.providers.active(),
        }
    }

    async fn resolve(&self, event: &PaymentEvent) -> Result<(Option<Task>, Option<Payout>)> {
        match &event.reference {
            TaskRef::Task(id) => {
                let task = self.store.get_task(id).await?;
                let payout = if event.kind.is_payout() {
                    self.store.find_payout_for_task(id).await?
                } else {
                    None
                };
                Ok((task, payout))
            }
            TaskRef::Payment(reference) => Ok((
                self.store.find_task_by_payment_reference(reference).await?,
                None,
            )),
            TaskRef::Payout(reference) => {
                match self.store.find_payout_by_reference(reference).await? {
                    Some(payout) => {
                        let task = self.store.get_task(&payout.task_id).await?;
                        Ok((task, Some(payout)))
                    }
                    None => Ok((None, None)),
                }
            }
            TaskRef::None => Ok((None, None)),
        }
    }

    async fn transition(&self, mut task: Task, kind: EventKind) -> Result<(Task, bool)> {
        match reconcile(task.state(), kind) {
            Some(next) => {
                self.store.update_task_state(&task.id, next).await?;
                tracing::info!(
                    "Task {}: status={} payment={} payout={}",
                    task.id,
                    next.status,
                    next.payment_status,
                    next.payout_status
                );
                task.apply(next);
                Ok((task, true))
            }
            None => Ok((task, false)),
        }
    }

    async fn after_payment(&self, task: &Task) {
        if let Err(e) = self.notifier.payment_received(task).await {
            tracing::warn!("Failed to send payment notice for {}: {}", task.id, e);
        }

        if self.auto_payout {
            if let Err(e) = self.create_payout(&task.id).await {
                tracing::error!("Automatic payout for task {} failed: {}", task.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PayoutDestination, Profile, TaskStatus};
    use crate::provider::PayoutReceipt;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockProvider {
        kind: ProviderKind,
        sandbox: bool,
        fail_payouts: bool,
        payouts: Mutex<Vec<PayoutRequest>>,
    }

    impl MockProvider {
        fn new(kind: ProviderKind) -> Self {
            Self {
                kind,
                sandbox: true,
                fail_payouts: false,
                payouts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentProvider for MockProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn is_sandbox(&self) -> bool {
            self.sandbox
        }

        async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
            Ok(CheckoutSession {
                reference: format!("pay_{}", request.task_id),
                redirect_url: Some("https://pay.example.com".to_string()),
                client_secret: None,
            })
        }

        async fn confirm_payment(&self, _reference: &str) -> Result<PaymentConfirmation> {
            Ok(PaymentConfirmation::Succeeded)
        }

        async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutReceipt> {
            if self.fail_payouts {
                return Err(Error::ProviderApi {
                    provider: self.kind.to_string(),
                    status: 422,
                    body: "insufficient funds".to_string(),
                });
            }
            self.payouts.lock().unwrap().push(request.clone());
            Ok(PayoutReceipt {
                reference: format!("po_{}", request.task_id),
                status: PayoutStatus::Processing,
            })
        }

        async fn verify_webhook(&self, headers: &WebhookHeaders, _body: &[u8]) -> Result<()> {
            match headers.get("x-test-signature") {
                Some("ok") => Ok(()),
                _ => Err(Error::InvalidSignature),
            }
        }

        fn parse_webhook(&self, body: &[u8]) -> Result<PaymentEvent> {
            Ok(serde_json::from_slice(body)?)
        }
    }

    /// Delegates to `InMemoryStore`, failing or hiding calls on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        failing_task_updates: AtomicUsize,
        hidden_payout_lookups: AtomicUsize,
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl PaymentStore for FlakyStore {
        async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
            self.inner.get_task(task_id).await
        }

        async fn find_task_by_payment_reference(&self, reference: &str) -> Result<Option<Task>> {
            self.inner.find_task_by_payment_reference(reference).await
        }

        async fn save_task(&self, task: &Task) -> Result<()> {
            self.inner.save_task(task).await
        }

        async fn update_task_state(&self, task_id: &str, state: TaskState) -> Result<()> {
            if take(&self.failing_task_updates) {
                return Err(Error::Storage("connection reset".to_string()));
            }
            self.inner.update_task_state(task_id, state).await
        }

        async fn set_payment_reference(
            &self,
            task_id: &str,
            provider: ProviderKind,
            reference: &str,
        ) -> Result<()> {
            self.inner
                .set_payment_reference(task_id, provider, reference)
                .await
        }

        async fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
            self.inner.get_profile(profile_id).await
        }

        async fn save_profile(&self, profile: &Profile) -> Result<()> {
            self.inner.save_profile(profile).await
        }

        async fn insert_payout(&self, payout: &Payout) -> Result<()> {
            self.inner.insert_payout(payout).await
        }

        async fn update_payout(&self, payout: &Payout) -> Result<()> {
            self.inner.update_payout(payout).await
        }

        async fn find_payout_for_task(&self, task_id: &str) -> Result<Option<Payout>> {
            if take(&self.hidden_payout_lookups) {
                return Ok(None);
            }
            self.inner.find_payout_for_task(task_id).await
        }

        async fn find_payout_by_reference(&self, reference: &str) -> Result<Option<Payout>> {
            self.inner.find_payout_by_reference(reference).await
        }

        async fn record_event(&self, event: &EventRecord) -> Result<bool> {
            self.inner.record_event(event).await
        }

        async fn forget_event(&self, provider: ProviderKind, event_id: &str) -> Result<()> {
            self.inner.forget_event(provider, event_id).await
        }

        async fn payment_summary(&self) -> Result<PaymentSummary> {
            self.inner.payment_summary().await
        }
    }

    async fn setup(provider: MockProvider) -> (PaymentEngine, Arc<MockProvider>, Task) {
        setup_with_store(provider, Arc::new(InMemoryStore::new())).await
    }

    async fn setup_with_store(
        provider: MockProvider,
        store: Arc<dyn PaymentStore>,
    ) -> (PaymentEngine, Arc<MockProvider>, Task) {
        let provider = Arc::new(provider);
        let registry = ProviderRegistry::new(provider.kind()).with(provider.clone());

        let mut helper = Profile::new("helper-1".to_string(), "Helper".to_string());
        helper.stripe_account_id = Some("acct_123".to_string());
        store.save_profile(&helper).await.unwrap();

        let task = Task::new(
            "Mow lawn".to_string(),
            "tasker-1".to_string(),
            dec!(80.00),
            "AUD".to_string(),
        )
        .assign("helper-1".to_string());
        store.save_task(&task).await.unwrap();

        (PaymentEngine::new(registry, store), provider, task)
    }

    fn signed() -> WebhookHeaders {
        WebhookHeaders::new().with("x-test-signature", "ok")
    }

    fn event_body(event_id: &str, reference: TaskRef, kind: EventKind) -> Vec<u8> {
        serde_json::to_vec(&PaymentEvent {
            provider: ProviderKind::Stripe,
            event_id: event_id.to_string(),
            event_type: "test.event".to_string(),
            reference,
            kind,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_checkout_sets_pending_and_reference() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;

        let session = engine.start_checkout(&task.id, None).await.unwrap();
        assert_eq!(session.reference, format!("pay_{}", task.id));

        let stored = engine.get_task(&task.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.payment_provider, Some(ProviderKind::Stripe));
        assert_eq!(stored.payment_reference, Some(session.reference));
    }

    #[tokio::test]
    async fn test_checkout_requires_helper() {
        let (engine, _, _) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let unassigned = Task::new("x".to_string(), "t".to_string(), dec!(10), "AUD".to_string());
        engine.store().save_task(&unassigned).await.unwrap();

        let result = engine.start_checkout(&unassigned.id, None).await;
        assert!(matches!(result, Err(Error::InvalidTaskState(_))));
    }

    #[tokio::test]
    async fn test_webhook_by_payment_reference_marks_paid() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        engine.start_checkout(&task.id, None).await.unwrap();

        let body = event_body(
            "evt_1",
            TaskRef::Payment(format!("pay_{}", task.id)),
            EventKind::PaymentSucceeded,
        );
        let outcome = engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
        let stored = engine.get_task(&task.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let body = event_body("evt_1", TaskRef::Task(task.id.clone()), EventKind::PaymentSucceeded);

        let result = engine
            .handle_webhook(ProviderKind::Stripe, &WebhookHeaders::new(), &body)
            .await;
        assert!(matches!(result, Err(Error::InvalidSignature)));
        assert_eq!(
            engine.get_task(&task.id).await.unwrap().payment_status,
            PaymentStatus::Unpaid
        );
    }

    #[tokio::test]
    async fn test_webhook_duplicate_delivery() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let body = event_body("evt_1", TaskRef::Task(task.id.clone()), EventKind::PaymentSucceeded);

        engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();
        let second = engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();

        assert_eq!(
            second,
            WebhookOutcome::Duplicate {
                event_id: "evt_1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_webhook_for_unknown_task_is_unmatched() {
        let (engine, _, _) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let body = event_body("evt_1", TaskRef::Task("nope".to_string()), EventKind::PaymentSucceeded);

        let outcome = engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Unmatched { .. }));
    }

    #[tokio::test]
    async fn test_webhook_for_unconfigured_provider() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let body = event_body("evt_1", TaskRef::Task(task.id.clone()), EventKind::PaymentSucceeded);

        let result = engine
            .handle_webhook(ProviderKind::PayPal, &signed(), &body)
            .await;
        assert!(matches!(result, Err(Error::ProviderNotConfigured(_))));
    }

    #[tokio::test]
    async fn test_payout_requires_paid_task() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let result = engine.create_payout(&task.id).await;
        assert!(matches!(result, Err(Error::InvalidTaskState(_))));
    }

    #[tokio::test]
    async fn test_payout_net_of_fee_and_idempotent() {
        let (engine, provider, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        engine.simulate_payment(&task.id).await.unwrap();

        let payout = engine.create_payout(&task.id).await.unwrap();
        assert_eq!(payout.gross_amount, dec!(80.00));
        assert_eq!(payout.net_amount, dec!(72.00));
        assert_eq!(payout.platform_fee, dec!(8.00));
        assert_eq!(payout.status, PayoutStatus::Processing);
        assert_eq!(payout.provider_reference.as_deref(), Some(format!("po_{}", task.id).as_str()));

        {
            let sent = provider.payouts.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(
                sent[0].destination,
                PayoutDestination::StripeAccount("acct_123".to_string())
            );
        }

        let again = engine.create_payout(&task.id).await.unwrap();
        assert_eq!(again.id, payout.id);
        assert_eq!(provider.payouts.lock().unwrap().len(), 1);

        let stored = engine.get_task(&task.id).await.unwrap();
        assert_eq!(stored.payout_status, PayoutStatus::Processing);
    }

    #[tokio::test]
    async fn test_payout_webhook_completes_task() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        engine.simulate_payment(&task.id).await.unwrap();
        engine.create_payout(&task.id).await.unwrap();

        let body = event_body(
            "evt_payout",
            TaskRef::Payout(format!("po_{}", task.id)),
            EventKind::PayoutCompleted,
        );
        engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();

        let stored = engine.get_task(&task.id).await.unwrap();
        assert_eq!(stored.payout_status, PayoutStatus::Completed);
        assert_eq!(stored.status, TaskStatus::Completed);

        let payout = engine.payout_for_task(&task.id).await.unwrap().unwrap();
        assert_eq!(payout.status, PayoutStatus::Completed);

        let summary = engine.summary().await.unwrap();
        assert_eq!(summary.payouts_completed, 1);
        assert_eq!(summary.total_platform_fees, dec!(8.00));
    }

    #[tokio::test]
    async fn test_failed_payout_is_recorded_and_retryable() {
        let mut mock = MockProvider::new(ProviderKind::Stripe);
        mock.fail_payouts = true;
        let (engine, _, task) = setup(mock).await;
        engine.simulate_payment(&task.id).await.unwrap();

        let result = engine.create_payout(&task.id).await;
        assert!(matches!(result, Err(Error::ProviderApi { status: 422, .. })));

        let payout = engine.payout_for_task(&task.id).await.unwrap().unwrap();
        assert_eq!(payout.status, PayoutStatus::Failed);
        assert_eq!(payout.error.as_deref().map(|e| e.contains("insufficient")), Some(true));
        assert_eq!(
            engine.get_task(&task.id).await.unwrap().payout_status,
            PayoutStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_auto_payout_after_payment_webhook() {
        let provider = Arc::new(MockProvider::new(ProviderKind::Stripe));
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Stripe)).await;
        let engine = PaymentEngine::new(
            ProviderRegistry::new(ProviderKind::Stripe).with(provider.clone()),
            engine.store().clone(),
        )
        .with_auto_payout(true);

        let body = event_body("evt_1", TaskRef::Task(task.id.clone()), EventKind::PaymentSucceeded);
        engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();

        assert_eq!(provider.payouts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_simulation_disabled_in_production() {
        let mut mock = MockProvider::new(ProviderKind::Airwallex);
        mock.sandbox = false;
        let (engine, _, task) = setup(mock).await;

        let result = engine.simulate_payment(&task.id).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_payout_without_destination() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::Airwallex)).await;
        engine.simulate_payment(&task.id).await.unwrap();

        let result = engine.create_payout(&task.id).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(engine.payout_for_task(&task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirm_payment() {
        let (engine, _, task) = setup(MockProvider::new(ProviderKind::PayPal)).await;
        assert!(matches!(
            engine.confirm_payment(&task.id).await,
            Err(Error::InvalidTaskState(_))
        ));

        engine.start_checkout(&task.id, None).await.unwrap();
        let confirmed = engine.confirm_payment(&task.id).await.unwrap();
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
        assert_eq!(confirmed.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_failed_write_lets_redelivery_through() {
        let store = Arc::new(FlakyStore::default());
        store.failing_task_updates.store(1, Ordering::SeqCst);
        let (engine, _, task) =
            setup_with_store(MockProvider::new(ProviderKind::Stripe), store.clone()).await;
        let body = event_body("evt_1", TaskRef::Task(task.id.clone()), EventKind::PaymentSucceeded);

        let first = engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await;
        assert!(matches!(first, Err(Error::Storage(_))));
        assert_eq!(
            engine.get_task(&task.id).await.unwrap().payment_status,
            PaymentStatus::Unpaid
        );

        let retry = engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();
        assert!(matches!(retry, WebhookOutcome::Applied { .. }));

        let stored = engine.get_task(&task.id).await.unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.status, TaskStatus::InProgress);

        let third = engine
            .handle_webhook(ProviderKind::Stripe, &signed(), &body)
            .await
            .unwrap();
        assert!(matches!(third, WebhookOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_racing_payout_returns_existing() {
        let store = Arc::new(FlakyStore::default());
        let (engine, provider, task) =
            setup_with_store(MockProvider::new(ProviderKind::Stripe), store.clone()).await;
        engine.simulate_payment(&task.id).await.unwrap();
        let first = engine.create_payout(&task.id).await.unwrap();

        // Second caller misses the first payout on its pre-check
        store.hidden_payout_lookups.store(1, Ordering::SeqCst);
        let second = engine.create_payout(&task.id).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(provider.payouts.lock().unwrap().len(), 1);
    }
}
