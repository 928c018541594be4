use crate::model::{Payout, Profile, Task, TaskState};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{PaymentStatus, PayoutStatus, ProviderKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub provider: ProviderKind,
    pub event_id: String,
    pub event_type: String,
    pub task_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub paid_tasks: i64,
    pub refunded_tasks: i64,
    pub payouts_completed: i64,
    pub payouts_failed: i64,
    pub total_paid_out: Decimal,
    pub total_platform_fees: Decimal,
}

/// Persistence for the rows the payment layer owns or touches.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>>;

    async fn find_task_by_payment_reference(&self, reference: &str) -> Result<Option<Task>>;

    async fn save_task(&self, task: &Task) -> Result<()>;

    async fn update_task_state(&self, task_id: &str, state: TaskState) -> Result<()>;

    async fn set_payment_reference(
        &self,
        task_id: &str,
        provider: ProviderKind,
        reference: &str,
    ) -> Result<()>;

    async fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>>;

    async fn save_profile(&self, profile: &Profile) -> Result<()>;

    /// Fails with `Error::PayoutInProgress` when the task already has a
    /// pending, processing or completed payout.
    async fn insert_payout(&self, payout: &Payout) -> Result<()>;

    async fn update_payout(&self, payout: &Payout) -> Result<()>;

    async fn find_payout_for_task(&self, task_id: &str) -> Result<Option<Payout>>;

    async fn find_payout_by_reference(&self, reference: &str) -> Result<Option<Payout>>;

    /// Returns false when this provider event was already recorded.
    async fn record_event(&self, event: &EventRecord) -> Result<bool>;

    /// Drops a recorded event so a redelivery is processed again.
    async fn forget_event(&self, provider: ProviderKind, event_id: &str) -> Result<()>;

    async fn payment_summary(&self) -> Result<PaymentSummary>;
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    profiles: Arc<RwLock<HashMap<String, Profile>>>,
    payouts: Arc<RwLock<HashMap<String, Payout>>>,
    events: Arc<RwLock<HashSet<(ProviderKind, String)>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn find_task_by_payment_reference(&self, reference: &str) -> Result<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .find(|t| t.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn update_task_state(&self, task_id: &str, state: TaskState) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        task.apply(state);
        Ok(())
    }

    async fn set_payment_reference(
        &self,
        task_id: &str,
        provider: ProviderKind,
        reference: &str,
    ) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        task.payment_provider = Some(provider);
        task.payment_reference = Some(reference.to_string());
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        Ok(self.profiles.read().await.get(profile_id).cloned())
    }

    async fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<()> {
        let mut payouts = self.payouts.write().await;
        if payouts
            .values()
            .any(|p| p.task_id == payout.task_id && p.status.is_active())
        {
            return Err(Error::PayoutInProgress(payout.task_id.clone()));
        }
        payouts.insert(payout.id.clone(), payout.clone());
        Ok(())
    }

    async fn update_payout(&self, payout: &Payout) -> Result<()> {
        let mut payouts = self.payouts.write().await;
        if !payouts.contains_key(&payout.id) {
            return Err(Error::Storage(format!("payout {} does not exist", payout.id)));
        }
        payouts.insert(payout.id.clone(), payout.clone());
        Ok(())
    }

    async fn find_payout_for_task(&self, task_id: &str) -> Result<Option<Payout>> {
        let payouts = self.payouts.read().await;
        Ok(payouts
            .values()
            .filter(|p| p.task_id == task_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_payout_by_reference(&self, reference: &str) -> Result<Option<Payout>> {
        let payouts = self.payouts.read().await;
        Ok(payouts
            .values()
            .find(|p| p.provider_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn record_event(&self, event: &EventRecord) -> Result<bool> {
        Ok(self
            .events
            .write()
            .await
            .insert((event.provider, event.event_id.clone())))
    }

    async fn forget_event(&self, provider: ProviderKind, event_id: &str) -> Result<()> {
        self.events
            .write()
            .await
            .remove(&(provider, event_id.to_string()));
        Ok(())
    }

    async fn payment_summary(&self) -> Result<PaymentSummary> {
        let tasks = self.tasks.read().await;
        let payouts = self.payouts.read().await;

        let mut summary = PaymentSummary {
            paid_tasks: tasks
                .values()
                .filter(|t| t.payment_status == PaymentStatus::Paid)
                .count() as i64,
            refunded_tasks: tasks
                .values()
                .filter(|t| t.payment_status == PaymentStatus::Refunded)
                .count() as i64,
            ..Default::default()
        };

        for payout in payouts.values() {
            match payout.status {
                PayoutStatus::Completed => {
                    summary.payouts_completed += 1;
                    summary.total_paid_out += payout.net_amount;
                    summary.total_platform_fees += payout.platform_fee;
                }
                PayoutStatus::Failed => summary.payouts_failed += 1,
                _ => {}
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_record_event_dedupes() {
        let store = InMemoryStore::new();
        let record = EventRecord {
            provider: ProviderKind::Stripe,
            event_id: "evt_1".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            task_id: None,
            received_at: Utc::now(),
        };

        assert!(store.record_event(&record).await.unwrap());
        assert!(!store.record_event(&record).await.unwrap());

        let other_provider = EventRecord {
            provider: ProviderKind::PayPal,
            ..record
        };
        assert!(store.record_event(&other_provider).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_payment_reference() {
        let store = InMemoryStore::new();
        let task = Task::new("t".to_string(), "tasker".to_string(), dec!(50), "AUD".to_string());
        store.save_task(&task).await.unwrap();
        store
            .set_payment_reference(&task.id, ProviderKind::Airwallex, "int_123")
            .await
            .unwrap();

        let found = store.find_task_by_payment_reference("int_123").await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(task.id));
        assert!(store
            .find_task_by_payment_reference("int_999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_missing_task_fails() {
        let store = InMemoryStore::new();
        let task = Task::new("t".to_string(), "tasker".to_string(), dec!(50), "AUD".to_string());
        let result = store.update_task_state("missing", task.state()).await;
        assert!(matches!(result, Err(Error::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_forgotten_event_can_be_recorded_again() {
        let store = InMemoryStore::new();
        let record = EventRecord {
            provider: ProviderKind::Airwallex,
            event_id: "evt_7".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            task_id: None,
            received_at: Utc::now(),
        };

        assert!(store.record_event(&record).await.unwrap());
        store.forget_event(ProviderKind::Airwallex, "evt_7").await.unwrap();
        assert!(store.record_event(&record).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_active_payout_per_task() {
        let store = InMemoryStore::new();
        let task = Task::new("t".to_string(), "tasker".to_string(), dec!(50), "AUD".to_string());
        let split = crate::fees::FeeSchedule::default().split(task.price).unwrap();

        let mut first = Payout::new(&task, "helper".to_string(), ProviderKind::Stripe, &split);
        store.insert_payout(&first).await.unwrap();

        let second = Payout::new(&task, "helper".to_string(), ProviderKind::Stripe, &split);
        let result = store.insert_payout(&second).await;
        assert!(matches!(result, Err(Error::PayoutInProgress(id)) if id == task.id));

        first.fail("declined".to_string());
        store.update_payout(&first).await.unwrap();
        store.insert_payout(&second).await.unwrap();
    }
}
