use crate::model::{Payout, Task};
use crate::Result;
use async_trait::async_trait;

/// Side-channel notifications (email) sent after a state change.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_received(&self, task: &Task) -> Result<()>;

    async fn payout_sent(&self, task: &Task, payout: &Payout) -> Result<()>;
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn payment_received(&self, task: &Task) -> Result<()> {
        tracing::debug!("Notifications disabled, skipping payment notice for {}", task.id);
        Ok(())
    }

    async fn payout_sent(&self, task: &Task, _payout: &Payout) -> Result<()> {
        tracing::debug!("Notifications disabled, skipping payout notice for {}", task.id);
        Ok(())
    }
}
