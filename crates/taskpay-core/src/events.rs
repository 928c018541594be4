use crate::model::{PaymentStatus, PayoutStatus, ProviderKind, TaskState, TaskStatus};
use serde::{Deserialize, Serialize};

/// What a vendor event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TaskRef {
    /// Our own task id, carried in metadata / custom id fields.
    Task(String),
    /// A vendor payment id (payment intent, checkout session, order).
    Payment(String),
    /// A vendor payout id (transfer, payout item).
    Payout(String),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PaymentAuthorized,
    PaymentSucceeded,
    PaymentFailed,
    PaymentRefunded,
    PayoutProcessing,
    PayoutCompleted,
    PayoutFailed,
    Ignored,
}

impl EventKind {
    pub fn is_payout(&self) -> bool {
        matches!(
            self,
            EventKind::PayoutProcessing | EventKind::PayoutCompleted | EventKind::PayoutFailed
        )
    }
}

/// A vendor webhook translated into the internal vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub provider: ProviderKind,
    pub event_id: String,
    pub event_type: String,
    pub reference: TaskRef,
    pub kind: EventKind,
}

/// Compute the task state after `kind`, or `None` when the event changes nothing.
///
/// Late or out-of-order deliveries never move a task backwards: a failure
/// notice for a payment already marked paid is dropped, as is a payout
/// failure after the payout completed.
pub fn reconcile(current: TaskState, kind: EventKind) -> Option<TaskState> {
    let mut next = current;

    match kind {
        EventKind::PaymentAuthorized => {
            if matches!(
                current.payment_status,
                PaymentStatus::Unpaid | PaymentStatus::Failed
            ) {
                next.payment_status = PaymentStatus::Pending;
            }
        }
        EventKind::PaymentSucceeded => {
            if current.payment_status != PaymentStatus::Refunded {
                next.payment_status = PaymentStatus::Paid;
                if matches!(current.status, TaskStatus::Open | TaskStatus::Assigned) {
                    next.status = TaskStatus::InProgress;
                }
            }
        }
        EventKind::PaymentFailed => {
            if matches!(
                current.payment_status,
                PaymentStatus::Unpaid | PaymentStatus::Pending
            ) {
                next.payment_status = PaymentStatus::Failed;
            }
        }
        EventKind::PaymentRefunded => {
            if current.payment_status == PaymentStatus::Paid {
                next.payment_status = PaymentStatus::Refunded;
                if current.status != TaskStatus::Completed {
                    next.status = TaskStatus::Cancelled;
                }
            }
        }
        EventKind::PayoutProcessing => {
            if matches!(
                current.payout_status,
                PayoutStatus::None | PayoutStatus::Pending
            ) {
                next.payout_status = PayoutStatus::Processing;
            }
        }
        EventKind::PayoutCompleted => {
            next.payout_status = PayoutStatus::Completed;
            if current.status == TaskStatus::InProgress {
                next.status = TaskStatus::Completed;
            }
        }
        EventKind::PayoutFailed => {
            if current.payout_status != PayoutStatus::Completed {
                next.payout_status = PayoutStatus::Failed;
            }
        }
        EventKind::Ignored => {}
    }

    (next != current).then_some(next)
}

/// The payout row status a payout event moves to, honouring the same
/// no-regression rule as [`reconcile`].
pub fn next_payout_status(current: PayoutStatus, kind: EventKind) -> Option<PayoutStatus> {
    let next = match kind {
        EventKind::PayoutProcessing
            if matches!(current, PayoutStatus::None | PayoutStatus::Pending) =>
        {
            PayoutStatus::Processing
        }
        EventKind::PayoutCompleted => PayoutStatus::Completed,
        EventKind::PayoutFailed if current != PayoutStatus::Completed => PayoutStatus::Failed,
        _ => return None,
    };

    (next != current).then_some(next)
}
