use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    None,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::None => "none",
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        }
    }

    /// A payout in one of these states must not be sent again.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Pending | PayoutStatus::Processing | PayoutStatus::Completed
        )
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PayoutStatus::None),
            "pending" => Ok(PayoutStatus::Pending),
            "processing" => Ok(PayoutStatus::Processing),
            "completed" => Ok(PayoutStatus::Completed),
            "failed" => Ok(PayoutStatus::Failed),
            _ => Err(format!("Unknown payout status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Stripe,
    Airwallex,
    PayPal,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Stripe,
        ProviderKind::Airwallex,
        ProviderKind::PayPal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stripe => "stripe",
            ProviderKind::Airwallex => "airwallex",
            ProviderKind::PayPal => "paypal",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(ProviderKind::Stripe),
            "airwallex" => Ok(ProviderKind::Airwallex),
            "paypal" => Ok(ProviderKind::PayPal),
            _ => Err(format!("Unknown payment provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub tasker_id: String,
    pub helper_id: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub status: TaskStatus,
    pub payment_status: PaymentStatus,
    pub payout_status: PayoutStatus,
    pub payment_provider: Option<ProviderKind>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: String, tasker_id: String, price: Decimal, currency: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            tasker_id,
            helper_id: None,
            price,
            currency,
            status: TaskStatus::Open,
            payment_status: PaymentStatus::Unpaid,
            payout_status: PayoutStatus::None,
            payment_provider: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assign(mut self, helper_id: String) -> Self {
        self.helper_id = Some(helper_id);
        self.status = TaskStatus::Assigned;
        self
    }

    pub fn state(&self) -> TaskState {
        TaskState {
            status: self.status,
            payment_status: self.payment_status,
            payout_status: self.payout_status,
        }
    }

    pub fn apply(&mut self, state: TaskState) {
        self.status = state.status;
        self.payment_status = state.payment_status;
        self.payout_status = state.payout_status;
        self.updated_at = Utc::now();
    }
}

/// The three status columns the payment layer writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub payment_status: PaymentStatus,
    pub payout_status: PayoutStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub stripe_account_id: Option<String>,
    pub airwallex_beneficiary_id: Option<String>,
    pub paypal_email: Option<String>,
}

impl Profile {
    pub fn new(id: String, display_name: String) -> Self {
        Self {
            id,
            display_name,
            email: None,
            stripe_account_id: None,
            airwallex_beneficiary_id: None,
            paypal_email: None,
        }
    }

    /// Where a payout through `kind` should land, if the helper has set it up.
    pub fn destination_for(&self, kind: ProviderKind) -> Option<PayoutDestination> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        match kind {
            ProviderKind::Stripe => {
                non_empty(&self.stripe_account_id).map(PayoutDestination::StripeAccount)
            }
            ProviderKind::Airwallex => non_empty(&self.airwallex_beneficiary_id)
                .map(PayoutDestination::AirwallexBeneficiary),
            ProviderKind::PayPal => non_empty(&self.paypal_email)
                .or_else(|| non_empty(&self.email))
                .map(PayoutDestination::PayPalEmail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PayoutDestination {
    StripeAccount(String),
    AirwallexBeneficiary(String),
    PayPalEmail(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub task_id: String,
    pub helper_id: String,
    pub provider: ProviderKind,
    pub gross_amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub currency: String,
    pub status: PayoutStatus,
    pub provider_reference: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    pub fn new(
        task: &Task,
        helper_id: String,
        provider: ProviderKind,
        split: &crate::fees::FeeSplit,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            helper_id,
            provider,
            gross_amount: split.gross,
            platform_fee: split.platform_fee,
            net_amount: split.net,
            currency: task.currency.clone(),
            status: PayoutStatus::Pending,
            provider_reference: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark(&mut self, status: PayoutStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: String) {
        self.status = PayoutStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}
