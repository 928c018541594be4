use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use taskpay_core::{Payout, Profile, ProviderKind, Task};

fn parse_column<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidColumn {
        column,
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub tasker_id: String,
    pub helper_id: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payout_status: String,
    pub payment_provider: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        let payment_provider = row
            .payment_provider
            .as_deref()
            .map(|p| parse_column::<ProviderKind>("payment_provider", p))
            .transpose()?;

        Ok(Task {
            status: parse_column("status", &row.status)?,
            payment_status: parse_column("payment_status", &row.payment_status)?,
            payout_status: parse_column("payout_status", &row.payout_status)?,
            payment_provider,
            id: row.id,
            title: row.title,
            tasker_id: row.tasker_id,
            helper_id: row.helper_id,
            price: row.price,
            currency: row.currency,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub stripe_account_id: Option<String>,
    pub airwallex_beneficiary_id: Option<String>,
    pub paypal_email: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            stripe_account_id: row.stripe_account_id,
            airwallex_beneficiary_id: row.airwallex_beneficiary_id,
            paypal_email: row.paypal_email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutRow {
    pub id: String,
    pub task_id: String,
    pub helper_id: String,
    pub provider: String,
    pub gross_amount: Decimal,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub provider_reference: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = Error;

    fn try_from(row: PayoutRow) -> Result<Self> {
        Ok(Payout {
            provider: parse_column("provider", &row.provider)?,
            status: parse_column("status", &row.status)?,
            id: row.id,
            task_id: row.task_id,
            helper_id: row.helper_id,
            gross_amount: row.gross_amount,
            platform_fee: row.platform_fee,
            net_amount: row.net_amount,
            currency: row.currency,
            provider_reference: row.provider_reference,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A processed webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRow {
    pub id: i32,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub task_id: Option<String>,
    pub received_at: DateTime<Utc>,
}
