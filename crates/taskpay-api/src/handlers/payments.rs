use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use taskpay_core::{CheckoutSession, FeeSplit, Payout, Task};

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub task_id: String,
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub task_id: String,
    pub provider: String,
    #[serde(flatten)]
    pub session: CheckoutSession,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskPaymentResponse {
    pub task_id: String,
    pub status: String,
    pub payment_status: String,
    pub payout_status: String,
    pub payment_provider: Option<String>,
    pub payment_reference: Option<String>,
}

impl From<&Task> for TaskPaymentResponse {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status.to_string(),
            payment_status: task.payment_status.to_string(),
            payout_status: task.payout_status.to_string(),
            payment_provider: task.payment_provider.map(|p| p.to_string()),
            payment_reference: task.payment_reference.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub currency: String,
    pub platform_fee_rate: Decimal,
    #[serde(flatten)]
    pub split: FeeSplit,
}

/// Start a checkout with the active provider
pub async fn create_checkout(
    State(state): State<ApiState>,
    Json(payload): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let session = state
        .engine
        .start_checkout(&payload.task_id, payload.customer_email)
        .await?;

    Ok(Json(CheckoutResponse {
        task_id: payload.task_id,
        provider: state.engine.active_provider().to_string(),
        session,
    }))
}

/// Confirm (and for PayPal, capture) the task's payment
pub async fn confirm_payment(
    State(state): State<ApiState>,
    Json(payload): Json<TaskRequest>,
) -> ApiResult<Json<TaskPaymentResponse>> {
    let task = state.engine.confirm_payment(&payload.task_id).await?;
    Ok(Json(TaskPaymentResponse::from(&task)))
}

pub async fn create_payout(
    State(state): State<ApiState>,
    Json(payload): Json<TaskRequest>,
) -> ApiResult<Json<Payout>> {
    let payout = state.engine.create_payout(&payload.task_id).await?;
    Ok(Json(payout))
}

pub async fn get_payout(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Payout>> {
    // Distinguish an unknown task from a task with no payout yet
    state.engine.get_task(&task_id).await?;

    state
        .engine
        .payout_for_task(&task_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no payout for task {}", task_id)))
}

/// Fee split for a task price, without touching any task
pub async fn quote(
    State(state): State<ApiState>,
    Query(params): Query<QuoteParams>,
) -> ApiResult<Json<QuoteResponse>> {
    let amount: Decimal = params
        .amount
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid amount: {}", params.amount)))?;

    let split = state.engine.quote(amount)?;

    Ok(Json(QuoteResponse {
        currency: state.currency.clone(),
        platform_fee_rate: state.engine.fee_rate(),
        split,
    }))
}
