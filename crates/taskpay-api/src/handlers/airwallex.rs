use axum::{extract::State, Json};
use serde_json::Value;

use super::payments::{TaskPaymentResponse, TaskRequest};
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

/// Mark a sandbox payment as paid without a real card
pub async fn simulate_payment(
    State(state): State<ApiState>,
    Json(payload): Json<TaskRequest>,
) -> ApiResult<Json<TaskPaymentResponse>> {
    let task = state.engine.simulate_payment(&payload.task_id).await?;
    Ok(Json(TaskPaymentResponse::from(&task)))
}

pub async fn validate_beneficiary(
    State(state): State<ApiState>,
    Json(beneficiary): Json<Value>,
) -> ApiResult<Json<Value>> {
    let airwallex = state
        .airwallex
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("airwallex is not configured".to_string()))?;

    let verdict = airwallex.validate_beneficiary(&beneficiary).await?;
    Ok(Json(verdict))
}
