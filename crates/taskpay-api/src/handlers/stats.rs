use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub provider: String,
    pub currency: String,
    pub platform_fee_rate: Decimal,
    pub paid_tasks: i64,
    pub refunded_tasks: i64,
    pub payouts_completed: i64,
    pub payouts_failed: i64,
    pub total_paid_out: Decimal,
    pub total_platform_fees: Decimal,
}

pub async fn get_statistics(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let summary = state.engine.summary().await?;

    Ok(Json(StatsResponse {
        provider: state.engine.active_provider().to_string(),
        currency: state.currency.clone(),
        platform_fee_rate: state.engine.fee_rate(),
        paid_tasks: summary.paid_tasks,
        refunded_tasks: summary.refunded_tasks,
        payouts_completed: summary.payouts_completed,
        payouts_failed: summary.payouts_failed,
        total_paid_out: summary.total_paid_out,
        total_platform_fees: summary.total_platform_fees,
    }))
}
