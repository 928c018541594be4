use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::ApiState;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "taskpay-api"
    }))
}

pub async fn active_provider(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({
        "provider": state.engine.active_provider(),
        "configured": state.engine.configured_providers(),
    }))
}
