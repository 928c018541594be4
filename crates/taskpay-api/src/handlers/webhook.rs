use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use taskpay_core::{ProviderKind, WebhookHeaders, WebhookOutcome};

use crate::error::ApiResult;
use crate::state::ApiState;

pub async fn stripe_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    handle_webhook(state, ProviderKind::Stripe, headers, body).await
}

pub async fn airwallex_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    handle_webhook(state, ProviderKind::Airwallex, headers, body).await
}

pub async fn paypal_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    handle_webhook(state, ProviderKind::PayPal, headers, body).await
}

/// Signatures are computed over the exact bytes received, so the body is never re-serialized.
async fn handle_webhook(
    state: ApiState,
    kind: ProviderKind,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    tracing::info!("Received {} webhook ({} bytes)", kind, body.len());

    let outcome = state
        .engine
        .handle_webhook(kind, &to_webhook_headers(&headers), &body)
        .await?;

    match outcome {
        WebhookOutcome::Applied { ref task_id, .. } => {
            tracing::info!("{} webhook applied to task {}", kind, task_id)
        }
        ref other => tracing::debug!("{} webhook outcome: {:?}", kind, other),
    }

    Ok(Json(json!({ "received": true })))
}

fn to_webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    let mut out = WebhookHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str(), value);
        }
    }
    out
}
