use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, state::ApiState};

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))

        // Payment endpoints
        .route("/api/payments/provider", get(handlers::health::active_provider))
        .route("/api/payments/checkout", post(handlers::payments::create_checkout))
        .route("/api/payments/confirm", post(handlers::payments::confirm_payment))
        .route("/api/payments/create-payout", post(handlers::payments::create_payout))
        .route("/api/payments/quote", get(handlers::payments::quote))
        .route("/api/payments/stats", get(handlers::stats::get_statistics))
        .route("/api/payouts/:task_id", get(handlers::payments::get_payout))

        // Airwallex helpers
        .route("/api/airwallex/simulate-payment", post(handlers::airwallex::simulate_payment))
        .route(
            "/api/airwallex/validate-beneficiary",
            post(handlers::airwallex::validate_beneficiary),
        )

        // Vendor webhooks
        .route("/webhooks/stripe", post(handlers::webhook::stripe_webhook))
        .route("/webhooks/airwallex", post(handlers::webhook::airwallex_webhook))
        .route("/webhooks/paypal", post(handlers::webhook::paypal_webhook))

        // Add state
        .with_state(state)

        // Request logging and CORS
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
