pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use anyhow::Result;
use std::sync::Arc;
use taskpay_core::{FeeSchedule, InMemoryStore, Notifier, PaymentEngine, PaymentStore};
use taskpay_providers::{build_registry, AirwallexProvider, EmailNotifier};

pub use config::Settings;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::ApiState;

/// Wire the store, providers and notifier described by `settings` into router state.
pub async fn build_state(settings: &Settings) -> Result<ApiState> {
    let store: Arc<dyn PaymentStore> = match settings.database_url {
        Some(ref url) => {
            let database = taskpay_db::Database::new(url).await?;
            database.init_schema().await?;
            Arc::new(database)
        }
        None => {
            tracing::warn!("No database_url provided, running with in-memory storage");
            Arc::new(InMemoryStore::new())
        }
    };

    let registry = build_registry(settings.payment.provider, &settings.providers())?;
    let fees = FeeSchedule::new(settings.payment.platform_fee_rate)?;

    let mut engine = PaymentEngine::new(registry, store.clone())
        .with_fee_schedule(fees)
        .with_auto_payout(settings.payment.auto_payout);

    if let Some(ref email) = settings.email {
        let notifier: Arc<dyn Notifier> = Arc::new(EmailNotifier::new(email.clone(), store));
        engine = engine.with_notifier(notifier);
    } else {
        tracing::info!("Email is not configured, notifications disabled");
    }

    Ok(ApiState {
        engine: Arc::new(engine),
        airwallex: settings
            .airwallex
            .clone()
            .map(|c| Arc::new(AirwallexProvider::new(c))),
        currency: settings.payment.currency.clone(),
    })
}

/// Build state from `settings` and serve the API until the process exits.
pub async fn serve(settings: Settings) -> Result<()> {
    let state = build_state(&settings).await?;
    let app = create_router(state);

    let addr = settings.addr();
    tracing::info!(
        "🚀 TaskPay API Server running on http://{} (provider: {})",
        addr,
        settings.payment.provider
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
