use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskpay=info,taskpay_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Command-line flags win over TASKPAY__ settings
    let mut settings = taskpay_api::Settings::load()?;
    if let Some(url) = cli.database_url {
        settings.database_url = Some(url);
    }
    if let Some(ref provider) = cli.provider {
        settings.payment.provider = provider.parse().map_err(anyhow::Error::msg)?;
    }

    commands::execute(cli.command, settings).await
}
