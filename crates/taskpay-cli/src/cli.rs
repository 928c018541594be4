use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "taskpay")]
#[command(about = "TaskPay - marketplace payments, payouts and webhooks", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL (overrides TASKPAY__DATABASE_URL)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Payment provider for new checkouts and payouts (stripe, airwallex, paypal)
    #[arg(long, env = "PAYMENT_PROVIDER")]
    pub provider: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start API server
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Initialize database
    InitDb,

    /// Show how a task price splits between helper and platform
    Quote {
        /// Task price, e.g. 120.50
        amount: String,
    },

    /// Pay the helper for a paid task
    Payout {
        /// Task ID
        task_id: String,
    },

    /// Show payment and payout status of a task
    Status {
        /// Task ID
        task_id: String,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show payment statistics
    Stats,

    /// List recently processed webhook events
    Events {
        /// Limit number of results
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Show configured payment providers
    Providers,
}
