use anyhow::Result;
use rust_decimal::Decimal;
use taskpay_api::Settings;
use taskpay_core::fees::format_amount;
use taskpay_core::FeeSchedule;
use taskpay_db::Database;

use crate::cli::Commands;

pub async fn execute(command: Commands, mut settings: Settings) -> Result<()> {
    match command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }

            println!("Starting API server on port {}...", settings.server.port);

            if settings.database_url.is_none() {
                println!("Warning: No database configured. Payments won't be persisted.");
            }

            taskpay_api::serve(settings).await?;
        }

        Commands::InitDb => {
            let database = connect(&settings).await?;
            println!("Initializing database schema...");
            database.init_schema().await?;
            println!("✓ Database initialized successfully");
        }

        Commands::Quote { amount } => {
            let amount: Decimal = amount
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid amount: {}", amount))?;
            let fees = FeeSchedule::new(settings.payment.platform_fee_rate)?;
            let split = fees.split(amount)?;
            let currency = &settings.payment.currency;

            println!("Fee quote ({}% platform fee)\n", fees.rate() * Decimal::ONE_HUNDRED);
            println!("  Task price:   {} {}", format_amount(split.gross), currency);
            println!("  Platform fee: {} {}", format_amount(split.platform_fee), currency);
            println!("  Helper gets:  {} {}", format_amount(split.net), currency);
        }

        Commands::Payout { task_id } => {
            let state = taskpay_api::build_state(&settings).await?;

            println!(
                "Creating payout for task {} via {}...",
                task_id,
                state.engine.active_provider()
            );
            let payout = state.engine.create_payout(&task_id).await?;

            println!("✓ Payout {}", payout.id);
            println!("  Status: {}", payout.status);
            println!(
                "  Amount: {} {} (fee {})",
                format_amount(payout.net_amount),
                payout.currency,
                format_amount(payout.platform_fee)
            );
            if let Some(reference) = &payout.provider_reference {
                println!("  Provider reference: {}", reference);
            }
        }

        Commands::Status { task_id, json } => {
            let state = taskpay_api::build_state(&settings).await?;
            let task = state.engine.get_task(&task_id).await?;
            let payout = state.engine.payout_for_task(&task_id).await?;

            if json {
                let output = serde_json::json!({ "task": task, "payout": payout });
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            println!("Task: {}", task.id);
            println!("  Title: {}", task.title);
            println!("  Price: {} {}", format_amount(task.price), task.currency);
            println!("  Status: {}", task.status);
            println!("  Payment: {}", task.payment_status);
            println!("  Payout: {}", task.payout_status);
            if let Some(provider) = task.payment_provider {
                println!("  Provider: {}", provider);
            }
            if let Some(reference) = &task.payment_reference {
                println!("  Payment reference: {}", reference);
            }

            if let Some(payout) = payout {
                println!("\nLatest payout: {}", payout.id);
                println!("  Status: {}", payout.status);
                println!(
                    "  Net: {} {} (fee {})",
                    format_amount(payout.net_amount),
                    payout.currency,
                    format_amount(payout.platform_fee)
                );
                if let Some(error) = &payout.error {
                    println!("  Error: {}", error);
                }
            }
        }

        Commands::Stats => {
            let state = taskpay_api::build_state(&settings).await?;
            let summary = state.engine.summary().await?;
            let currency = &settings.payment.currency;

            println!("TaskPay Statistics\n");
            println!("  Active provider: {}", state.engine.active_provider());
            println!("  Paid tasks: {}", summary.paid_tasks);
            println!("  Refunded tasks: {}", summary.refunded_tasks);
            println!("  Payouts completed: {}", summary.payouts_completed);
            println!("  Payouts failed: {}", summary.payouts_failed);
            println!(
                "  Total paid out: {} {}",
                format_amount(summary.total_paid_out),
                currency
            );
            println!(
                "  Platform fees: {} {}",
                format_amount(summary.total_platform_fees),
                currency
            );
        }

        Commands::Events { limit } => {
            let database = connect(&settings).await?;
            let events = database.recent_events(limit).await?;

            if events.is_empty() {
                println!("No webhook events recorded");
            } else {
                println!("Recent webhook events: {}\n", events.len());
            }

            for event in events {
                println!(
                    "  {} {} {} ({}) task={}",
                    event.received_at.format("%Y-%m-%d %H:%M:%S"),
                    event.provider,
                    event.event_type,
                    event.event_id,
                    event.task_id.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Providers => {
            let providers = settings.providers();
            let configured = [
                ("stripe", providers.stripe.is_some()),
                ("airwallex", providers.airwallex.is_some()),
                ("paypal", providers.paypal.is_some()),
            ];

            println!("Payment providers\n");
            for (name, is_configured) in configured {
                let marker = if name == settings.payment.provider.as_str() {
                    " (active)"
                } else {
                    ""
                };
                let status = if is_configured { "✓ configured" } else { "- not configured" };
                println!("  {:<10} {}{}", name, status, marker);
            }
            println!(
                "\n  Email notifications: {}",
                if settings.email.is_some() { "enabled" } else { "disabled" }
            );
        }
    }

    Ok(())
}

async fn connect(settings: &Settings) -> Result<Database> {
    match settings.database_url {
        Some(ref url) => Ok(Database::new(url).await?),
        None => {
            anyhow::bail!("No database URL provided. Set DATABASE_URL or TASKPAY__DATABASE_URL.")
        }
    }
}
