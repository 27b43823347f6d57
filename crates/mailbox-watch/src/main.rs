use anyhow::Result;
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailbox_watch::{lifecycle, EwsClient, MailboxWatcher, RunOutcome, WatchConfig, WatchOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailbox_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let started_at = Utc::now();

    dotenvy::dotenv().ok();
    let config = match WatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return Ok(());
        }
    };

    let client = match EwsClient::connect(&config.ews) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to connect: {}", e);
            return Ok(());
        }
    };

    let watcher = MailboxWatcher::new(client, config.criteria(started_at));
    let report = lifecycle::run(watcher, &config.limits).await;

    match &report.outcome {
        RunOutcome::Completed(WatchOutcome::Found(items)) => {
            tracing::info!("Found {} matching items", items.len())
        }
        RunOutcome::Completed(outcome) => tracing::info!("Watch finished: {:?}", outcome),
        RunOutcome::TimedOut => tracing::info!("Watch timed out"),
        RunOutcome::Failed(e) => tracing::error!("Watch failed: {}", e),
    }
    tracing::debug!("Shutdown: {:?}", report.shutdown);

    Ok(())
}
