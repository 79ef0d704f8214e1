//! Transfer engine server binary

use transfer_core::{Config, TransferEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting CoreBank transfer server");

    // Load configuration
    let config = Config::from_env()?;
    let metrics_addr = config.metrics_listen_addr.clone();

    // Open engine
    let engine = TransferEngine::open(config).await?;
    let stats = engine.stats()?;
    tracing::info!(
        accounts = stats.total_accounts,
        transactions = stats.total_transactions,
        entries = stats.total_entries,
        metrics_addr = %metrics_addr,
        "Transfer engine ready"
    );

    // Transport lives in the hosting service; run until interrupted
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down transfer server");
    engine.shutdown().await?;
    Ok(())
}
