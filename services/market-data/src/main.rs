use std::time::Duration;

use anyhow::Context;
use market_data::{MarketDataConfig, Supervisor, SERVICE_VERSION};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::var("MARKET_DATA_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| "market-data.toml".to_string());

    tracing::info!(version = SERVICE_VERSION, config = %path, "Starting market data service");

    let config = MarketDataConfig::load(&path).with_context(|| format!("loading {path}"))?;
    let feeds = config.resolve_feeds()?;

    let mut supervisor = Supervisor::from_config(&config)
        .await
        .context("connecting to sink")?;
    supervisor.start(feeds).await?;

    let mut metrics_tick =
        tokio::time::interval(Duration::from_secs(config.metrics_log_interval_secs.max(1)));
    metrics_tick.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Shutdown requested");
                break;
            }
            _ = metrics_tick.tick() => {
                for feed in supervisor.feeds() {
                    tracing::info!(
                        exchange = %feed.exchange,
                        pair = %feed.pair,
                        metrics = ?feed.metrics.export(),
                        "Feed metrics"
                    );
                }
                if supervisor.running() == 0 {
                    tracing::warn!("No feeds running, exiting");
                    break;
                }
            }
        }
    }

    supervisor.stop().await;
    Ok(())
}
