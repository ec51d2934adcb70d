use std::sync::Arc;

use anyhow::Context;
use arbitrage::config::CrossMonitorConfig;
use arbitrage::monitor::load_books;
use market_data::config::SinkConfig;
use market_data::redis_sink::RedisSink;
use market_data::sink::{InMemorySink, MarketSink};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::var("CROSS_MONITOR_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| "cross-monitor.toml".to_string());
    let config = CrossMonitorConfig::load(&path).with_context(|| format!("loading {path}"))?;

    let sink: Arc<dyn MarketSink> = match &config.sink {
        SinkConfig::Memory => Arc::new(InMemorySink::new()),
        SinkConfig::Redis { url } => Arc::new(RedisSink::connect(url).await.context("connecting to sink")?),
    };
    let detector = config.detector();

    tracing::info!(
        pair = %config.pair,
        exchanges = config.exchanges.len(),
        "Starting cross monitor"
    );

    let mut ticker = tokio::time::interval(config.interval());
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Shutdown requested");
                return Ok(());
            }
            _ = ticker.tick() => {
                let now = chrono::Utc::now().timestamp();
                let books = load_books(
                    sink.as_ref(),
                    &config.exchanges,
                    &config.pair,
                    config.max_heartbeat_age_secs,
                    now,
                )
                .await;
                if books.len() < 2 {
                    tracing::debug!(live = books.len(), "Not enough live books");
                    continue;
                }

                match detector.detect_crosses_between_many(&books) {
                    Ok(crosses) => {
                        for cross in &crosses {
                            tracing::info!(
                                buy = %cross.buy_exchange,
                                sell = %cross.sell_exchange,
                                volume = %cross.volume,
                                revenue = %cross.revenue,
                                fees = %cross.fees,
                                profit = %cross.profit(),
                                "Cross detected"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Cross detection failed"),
                }
            }
        }
    }
}
