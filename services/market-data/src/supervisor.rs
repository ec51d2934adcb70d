//! Feed supervision
//!
//! Spawns one connector task per configured feed, shares a single sink
//! between them and owns the shutdown signal. Feeds are isolated: a feed
//! that stops (operator cleared its control key, missing endpoint) does not
//! affect the others.
//!
//! Each feed exposes its latest live book through a `watch` channel, so
//! in-process readers such as the cross detector always see a complete,
//! immutable `Arc<BookSnapshot>` and never a half-applied update.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use types::book::BookSnapshot;
use types::ids::{ExchangeId, Pair};

use crate::config::{FeedSettings, MarketDataConfig, SinkConfig};
use crate::connector::FeedConnector;
use crate::error::{FeedResult, SinkError};
use crate::metrics::FeedMetrics;
use crate::redis_sink::RedisSink;
use crate::sink::{control_key, InMemorySink, MarketSink};

/// Read side of one running feed.
#[derive(Clone)]
pub struct FeedHandle {
    pub exchange: ExchangeId,
    pub pair: Pair,
    pub metrics: Arc<FeedMetrics>,
    pub snapshots: watch::Receiver<Arc<BookSnapshot>>,
}

impl FeedHandle {
    /// Latest live book; empty until the feed first goes live.
    pub fn latest(&self) -> Arc<BookSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// False once the connector task has exited.
    pub fn is_running(&self) -> bool {
        self.snapshots.has_changed().is_ok()
    }
}

pub struct Supervisor {
    sink: Arc<dyn MarketSink>,
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
    feeds: Vec<FeedHandle>,
    initialize_control_keys: bool,
}

impl Supervisor {
    pub fn new(sink: Arc<dyn MarketSink>, initialize_control_keys: bool) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sink,
            shutdown,
            tasks: JoinSet::new(),
            feeds: Vec::new(),
            initialize_control_keys,
        }
    }

    /// Build the sink described by `config`.
    pub async fn from_config(config: &MarketDataConfig) -> Result<Self, SinkError> {
        let sink: Arc<dyn MarketSink> = match &config.sink {
            SinkConfig::Memory => Arc::new(InMemorySink::new()),
            SinkConfig::Redis { url } => Arc::new(RedisSink::connect(url).await?),
        };
        Ok(Self::new(sink, config.initialize_control_keys))
    }

    /// Enable and spawn every feed.
    pub async fn start(&mut self, feeds: Vec<FeedSettings>) -> FeedResult<()> {
        for settings in feeds {
            self.spawn(settings).await?;
        }
        info!(feeds = self.feeds.len(), "All feeds started");
        Ok(())
    }

    async fn spawn(&mut self, settings: FeedSettings) -> FeedResult<()> {
        let exchange = settings.exchange_id();
        if self.initialize_control_keys {
            self.sink.set(&control_key(&exchange), "1").await?;
        }

        let metrics = Arc::new(FeedMetrics::new());
        let connector = FeedConnector::new(
            settings,
            Arc::clone(&self.sink),
            Arc::clone(&metrics),
            self.shutdown.subscribe(),
        );
        self.feeds.push(FeedHandle {
            exchange: exchange.clone(),
            pair: connector.settings().pair.clone(),
            metrics,
            snapshots: connector.subscribe(),
        });
        self.tasks.spawn(connector.run());
        info!(exchange = %exchange, "Feed spawned");
        Ok(())
    }

    pub fn feeds(&self) -> &[FeedHandle] {
        &self.feeds
    }

    /// Latest live book of one exchange.
    pub fn snapshot(&self, exchange: &ExchangeId) -> Option<Arc<BookSnapshot>> {
        self.feeds
            .iter()
            .find(|feed| &feed.exchange == exchange)
            .map(FeedHandle::latest)
    }

    /// Latest live book of every feed.
    pub fn snapshots(&self) -> Vec<Arc<BookSnapshot>> {
        self.feeds.iter().map(FeedHandle::latest).collect()
    }

    pub fn sink(&self) -> Arc<dyn MarketSink> {
        Arc::clone(&self.sink)
    }

    /// Number of connectors still running.
    pub fn running(&self) -> usize {
        self.feeds.iter().filter(|feed| feed.is_running()).count()
    }

    /// Signal shutdown and wait for every connector to clear its liveness key.
    pub async fn stop(mut self) {
        info!("Stopping feeds");
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Feed task ended abnormally");
            }
        }
        info!("All feeds stopped");
    }
}
