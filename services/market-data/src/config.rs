//! Service configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! initialize_control_keys = true
//!
//! [sink]
//! kind = "redis"
//! url = "redis://127.0.0.1:6379"
//!
//! [[feeds]]
//! exchange = "bitstamp"
//! pair = "BTC/USD"
//!
//! [[feeds]]
//! exchange = "kraken"
//! pair = "BTC/EUR"
//! poll_interval_ms = 2000
//! ```
//!
//! Everything except the feed list has a default. Per-feed endpoints default
//! to the exchange's public URLs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::ids::{ExchangeId, Pair};

use crate::error::ConfigError;
use crate::exchanges::{ExchangeKind, Transport};

/// Where heartbeats, book caches and fan-out go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    #[default]
    Memory,
    Redis {
        url: String,
    },
}

/// One exchange + pair feed as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub exchange: ExchangeKind,
    pub pair: Pair,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Poll cadence for REST feeds (default per exchange).
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Minimum gap between fan-out messages.
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
    /// Last segment of the fan-out topic (default: `base_quote`).
    #[serde(default)]
    pub routing_tag: Option<String>,
}

fn default_publish_interval_ms() -> u64 {
    1_000
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub sink: SinkConfig,
    /// First reconnect delay after a stream drops.
    pub reconnect_initial_ms: u64,
    /// Cap for the doubling reconnect delay.
    pub reconnect_max_ms: u64,
    /// REST bootstrap attempts per resync before giving up on that attempt.
    pub bootstrap_attempts: u32,
    pub request_timeout_ms: u64,
    /// How often streaming feeds re-read their control key.
    pub control_check_interval_ms: u64,
    /// Set every feed's control key to "1" at startup.
    pub initialize_control_keys: bool,
    pub metrics_log_interval_secs: u64,
    pub feeds: Vec<FeedConfig>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::Memory,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 5_000,
            bootstrap_attempts: 5,
            request_timeout_ms: 10_000,
            control_check_interval_ms: 1_000,
            initialize_control_keys: true,
            metrics_log_interval_secs: 60,
            feeds: Vec::new(),
        }
    }
}

impl MarketDataConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid("no feeds configured".into()));
        }
        if self.reconnect_initial_ms == 0 || self.reconnect_initial_ms > self.reconnect_max_ms {
            return Err(ConfigError::Invalid(
                "reconnect_initial_ms must be in 1..=reconnect_max_ms".into(),
            ));
        }
        if self.bootstrap_attempts == 0 {
            return Err(ConfigError::Invalid("bootstrap_attempts must be positive".into()));
        }
        if self.control_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "control_check_interval_ms must be positive".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for feed in &self.feeds {
            // Sink keys are per exchange, so two feeds on one exchange would collide
            if !seen.insert(feed.exchange) {
                return Err(ConfigError::Invalid(format!(
                    "exchange {} configured twice",
                    feed.exchange
                )));
            }
        }
        Ok(())
    }

    /// Resolve every feed against the global settings and exchange defaults.
    pub fn resolve_feeds(&self) -> Result<Vec<FeedSettings>, ConfigError> {
        self.feeds.iter().map(|feed| self.resolve(feed)).collect()
    }

    fn resolve(&self, feed: &FeedConfig) -> Result<FeedSettings, ConfigError> {
        let settings = self.settings_for(feed);
        let missing = match settings.exchange.transport() {
            Transport::Stream if settings.ws_url.is_none() => Some("ws_url"),
            Transport::Poll if settings.rest_url.is_none() => Some("rest_url"),
            _ => None,
        };
        match missing {
            Some(field) => Err(ConfigError::MissingEndpoint {
                exchange: settings.exchange.to_string(),
                field,
            }),
            None => Ok(settings),
        }
    }

    fn settings_for(&self, feed: &FeedConfig) -> FeedSettings {
        let kind = feed.exchange;
        FeedSettings {
            exchange: kind,
            pair: feed.pair.clone(),
            ws_url: feed
                .ws_url
                .clone()
                .or_else(|| kind.default_ws_url().map(str::to_string)),
            rest_url: feed
                .rest_url
                .clone()
                .or_else(|| kind.default_rest_url().map(str::to_string)),
            poll_interval: feed
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| kind.default_poll_interval()),
            publish_interval: Duration::from_millis(feed.publish_interval_ms),
            routing_tag: feed
                .routing_tag
                .clone()
                .unwrap_or_else(|| feed.pair.routing_tag()),
            reconnect_initial: Duration::from_millis(self.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
            bootstrap_attempts: self.bootstrap_attempts,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            control_check_interval: Duration::from_millis(self.control_check_interval_ms),
        }
    }
}

/// Fully resolved settings for one connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    pub exchange: ExchangeKind,
    pub pair: Pair,
    pub ws_url: Option<String>,
    pub rest_url: Option<String>,
    pub poll_interval: Duration,
    pub publish_interval: Duration,
    pub routing_tag: String,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub bootstrap_attempts: u32,
    pub request_timeout: Duration,
    pub control_check_interval: Duration,
}

impl FeedSettings {
    /// Settings with exchange defaults and no config file.
    pub fn new(exchange: ExchangeKind, pair: Pair) -> Self {
        MarketDataConfig::default().settings_for(&FeedConfig {
            exchange,
            pair,
            ws_url: None,
            rest_url: None,
            poll_interval_ms: None,
            publish_interval_ms: default_publish_interval_ms(),
            routing_tag: None,
        })
    }

    pub fn exchange_id(&self) -> ExchangeId {
        self.exchange.id()
    }
}
