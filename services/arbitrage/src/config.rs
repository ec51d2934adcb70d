//! Cross monitor configuration
//!
//! ```toml
//! pair = "BTC/USD"
//! exchanges = ["bitstamp", "coinbase", "bitfinex"]
//! interval_ms = 1000
//!
//! [sink]
//! kind = "redis"
//! url = "redis://127.0.0.1:6379"
//!
//! [fees]
//! bitstamp = "0.005"
//! coinbase = "0.006"
//!
//! [[rates]]
//! from = "EUR"
//! to = "USD"
//! rate = "1.08"
//! ```
//!
//! Decimal values are strings.

use std::path::Path;
use std::time::Duration;

use market_data::config::SinkConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::currency::{Currency, ExchangeRates};
use types::fee::FeeSchedule;
use types::ids::{ExchangeId, Pair};

use crate::detector::CrossDetector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub from: Currency,
    pub to: Currency,
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossMonitorConfig {
    #[serde(default)]
    pub sink: SinkConfig,
    pub pair: Pair,
    pub exchanges: Vec<ExchangeId>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Books whose heartbeat is older than this are skipped.
    #[serde(default = "default_max_heartbeat_age_secs")]
    pub max_heartbeat_age_secs: i64,
    #[serde(default)]
    pub include_unprofitable: bool,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub rates: Vec<RateConfig>,
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_max_heartbeat_age_secs() -> i64 {
    10
}

impl CrossMonitorConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        if config.exchanges.len() < 2 {
            anyhow::bail!("at least two exchanges are needed to detect crosses");
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn exchange_rates(&self) -> ExchangeRates {
        let mut rates = ExchangeRates::new();
        for rate in &self.rates {
            rates.insert(rate.from.clone(), rate.to.clone(), rate.rate);
        }
        rates
    }

    pub fn detector(&self) -> CrossDetector {
        CrossDetector::new(self.fees.clone(), self.exchange_rates())
            .with_unprofitable(self.include_unprofitable)
    }
}
