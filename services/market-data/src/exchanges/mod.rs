//! Exchange wire protocols
//!
//! One `ExchangeCodec` per exchange turns transport payloads into
//! `UpdateBatch`es and knows which reconciliation strategy and transport the
//! protocol needs. Codecs never touch a book.
//!
//! | Exchange | Transport | Engine | Bootstrap |
//! |----------|-----------|--------|-----------|
//! | coinbase | websocket `full` | order-keyed | REST level-3 book |
//! | bitstamp | websocket `diff_order_book` | timestamp-keyed | REST `order_book` |
//! | bitfinex | websocket `book` P0 | signed-volume | first stream message |
//! | kraken | REST `Depth` polling | timestamp-keyed | every poll is a full book |

mod bitfinex;
mod bitstamp;
mod coinbase;
mod kraken;

pub use bitfinex::BitfinexCodec;
pub use bitstamp::BitstampCodec;
pub use coinbase::CoinbaseCodec;
pub use kraken::KrakenCodec;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::ids::{ExchangeId, Pair};
use types::numeric::{parse_decimal_value, parse_volume};

use crate::error::{ConfigError, DecodeError};
use crate::events::{SnapshotEntry, UpdateBatch};
use crate::reconcile::EngineKind;

/// How a feed receives data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Persistent websocket connection.
    Stream,
    /// REST endpoint fetched on an interval.
    Poll,
}

/// One decoded stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Book updates; empty for acks, info events and heartbeats.
    Batch(UpdateBatch),
    /// The exchange asked the client to reconnect.
    Reconnect,
}

impl Decoded {
    pub fn control() -> Self {
        Decoded::Batch(UpdateBatch::empty())
    }
}

/// Exchange-specific message handling for one pair.
pub trait ExchangeCodec: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Text frames to send right after the stream opens.
    fn subscribe_messages(&self) -> Vec<String>;

    /// Decode one stream text frame.
    fn decode(&mut self, text: &str) -> Result<Decoded, DecodeError>;

    /// Full-book REST endpoint, if the protocol has one.
    fn snapshot_url(&self, rest_base: &str) -> Option<String>;

    /// Decode a full-book REST response.
    fn decode_snapshot(&self, body: &str) -> Result<UpdateBatch, DecodeError>;

    /// Forget per-connection state before reconnecting.
    fn reset(&mut self) {}
}

/// Supported exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Coinbase,
    Bitstamp,
    Bitfinex,
    Kraken,
}

impl ExchangeKind {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "coinbase" => Ok(ExchangeKind::Coinbase),
            "bitstamp" => Ok(ExchangeKind::Bitstamp),
            "bitfinex" => Ok(ExchangeKind::Bitfinex),
            "kraken" => Ok(ExchangeKind::Kraken),
            _ => Err(ConfigError::UnknownExchange(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Coinbase => "coinbase",
            ExchangeKind::Bitstamp => "bitstamp",
            ExchangeKind::Bitfinex => "bitfinex",
            ExchangeKind::Kraken => "kraken",
        }
    }

    pub fn id(&self) -> ExchangeId {
        ExchangeId::new(self.as_str())
    }

    pub fn engine_kind(&self) -> EngineKind {
        match self {
            ExchangeKind::Coinbase => EngineKind::OrderKeyed,
            ExchangeKind::Bitstamp | ExchangeKind::Kraken => EngineKind::TimestampKeyed,
            ExchangeKind::Bitfinex => EngineKind::SignedVolume,
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            ExchangeKind::Kraken => Transport::Poll,
            _ => Transport::Stream,
        }
    }

    pub fn default_ws_url(&self) -> Option<&'static str> {
        match self {
            ExchangeKind::Coinbase => Some("wss://ws-feed.exchange.coinbase.com"),
            ExchangeKind::Bitstamp => Some("wss://ws.bitstamp.net"),
            ExchangeKind::Bitfinex => Some("wss://api-pub.bitfinex.com/ws/2"),
            ExchangeKind::Kraken => None,
        }
    }

    pub fn default_rest_url(&self) -> Option<&'static str> {
        match self {
            ExchangeKind::Coinbase => Some("https://api.exchange.coinbase.com"),
            ExchangeKind::Bitstamp => Some("https://www.bitstamp.net"),
            ExchangeKind::Bitfinex => None,
            ExchangeKind::Kraken => Some("https://api.kraken.com"),
        }
    }

    pub fn default_poll_interval(&self) -> Duration {
        match self {
            ExchangeKind::Kraken => Duration::from_secs(2),
            _ => Duration::from_secs(1),
        }
    }

    /// Build the codec for one pair.
    pub fn codec(&self, pair: &Pair) -> Box<dyn ExchangeCodec> {
        match self {
            ExchangeKind::Coinbase => Box::new(CoinbaseCodec::new(pair)),
            ExchangeKind::Bitstamp => Box::new(BitstampCodec::new(pair)),
            ExchangeKind::Bitfinex => Box::new(BitfinexCodec::new(pair)),
            ExchangeKind::Kraken => Box::new(KrakenCodec::new(pair)),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn field<'a>(value: &'a Value, name: &'static str) -> Result<&'a Value, DecodeError> {
    value.get(name).ok_or(DecodeError::MissingField(name))
}

fn str_field<'a>(value: &'a Value, name: &'static str) -> Result<&'a str, DecodeError> {
    field(value, name)?
        .as_str()
        .ok_or_else(|| DecodeError::UnexpectedShape(format!("`{name}` is not a string")))
}

/// Parse `[[price, volume, (order_id | timestamp)?], ...]`.
///
/// With `with_order_id`, a third element is kept as the order id.
fn parse_levels(
    value: &Value,
    name: &'static str,
    with_order_id: bool,
) -> Result<Vec<SnapshotEntry>, DecodeError> {
    let rows = field(value, name)?
        .as_array()
        .ok_or_else(|| DecodeError::UnexpectedShape(format!("`{name}` is not an array")))?;

    rows.iter()
        .map(|row| {
            let row = row
                .as_array()
                .filter(|r| r.len() >= 2)
                .ok_or_else(|| DecodeError::UnexpectedShape(format!("bad level in `{name}`")))?;
            let price = parse_decimal_value(&row[0])?;
            let volume = match &row[1] {
                Value::String(s) => parse_volume(s)?,
                other => parse_volume(&other.to_string())?,
            };
            let order_id = if with_order_id {
                row.get(2).and_then(Value::as_str).map(str::to_string)
            } else {
                None
            };
            Ok(SnapshotEntry {
                price,
                volume,
                order_id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exchange_kind_parse() {
        assert_eq!(ExchangeKind::parse("Coinbase").unwrap(), ExchangeKind::Coinbase);
        assert!(matches!(
            ExchangeKind::parse("mtgox"),
            Err(ConfigError::UnknownExchange(_))
        ));
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(ExchangeKind::Coinbase.engine_kind(), EngineKind::OrderKeyed);
        assert_eq!(ExchangeKind::Bitstamp.engine_kind(), EngineKind::TimestampKeyed);
        assert_eq!(ExchangeKind::Bitfinex.engine_kind(), EngineKind::SignedVolume);
        assert_eq!(ExchangeKind::Kraken.transport(), Transport::Poll);
        assert_eq!(ExchangeKind::Bitstamp.transport(), Transport::Stream);
    }

    #[test]
    fn test_parse_levels() {
        let value = json!({"bids": [["100.5", "1", "abc"], [99, 2]]});
        let levels = parse_levels(&value, "bids", true).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].order_id.as_deref(), Some("abc"));
        assert_eq!(levels[1].volume, rust_decimal::Decimal::from(2));
    }

    #[test]
    fn test_parse_levels_rejects_negative_volume() {
        let value = json!({"asks": [["100", "-1"]]});
        assert!(parse_levels(&value, "asks", false).is_err());
    }

    #[test]
    fn test_parse_levels_missing_field() {
        assert_eq!(
            parse_levels(&json!({}), "bids", false),
            Err(DecodeError::MissingField("bids"))
        );
    }
}
