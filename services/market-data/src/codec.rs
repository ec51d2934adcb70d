//! Book cache / fan-out JSON encoding
//!
//! Wire shape shared by the `{exchange}_orderbook` cache key and the fan-out
//! channel:
//!
//! ```json
//! {"timestamp": 1700000000000, "bids": [["100.5", "1.2", ""]], "asks": [...]}
//! ```
//!
//! `timestamp` is epoch milliseconds. Prices and volumes are decimal strings
//! so no precision is lost on the way through the sink. The third element of
//! each level is a free-form annotation, empty when unused.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::book::{BookSnapshot, PriceLevel, SequenceMarker};
use types::ids::{ExchangeId, Pair};

use crate::error::DecodeError;

/// One `[price, volume, tag]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLevel(pub Decimal, pub Decimal, #[serde(default)] pub String);

impl CachedLevel {
    pub fn as_level(&self) -> PriceLevel {
        PriceLevel::new(self.0, self.1)
    }
}

impl From<&PriceLevel> for CachedLevel {
    fn from(level: &PriceLevel) -> Self {
        CachedLevel(level.price, level.volume, String::new())
    }
}

/// Decoded cache payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBook {
    pub timestamp: i64,
    pub bids: Vec<CachedLevel>,
    pub asks: Vec<CachedLevel>,
}

impl CachedBook {
    pub fn from_snapshot(snapshot: &BookSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp_ms,
            bids: snapshot.bids.iter().map(CachedLevel::from).collect(),
            asks: snapshot.asks.iter().map(CachedLevel::from).collect(),
        }
    }

    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids.iter().map(CachedLevel::as_level).collect()
    }

    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks.iter().map(CachedLevel::as_level).collect()
    }

    /// Rebuild a snapshot for the given exchange and pair.
    ///
    /// Levels are re-sorted: the payload may come from another writer.
    pub fn into_snapshot(self, exchange: ExchangeId, pair: Pair) -> BookSnapshot {
        let mut bids = self.bid_levels();
        let mut asks = self.ask_levels();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        BookSnapshot::new(exchange, pair, bids, asks, SequenceMarker::None, self.timestamp)
    }
}

/// Encode a snapshot as cache JSON.
pub fn encode_book(snapshot: &BookSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&CachedBook::from_snapshot(snapshot))
}

/// Decode cache JSON.
pub fn decode_book(payload: &str) -> Result<CachedBook, DecodeError> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn make_snapshot() -> BookSnapshot {
        BookSnapshot::new(
            ExchangeId::new("kraken"),
            Pair::parse("BTC/EUR").unwrap(),
            vec![
                PriceLevel::new(dec("100.25"), dec("1.5")),
                PriceLevel::new(dec("99.999999"), dec("0.00000001")),
            ],
            vec![PriceLevel::new(dec("101"), dec("3"))],
            SequenceMarker::None,
            1_700_000_000_123,
        )
    }

    #[test]
    fn test_encode_shape() {
        let json = encode_book(&make_snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["bids"][0][0], "100.25");
        assert_eq!(value["bids"][0][1], "1.5");
        assert_eq!(value["bids"][0][2], "");
        assert_eq!(value["asks"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_decode_reproduces_levels() {
        let snapshot = make_snapshot();
        let decoded = decode_book(&encode_book(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded.bid_levels(), snapshot.bids);
        assert_eq!(decoded.ask_levels(), snapshot.asks);
        assert_eq!(decoded.timestamp, snapshot.timestamp_ms);
    }

    #[test]
    fn test_decode_without_tag() {
        let decoded =
            decode_book(r#"{"timestamp": 5, "bids": [["1", "2"]], "asks": []}"#).unwrap();
        assert_eq!(decoded.bids[0], CachedLevel(dec("1"), dec("2"), String::new()));
    }

    #[test]
    fn test_into_snapshot_sorts_levels() {
        let cached = CachedBook {
            timestamp: 1,
            bids: vec![
                CachedLevel(dec("99"), dec("1"), String::new()),
                CachedLevel(dec("100"), dec("1"), String::new()),
            ],
            asks: vec![
                CachedLevel(dec("102"), dec("1"), String::new()),
                CachedLevel(dec("101"), dec("1"), String::new()),
            ],
        };
        let snap = cached.into_snapshot(ExchangeId::new("x"), Pair::parse("BTC/USD").unwrap());
        assert!(snap.is_well_ordered());
        assert_eq!(snap.best_bid().unwrap().price, dec("100"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_book("not json"), Err(DecodeError::Json(_))));
    }
}
