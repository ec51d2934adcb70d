//! Immutable order book snapshots
//!
//! `BookSnapshot` is the shareable, read-only form of a reconciled book. The
//! live book is owned by its feed connector; everything downstream (sink
//! encoding, cross detection) works on snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Money};
use crate::ids::{ExchangeId, Pair};
use crate::order::Side;

/// A single (price, volume) level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }

    /// Notional value of the level (price * volume)
    pub fn notional(&self) -> Decimal {
        self.price * self.volume
    }
}

/// Protocol-specific position of a book in its feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SequenceMarker {
    /// Protocol carries no ordering information
    #[default]
    None,
    /// Exchange-assigned sequence number
    Sequence(u64),
    /// Exchange timestamp in microseconds
    Timestamp(i64),
}

impl SequenceMarker {
    pub fn as_sequence(&self) -> Option<u64> {
        match self {
            SequenceMarker::Sequence(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            SequenceMarker::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// Point-in-time copy of one exchange's book for one pair
///
/// Bids are in descending price order (best first).
/// Asks are in ascending price order (best first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub exchange: ExchangeId,
    pub pair: Pair,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub marker: SequenceMarker,
    /// Unix milliseconds when the snapshot was taken
    pub timestamp_ms: i64,
}

impl BookSnapshot {
    /// Build a snapshot from already-ordered levels, dropping zero-volume entries
    pub fn new(
        exchange: ExchangeId,
        pair: Pair,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        marker: SequenceMarker,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            exchange,
            pair,
            bids: bids.into_iter().filter(|l| l.volume > Decimal::ZERO).collect(),
            asks: asks.into_iter().filter(|l| l.volume > Decimal::ZERO).collect(),
            marker,
            timestamp_ms,
        }
    }

    /// Currency volumes are denominated in
    pub fn volume_currency(&self) -> &Currency {
        self.pair.base()
    }

    /// Currency prices are denominated in
    pub fn price_currency(&self) -> &Currency {
        self.pair.quote()
    }

    pub fn levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::BUY => &self.bids,
            Side::SELL => &self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Mid-market price as Money in the price currency
    pub fn mid_price(&self) -> Option<Money> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(Money::new(
                (bid.price + ask.price) / Decimal::from(2),
                self.price_currency().clone(),
            )),
            _ => None,
        }
    }

    /// Whether the best bid is at or above the best ask
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Whether both sides are strictly monotonic in their sort order
    pub fn is_well_ordered(&self) -> bool {
        self.bids.windows(2).all(|w| w[0].price > w[1].price)
            && self.asks.windows(2).all(|w| w[0].price < w[1].price)
    }

    /// Compare level content only (side, price, volume)
    pub fn same_levels(&self, other: &BookSnapshot) -> bool {
        self.bids == other.bids && self.asks == other.asks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: i64, volume: i64) -> PriceLevel {
        PriceLevel::new(Decimal::from(price), Decimal::from(volume))
    }

    fn snapshot(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> BookSnapshot {
        BookSnapshot::new(
            ExchangeId::new("bitstamp"),
            Pair::parse("BTC/USD").unwrap(),
            bids,
            asks,
            SequenceMarker::None,
            0,
        )
    }

    #[test]
    fn test_snapshot_filters_zero_volume() {
        let snap = snapshot(vec![level(100, 1), level(99, 0)], vec![level(101, 0)]);
        assert_eq!(snap.bids.len(), 1);
        assert!(snap.asks.is_empty());
    }

    #[test]
    fn test_mid_price_and_currencies() {
        let snap = snapshot(vec![level(100, 1)], vec![level(102, 1)]);
        let mid = snap.mid_price().unwrap();
        assert_eq!(mid.amount, Decimal::from(101));
        assert_eq!(mid.currency.as_str(), "USD");
        assert_eq!(snap.volume_currency().as_str(), "BTC");
    }

    #[test]
    fn test_crossed_detection() {
        assert!(snapshot(vec![level(101, 1)], vec![level(100, 1)]).is_crossed());
        assert!(!snapshot(vec![level(99, 1)], vec![level(100, 1)]).is_crossed());
        assert!(!snapshot(vec![], vec![level(100, 1)]).is_crossed());
    }

    #[test]
    fn test_well_ordered() {
        assert!(snapshot(vec![level(100, 1), level(99, 1)], vec![level(101, 1), level(102, 1)])
            .is_well_ordered());
        assert!(!snapshot(vec![level(99, 1), level(100, 1)], vec![]).is_well_ordered());
    }

    #[test]
    fn test_sequence_marker_accessors() {
        assert_eq!(SequenceMarker::Sequence(7).as_sequence(), Some(7));
        assert_eq!(SequenceMarker::Timestamp(9).as_timestamp(), Some(9));
        assert_eq!(SequenceMarker::None.as_sequence(), None);
    }
}
