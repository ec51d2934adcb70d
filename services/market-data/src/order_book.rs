//! In-memory price-level order book
//!
//! Maintains one exchange's book for one pair while its feed is reconciled.
//! Uses `BTreeMap` keyed by price so both sides stay sorted as levels are
//! inserted and removed; nothing is ever re-sorted from scratch.
//! All arithmetic uses `Decimal`.
//!
//! A level whose volume drops to zero (or below) is removed immediately, so
//! the map never holds a zero-volume level and no price can appear twice on
//! one side.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use types::book::{BookSnapshot, PriceLevel, SequenceMarker};
use types::ids::{ExchangeId, Pair};
use types::order::Side;

/// Live order book for a single exchange and pair.
///
/// Bids are exposed in descending price order (best bid first).
/// Asks are exposed in ascending price order (best ask first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevelBook {
    exchange: ExchangeId,
    pair: Pair,
    /// Bid levels: price → volume (BTreeMap sorts ascending, we reverse for best-bid-first).
    bids: BTreeMap<Decimal, Decimal>,
    /// Ask levels: price → volume (ascending = best ask first).
    asks: BTreeMap<Decimal, Decimal>,
    /// Protocol-specific position of the last applied update.
    marker: SequenceMarker,
}

impl PriceLevelBook {
    /// Create an empty book.
    pub fn new(exchange: ExchangeId, pair: Pair) -> Self {
        Self {
            exchange,
            pair,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            marker: SequenceMarker::None,
        }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn marker(&self) -> SequenceMarker {
        self.marker
    }

    pub fn set_marker(&mut self, marker: SequenceMarker) {
        self.marker = marker;
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, Decimal> {
        match side {
            Side::BUY => &mut self.bids,
            Side::SELL => &mut self.asks,
        }
    }

    fn side(&self, side: Side) -> &BTreeMap<Decimal, Decimal> {
        match side {
            Side::BUY => &self.bids,
            Side::SELL => &self.asks,
        }
    }

    /// Replace the total volume at a price. Zero or negative volume removes the level.
    pub fn set_level(&mut self, side: Side, price: Decimal, volume: Decimal) {
        let levels = self.side_mut(side);
        if volume <= Decimal::ZERO {
            levels.remove(&price);
        } else {
            levels.insert(price, volume);
        }
    }

    /// Remove a price level. Returns the volume that was resting there.
    pub fn remove_level(&mut self, side: Side, price: Decimal) -> Option<Decimal> {
        self.side_mut(side).remove(&price)
    }

    /// Add `delta` (possibly negative) to the volume at a price.
    ///
    /// Returns the resulting volume; the level is removed once it reaches zero.
    pub fn adjust_level(&mut self, side: Side, price: Decimal, delta: Decimal) -> Decimal {
        let levels = self.side_mut(side);
        let current = levels.get(&price).copied().unwrap_or(Decimal::ZERO);
        let updated = current + delta;
        if updated <= Decimal::ZERO {
            levels.remove(&price);
            Decimal::ZERO
        } else {
            levels.insert(price, updated);
            updated
        }
    }

    /// Volume resting at a price, if the level exists.
    pub fn level(&self, side: Side, price: Decimal) -> Option<Decimal> {
        self.side(side).get(&price).copied()
    }

    /// Drop all levels and the sequence marker.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.marker = SequenceMarker::None;
    }

    /// Replace the whole book with the given levels.
    ///
    /// Levels for the same price are summed; zero-volume entries are skipped.
    pub fn replace(
        &mut self,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
        marker: SequenceMarker,
    ) {
        self.clear();
        for level in bids {
            self.adjust_level(Side::BUY, level.price, level.volume);
        }
        for level in asks {
            self.adjust_level(Side::SELL, level.price, level.volume);
        }
        self.marker = marker;
    }

    /// Current best bid level.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, v)| PriceLevel::new(*p, *v))
    }

    /// Current best ask level.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.iter().next().map(|(p, v)| PriceLevel::new(*p, *v))
    }

    /// Get the spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Whether the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        matches!(self.spread(), Some(spread) if spread <= Decimal::ZERO)
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get all bid levels (descending price order).
    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .rev()
            .map(|(p, v)| PriceLevel::new(*p, *v))
            .collect()
    }

    /// Get all ask levels (ascending price order).
    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .map(|(p, v)| PriceLevel::new(*p, *v))
            .collect()
    }

    /// Copy the book into an immutable snapshot.
    pub fn snapshot(&self, timestamp_ms: i64) -> BookSnapshot {
        BookSnapshot::new(
            self.exchange.clone(),
            self.pair.clone(),
            self.bid_levels(),
            self.ask_levels(),
            self.marker,
            timestamp_ms,
        )
    }
}
