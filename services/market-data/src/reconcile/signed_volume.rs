//! Unkeyed signed-volume diffs
//!
//! Each wire entry is `(price, count, amount)` where the sign of `amount`
//! names the side: positive is a bid, negative an ask of `abs(amount)`.
//! The protocol is ambiguous about `amount == 0`; it is read as "remove the
//! price from both sides". `count == 0` with a non-zero amount removes the
//! price from the side the sign names.
//!
//! The first message after subscribing is the full book, applied as diffs
//! against an empty book. Diffs that arrive before it are dropped.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::book::SequenceMarker;
use types::order::Side;

use super::{apply_price_level, load_levels, ApplyOutcome, ReconciliationEngine};
use crate::events::{SnapshotEntry, UpdateBatch, UpdateEvent};
use crate::order_book::PriceLevelBook;

/// One raw `(price, count, amount)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLevel {
    pub price: Decimal,
    pub count: u64,
    pub amount: Decimal,
}

impl SignedLevel {
    pub fn new(price: Decimal, count: u64, amount: Decimal) -> Self {
        Self {
            price,
            count,
            amount,
        }
    }

    /// Expand into the common price-level events.
    pub fn to_events(&self) -> Vec<UpdateEvent> {
        let price = self.price;
        if self.amount.is_zero() {
            return vec![
                UpdateEvent::PriceLevelDelete {
                    side: Side::BUY,
                    price,
                },
                UpdateEvent::PriceLevelDelete {
                    side: Side::SELL,
                    price,
                },
            ];
        }

        let side = if self.amount > Decimal::ZERO {
            Side::BUY
        } else {
            Side::SELL
        };
        if self.count == 0 {
            vec![UpdateEvent::PriceLevelDelete { side, price }]
        } else {
            vec![UpdateEvent::PriceLevelUpsert {
                side,
                price,
                volume: self.amount.abs(),
            }]
        }
    }

    /// Build a full snapshot batch by applying `levels` to an empty book.
    pub fn snapshot_batch(levels: &[SignedLevel]) -> UpdateBatch {
        let mut bids: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        let mut asks: BTreeMap<Decimal, Decimal> = BTreeMap::new();

        for event in levels.iter().flat_map(SignedLevel::to_events) {
            match event {
                UpdateEvent::PriceLevelUpsert {
                    side: Side::BUY,
                    price,
                    volume,
                } => {
                    bids.insert(price, volume);
                }
                UpdateEvent::PriceLevelUpsert {
                    side: Side::SELL,
                    price,
                    volume,
                } => {
                    asks.insert(price, volume);
                }
                UpdateEvent::PriceLevelDelete { side: Side::BUY, price } => {
                    bids.remove(&price);
                }
                UpdateEvent::PriceLevelDelete {
                    side: Side::SELL,
                    price,
                } => {
                    asks.remove(&price);
                }
                _ => {}
            }
        }

        let bids = bids
            .into_iter()
            .rev()
            .map(|(p, v)| SnapshotEntry::level(p, v))
            .collect();
        let asks = asks
            .into_iter()
            .map(|(p, v)| SnapshotEntry::level(p, v))
            .collect();
        UpdateBatch::snapshot(bids, asks, SequenceMarker::None)
    }

    /// Build a diff batch from one or more entries.
    pub fn diff_batch(levels: &[SignedLevel]) -> UpdateBatch {
        UpdateBatch::new(
            SequenceMarker::None,
            levels.iter().flat_map(SignedLevel::to_events).collect(),
        )
    }
}

pub struct SignedVolumeEngine {
    live: bool,
}

impl SignedVolumeEngine {
    pub fn new() -> Self {
        Self { live: false }
    }
}

impl Default for SignedVolumeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine for SignedVolumeEngine {
    fn apply(&mut self, book: &mut PriceLevelBook, batch: UpdateBatch) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::Ignored;

        for event in batch.events {
            match event {
                UpdateEvent::FullSnapshot { bids, asks, marker } => {
                    load_levels(book, &bids, &asks, marker);
                    self.live = true;
                    outcome = ApplyOutcome::Applied;
                }
                UpdateEvent::OrderLifecycle(_) => {
                    debug!("Order lifecycle event on a signed-volume feed, ignoring");
                }
                diff if self.live => {
                    if apply_price_level(book, &diff) {
                        outcome = ApplyOutcome::Applied;
                    }
                }
                diff => {
                    debug!(
                        event_type = diff.event_type_label(),
                        "Diff before snapshot, ignoring"
                    );
                }
            }
        }
        outcome
    }

    fn needs_resync(&self) -> bool {
        false
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn wants_bootstrap(&self) -> bool {
        false
    }

    fn reset(&mut self) {
        self.live = false;
    }

    fn name(&self) -> &'static str {
        "signed_volume"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{ExchangeId, Pair};

    fn make_book() -> PriceLevelBook {
        PriceLevelBook::new(ExchangeId::new("bitfinex"), Pair::parse("BTC/USD").unwrap())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn level(price: &str, count: u64, amount: &str) -> SignedLevel {
        SignedLevel::new(dec(price), count, dec(amount))
    }

    fn live_engine(book: &mut PriceLevelBook) -> SignedVolumeEngine {
        let mut engine = SignedVolumeEngine::new();
        let snapshot = SignedLevel::snapshot_batch(&[
            level("100", 2, "1.5"),
            level("99", 1, "2"),
            level("101", 1, "-0.5"),
            level("102", 3, "-4"),
        ]);
        assert_eq!(engine.apply(book, snapshot), ApplyOutcome::Applied);
        engine
    }

    #[test]
    fn test_sign_selects_side() {
        let bid = level("100", 1, "2").to_events();
        assert_eq!(
            bid,
            vec![UpdateEvent::PriceLevelUpsert {
                side: Side::BUY,
                price: dec("100"),
                volume: dec("2"),
            }]
        );

        let ask = level("101", 1, "-3").to_events();
        assert_eq!(
            ask,
            vec![UpdateEvent::PriceLevelUpsert {
                side: Side::SELL,
                price: dec("101"),
                volume: dec("3"),
            }]
        );
    }

    #[test]
    fn test_snapshot_builds_sorted_book() {
        let mut book = make_book();
        let engine = live_engine(&mut book);
        assert!(engine.is_live());

        let bids = book.bid_levels();
        let asks = book.ask_levels();
        assert_eq!(bids[0].price, dec("100"));
        assert_eq!(bids[1].price, dec("99"));
        assert_eq!(asks[0].price, dec("101"));
        assert_eq!(asks[1].volume, dec("4"));
    }

    #[test]
    fn test_zero_amount_clears_both_sides() {
        let mut book = make_book();
        let mut engine = live_engine(&mut book);
        book.set_level(Side::SELL, dec("100"), dec("1"));

        engine.apply(&mut book, SignedLevel::diff_batch(&[level("100", 0, "0")]));
        assert_eq!(book.level(Side::BUY, dec("100")), None);
        assert_eq!(book.level(Side::SELL, dec("100")), None);
    }

    #[test]
    fn test_zero_count_deletes_signed_side() {
        let mut book = make_book();
        let mut engine = live_engine(&mut book);

        engine.apply(&mut book, SignedLevel::diff_batch(&[level("102", 0, "-1")]));
        assert_eq!(book.level(Side::SELL, dec("102")), None);
        assert_eq!(book.level(Side::BUY, dec("99")), Some(dec("2")));
    }

    #[test]
    fn test_update_replaces_volume() {
        let mut book = make_book();
        let mut engine = live_engine(&mut book);

        let outcome = engine.apply(&mut book, SignedLevel::diff_batch(&[level("99", 4, "7.25")]));
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(book.level(Side::BUY, dec("99")), Some(dec("7.25")));
    }

    #[test]
    fn test_diffs_before_snapshot_ignored() {
        let mut book = make_book();
        let mut engine = SignedVolumeEngine::new();

        let outcome = engine.apply(&mut book, SignedLevel::diff_batch(&[level("99", 1, "1")]));
        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert!(book.is_empty());
        assert!(!engine.is_live());
    }

    #[test]
    fn test_snapshot_with_zero_entries_has_no_empty_levels() {
        let batch = SignedLevel::snapshot_batch(&[level("100", 1, "1"), level("100", 0, "0")]);
        let mut book = make_book();
        let mut engine = SignedVolumeEngine::new();
        engine.apply(&mut book, batch);
        assert!(book.is_empty());
        assert!(engine.is_live());
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut book = make_book();
        let mut engine = live_engine(&mut book);
        let first = (book.bid_levels(), book.ask_levels());

        engine.apply(&mut book, SignedLevel::diff_batch(&[level("98", 1, "3")]));
        let again = SignedLevel::snapshot_batch(&[
            level("100", 2, "1.5"),
            level("99", 1, "2"),
            level("101", 1, "-0.5"),
            level("102", 3, "-4"),
        ]);
        assert_eq!(engine.apply(&mut book, again.clone()), ApplyOutcome::Applied);
        assert_eq!((book.bid_levels(), book.ask_levels()), first);
        engine.apply(&mut book, again);
        assert_eq!((book.bid_levels(), book.ask_levels()), first);
    }

    #[test]
    fn test_reset() {
        let mut book = make_book();
        let mut engine = live_engine(&mut book);
        engine.reset();
        assert!(!engine.is_live());
    }
}
