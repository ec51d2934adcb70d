//! Sequence-numbered, order-id keyed reconciliation
//!
//! States: `AwaitingSnapshot → Live → (on gap) Resyncing → AwaitingSnapshot`.
//!
//! - Until the full book arrives, lifecycle events are held in a backlog keyed
//!   by sequence and are not applied to price levels.
//! - On the snapshot, backlog events at or before the snapshot sequence are
//!   discarded and the rest are replayed in sequence order.
//! - While live, an event is accepted only if its sequence is exactly
//!   `current + 1`, or it is the first event after the snapshot. Anything
//!   else is a gap: the book is discarded and `needs_resync()` turns true.
//!
//! A level's volume is the sum of the live orders resting at that price; the
//! order table lives here, not in the book, so publishing compares levels
//! only.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use types::book::SequenceMarker;
use types::order::Side;

use super::{ApplyOutcome, ReconciliationEngine};
use crate::events::{LifecycleKind, OrderLifecycle, SnapshotEntry, UpdateBatch, UpdateEvent};
use crate::order_book::PriceLevelBook;

/// Default cap on events held while awaiting the snapshot.
const DEFAULT_MAX_BACKLOG: usize = 50_000;

/// Lifecycle of the order-keyed engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    AwaitingSnapshot,
    Live,
    Resyncing,
}

/// An order that is on the book.
#[derive(Debug, Clone)]
struct RestingOrder {
    side: Side,
    price: Decimal,
    volume: Decimal,
}

/// An order that was received but has not opened yet.
#[derive(Debug, Clone)]
struct PendingOrder {
    price: Option<Decimal>,
    volume: Option<Decimal>,
}

pub struct OrderKeyedEngine {
    state: EngineState,
    /// Sequence of the last accepted event; `None` right after a snapshot.
    current_sequence: Option<u64>,
    /// Sequence the snapshot was taken at.
    snapshot_sequence: Option<u64>,
    /// Orders seen as `received` but not yet `open`.
    received: HashMap<String, PendingOrder>,
    /// Orders resting on the book.
    orders: HashMap<String, RestingOrder>,
    /// Events buffered before the snapshot, keyed by sequence.
    backlog: BTreeMap<u64, OrderLifecycle>,
    max_backlog: usize,
}

impl OrderKeyedEngine {
    pub fn new() -> Self {
        Self::with_max_backlog(DEFAULT_MAX_BACKLOG)
    }

    pub fn with_max_backlog(max_backlog: usize) -> Self {
        Self {
            state: EngineState::AwaitingSnapshot,
            current_sequence: None,
            snapshot_sequence: None,
            received: HashMap::new(),
            orders: HashMap::new(),
            backlog: BTreeMap::new(),
            max_backlog: max_backlog.max(1),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_sequence(&self) -> Option<u64> {
        self.current_sequence
    }

    /// Number of orders currently resting on the book.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of events waiting for the snapshot.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Hold an event until the snapshot lands. A full backlog would lose
    /// sequence continuity, so overflow discards everything and resyncs.
    fn buffer(&mut self, book: &mut PriceLevelBook, event: OrderLifecycle) -> ApplyOutcome {
        if self.backlog.len() >= self.max_backlog && !self.backlog.contains_key(&event.sequence) {
            warn!(
                exchange = %book.exchange(),
                sequence = event.sequence,
                capacity = self.max_backlog,
                "Backlog overflowed before a snapshot arrived"
            );
            self.discard(book);
            return ApplyOutcome::ResyncRequired;
        }
        self.backlog.insert(event.sequence, event);
        ApplyOutcome::Buffered
    }

    fn load_snapshot(
        &mut self,
        book: &mut PriceLevelBook,
        bids: Vec<SnapshotEntry>,
        asks: Vec<SnapshotEntry>,
        marker: SequenceMarker,
    ) -> ApplyOutcome {
        book.clear();
        self.orders.clear();
        self.received.clear();

        for (side, entries) in [(Side::BUY, bids), (Side::SELL, asks)] {
            for entry in entries {
                if entry.volume <= Decimal::ZERO {
                    continue;
                }
                book.adjust_level(side, entry.price, entry.volume);
                if let Some(order_id) = entry.order_id {
                    let previous = self.orders.insert(
                        order_id,
                        RestingOrder {
                            side,
                            price: entry.price,
                            volume: entry.volume,
                        },
                    );
                    if let Some(previous) = previous {
                        book.adjust_level(previous.side, previous.price, -previous.volume);
                    }
                }
            }
        }

        book.set_marker(marker);
        self.snapshot_sequence = marker.as_sequence();
        self.current_sequence = None;
        self.state = EngineState::Live;

        info!(
            exchange = %book.exchange(),
            snapshot_sequence = ?self.snapshot_sequence,
            orders = self.orders.len(),
            backlog = self.backlog.len(),
            "Order book snapshot loaded"
        );

        let backlog = std::mem::take(&mut self.backlog);
        for (_, event) in backlog {
            if self.process(book, event) == ApplyOutcome::ResyncRequired {
                return ApplyOutcome::ResyncRequired;
            }
        }
        ApplyOutcome::Applied
    }

    /// Validate the sequence of a live event and fold it onto the book.
    fn process(&mut self, book: &mut PriceLevelBook, event: OrderLifecycle) -> ApplyOutcome {
        match self.current_sequence {
            None => {
                if let Some(snapshot_seq) = self.snapshot_sequence {
                    if event.sequence <= snapshot_seq {
                        debug!(
                            sequence = event.sequence,
                            snapshot_sequence = snapshot_seq,
                            "Dropping event already covered by snapshot"
                        );
                        return ApplyOutcome::Ignored;
                    }
                }
            }
            Some(current) => {
                if event.sequence != current + 1 {
                    warn!(
                        exchange = %book.exchange(),
                        expected = current + 1,
                        actual = event.sequence,
                        "Sequence gap detected, discarding book"
                    );
                    self.discard(book);
                    return ApplyOutcome::ResyncRequired;
                }
            }
        }

        self.current_sequence = Some(event.sequence);
        book.set_marker(SequenceMarker::Sequence(event.sequence));
        self.apply_lifecycle(book, event);
        ApplyOutcome::Applied
    }

    fn apply_lifecycle(&mut self, book: &mut PriceLevelBook, event: OrderLifecycle) {
        match event.kind {
            LifecycleKind::Received => {
                self.received.insert(
                    event.order_id,
                    PendingOrder {
                        price: event.price,
                        volume: event.volume,
                    },
                );
            }
            LifecycleKind::Open => {
                let pending = self.received.remove(&event.order_id);
                let price = event
                    .price
                    .or_else(|| pending.as_ref().and_then(|p| p.price));
                let volume = event
                    .volume
                    .or_else(|| pending.as_ref().and_then(|p| p.volume));

                let (Some(price), Some(volume)) = (price, volume) else {
                    debug!(order_id = %event.order_id, "Open without price or volume, ignoring");
                    return;
                };
                if volume <= Decimal::ZERO {
                    return;
                }
                if let Some(previous) = self.orders.insert(
                    event.order_id,
                    RestingOrder {
                        side: event.side,
                        price,
                        volume,
                    },
                ) {
                    book.adjust_level(previous.side, previous.price, -previous.volume);
                }
                book.adjust_level(event.side, price, volume);
            }
            LifecycleKind::Done => {
                self.received.remove(&event.order_id);
                if let Some(order) = self.orders.remove(&event.order_id) {
                    book.adjust_level(order.side, order.price, -order.volume);
                }
            }
            LifecycleKind::Change => {
                let Some(new_volume) = event.volume else {
                    return;
                };
                if let Some(order) = self.orders.get_mut(&event.order_id) {
                    let delta = new_volume - order.volume;
                    order.volume = new_volume;
                    book.adjust_level(order.side, order.price, delta);
                } else if let Some(pending) = self.received.get_mut(&event.order_id) {
                    pending.volume = Some(new_volume);
                }
            }
            LifecycleKind::Match => {
                let Some(size) = event.volume else {
                    return;
                };
                if let Some(order) = self.orders.get_mut(&event.order_id) {
                    let traded = size.min(order.volume);
                    order.volume -= traded;
                    book.adjust_level(order.side, order.price, -traded);
                }
            }
        }
    }

    fn discard(&mut self, book: &mut PriceLevelBook) {
        book.clear();
        self.orders.clear();
        self.received.clear();
        self.backlog.clear();
        self.current_sequence = None;
        self.snapshot_sequence = None;
        self.state = EngineState::Resyncing;
    }
}

impl Default for OrderKeyedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine for OrderKeyedEngine {
    fn apply(&mut self, book: &mut PriceLevelBook, batch: UpdateBatch) -> ApplyOutcome {
        if self.state == EngineState::Resyncing {
            return ApplyOutcome::ResyncRequired;
        }

        let mut outcome = ApplyOutcome::Ignored;
        for event in batch.events {
            let step = match event {
                UpdateEvent::FullSnapshot { bids, asks, marker } => {
                    self.load_snapshot(book, bids, asks, marker)
                }
                UpdateEvent::OrderLifecycle(lifecycle) => match self.state {
                    EngineState::AwaitingSnapshot => self.buffer(book, lifecycle),
                    _ => self.process(book, lifecycle),
                },
                other => {
                    debug!(
                        event_type = other.event_type_label(),
                        "Price-level event on an order-keyed feed, ignoring"
                    );
                    ApplyOutcome::Ignored
                }
            };

            match step {
                ApplyOutcome::ResyncRequired => return ApplyOutcome::ResyncRequired,
                ApplyOutcome::Applied => outcome = ApplyOutcome::Applied,
                ApplyOutcome::Buffered if outcome == ApplyOutcome::Ignored => {
                    outcome = ApplyOutcome::Buffered
                }
                _ => {}
            }
        }
        outcome
    }

    fn needs_resync(&self) -> bool {
        self.state == EngineState::Resyncing
    }

    fn is_live(&self) -> bool {
        self.state == EngineState::Live
    }

    fn wants_bootstrap(&self) -> bool {
        self.state == EngineState::AwaitingSnapshot && !self.backlog.is_empty()
    }

    fn reset(&mut self) {
        self.received.clear();
        self.orders.clear();
        self.backlog.clear();
        self.current_sequence = None;
        self.snapshot_sequence = None;
        self.state = EngineState::AwaitingSnapshot;
    }

    fn name(&self) -> &'static str {
        "order_keyed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{ExchangeId, Pair};

    fn make_book() -> PriceLevelBook {
        PriceLevelBook::new(ExchangeId::new("coinbase"), Pair::parse("BTC/USD").unwrap())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn lifecycle(
        kind: LifecycleKind,
        sequence: u64,
        order_id: &str,
        side: Side,
        price: Option<&str>,
        volume: Option<&str>,
    ) -> UpdateBatch {
        UpdateBatch::new(
            SequenceMarker::Sequence(sequence),
            vec![UpdateEvent::OrderLifecycle(OrderLifecycle {
                kind,
                sequence,
                order_id: order_id.to_string(),
                side,
                price: price.map(dec),
                volume: volume.map(dec),
            })],
        )
    }

    fn open(sequence: u64, order_id: &str, side: Side, price: &str, volume: &str) -> UpdateBatch {
        lifecycle(LifecycleKind::Open, sequence, order_id, side, Some(price), Some(volume))
    }

    fn snapshot(sequence: u64) -> UpdateBatch {
        UpdateBatch::snapshot(
            vec![SnapshotEntry::order(dec("100"), dec("1"), "bid-1")],
            vec![SnapshotEntry::order(dec("101"), dec("2"), "ask-1")],
            SequenceMarker::Sequence(sequence),
        )
    }

    #[test]
    fn test_buffers_until_snapshot() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();

        let outcome = engine.apply(&mut book, open(5, "x", Side::BUY, "99", "1"));
        assert_eq!(outcome, ApplyOutcome::Buffered);
        assert!(book.is_empty());
        assert!(engine.wants_bootstrap());
        assert_eq!(engine.backlog_len(), 1);
    }

    #[test]
    fn test_snapshot_loads_orders() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();

        assert_eq!(engine.apply(&mut book, snapshot(10)), ApplyOutcome::Applied);
        assert!(engine.is_live());
        assert_eq!(engine.order_count(), 2);
        assert_eq!(book.level(Side::BUY, dec("100")), Some(dec("1")));
        assert_eq!(book.level(Side::SELL, dec("101")), Some(dec("2")));
    }

    #[test]
    fn test_backlog_replayed_after_snapshot() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();

        // Stale: covered by the snapshot at sequence 10
        engine.apply(&mut book, open(9, "old", Side::BUY, "98", "5"));
        engine.apply(&mut book, open(11, "new", Side::BUY, "99", "3"));
        engine.apply(&mut book, snapshot(10));

        assert_eq!(book.level(Side::BUY, dec("98")), None);
        assert_eq!(book.level(Side::BUY, dec("99")), Some(dec("3")));
        assert_eq!(engine.current_sequence(), Some(11));
    }

    #[test]
    fn test_sequence_gap_discards_book() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));

        assert_eq!(
            engine.apply(&mut book, open(1, "a", Side::BUY, "99", "1")),
            ApplyOutcome::Applied
        );
        assert_eq!(
            engine.apply(&mut book, open(2, "b", Side::SELL, "102", "1")),
            ApplyOutcome::Applied
        );
        assert!(!engine.needs_resync());

        let outcome = engine.apply(&mut book, open(4, "c", Side::BUY, "98", "7"));
        assert_eq!(outcome, ApplyOutcome::ResyncRequired);
        assert!(engine.needs_resync());
        assert!(book.is_empty());
        assert_eq!(book.level(Side::BUY, dec("98")), None);
        assert_eq!(engine.state(), EngineState::Resyncing);
    }

    #[test]
    fn test_resyncing_rejects_further_events() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));
        engine.apply(&mut book, open(1, "a", Side::BUY, "99", "1"));
        engine.apply(&mut book, open(3, "b", Side::BUY, "98", "1"));

        let outcome = engine.apply(&mut book, open(4, "c", Side::BUY, "97", "1"));
        assert_eq!(outcome, ApplyOutcome::ResyncRequired);
        assert!(book.is_empty());
    }

    #[test]
    fn test_first_event_after_snapshot_may_skip() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(10));

        // First event after the snapshot establishes the baseline
        assert_eq!(
            engine.apply(&mut book, open(15, "a", Side::BUY, "99", "1")),
            ApplyOutcome::Applied
        );
        assert_eq!(
            engine.apply(&mut book, open(16, "b", Side::BUY, "98", "1")),
            ApplyOutcome::Applied
        );
        assert!(!engine.needs_resync());
    }

    #[test]
    fn test_received_then_open() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));

        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Received, 1, "r", Side::SELL, Some("105"), Some("2")),
        );
        assert_eq!(book.level(Side::SELL, dec("105")), None);

        // Open without price falls back to the received order
        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Open, 2, "r", Side::SELL, None, Some("1.5")),
        );
        assert_eq!(book.level(Side::SELL, dec("105")), Some(dec("1.5")));
    }

    #[test]
    fn test_done_removes_order() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));

        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Done, 1, "bid-1", Side::BUY, Some("100"), Some("0")),
        );
        assert_eq!(book.level(Side::BUY, dec("100")), None);
        assert_eq!(engine.order_count(), 1);
    }

    #[test]
    fn test_change_updates_volume_in_place() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));

        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Change, 1, "ask-1", Side::SELL, Some("101"), Some("0.5")),
        );
        assert_eq!(book.level(Side::SELL, dec("101")), Some(dec("0.5")));
    }

    #[test]
    fn test_orders_sharing_a_price_sum() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));

        engine.apply(&mut book, open(1, "a", Side::BUY, "100", "2"));
        engine.apply(&mut book, open(2, "b", Side::BUY, "100", "0.5"));
        assert_eq!(book.level(Side::BUY, dec("100")), Some(dec("3.5")));

        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Done, 3, "a", Side::BUY, None, None),
        );
        assert_eq!(book.level(Side::BUY, dec("100")), Some(dec("1.5")));
    }

    #[test]
    fn test_match_reduces_maker() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));

        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Match, 1, "ask-1", Side::SELL, Some("101"), Some("0.75")),
        );
        assert_eq!(book.level(Side::SELL, dec("101")), Some(dec("1.25")));
    }

    #[test]
    fn test_reset_returns_to_awaiting_snapshot() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        engine.apply(&mut book, snapshot(0));
        engine.apply(&mut book, open(1, "a", Side::BUY, "99", "1"));
        engine.apply(&mut book, open(3, "b", Side::BUY, "98", "1"));
        assert!(engine.needs_resync());

        engine.reset();
        assert_eq!(engine.state(), EngineState::AwaitingSnapshot);
        assert!(!engine.needs_resync());
        assert_eq!(engine.order_count(), 0);
    }

    #[test]
    fn test_backlog_overflow_forces_resync() {
        let mut engine = OrderKeyedEngine::with_max_backlog(2);
        let mut book = make_book();
        assert_eq!(
            engine.apply(&mut book, open(11, "a", Side::BUY, "97", "1")),
            ApplyOutcome::Buffered
        );
        assert_eq!(
            engine.apply(&mut book, open(12, "b", Side::BUY, "98", "1")),
            ApplyOutcome::Buffered
        );
        assert_eq!(
            engine.apply(&mut book, open(13, "c", Side::BUY, "99", "1")),
            ApplyOutcome::ResyncRequired
        );
        assert!(engine.needs_resync());
        assert_eq!(engine.backlog_len(), 0);

        // A snapshot cannot revive the engine with an incomplete backlog.
        assert_eq!(engine.apply(&mut book, snapshot(10)), ApplyOutcome::ResyncRequired);
        assert!(!engine.is_live());
        assert!(book.is_empty());

        engine.reset();
        assert_eq!(engine.state(), EngineState::AwaitingSnapshot);
    }

    #[test]
    fn test_duplicate_sequence_fits_full_backlog() {
        let mut engine = OrderKeyedEngine::with_max_backlog(1);
        let mut book = make_book();
        engine.apply(&mut book, open(11, "a", Side::BUY, "97", "1"));
        assert_eq!(
            engine.apply(&mut book, open(11, "a", Side::BUY, "97", "1")),
            ApplyOutcome::Buffered
        );
        assert!(!engine.needs_resync());
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();

        engine.apply(&mut book, snapshot(10));
        engine.apply(&mut book, open(11, "x", Side::BUY, "99", "3"));
        engine.apply(&mut book, snapshot(10));
        let first = (book.bid_levels(), book.ask_levels(), engine.order_count());

        engine.apply(&mut book, snapshot(10));
        let second = (book.bid_levels(), book.ask_levels(), engine.order_count());

        assert_eq!(first, second);
        assert_eq!(engine.order_count(), 2);
        assert_eq!(book.level(Side::BUY, dec("100")), Some(dec("1")));
        assert_eq!(book.level(Side::BUY, dec("99")), None);
        assert_eq!(book.level(Side::SELL, dec("101")), Some(dec("2")));
    }

    #[test]
    fn test_repeated_order_id_in_snapshot_counted_once() {
        let mut engine = OrderKeyedEngine::new();
        let mut book = make_book();
        let batch = UpdateBatch::snapshot(
            vec![
                SnapshotEntry::order(dec("100"), dec("1"), "bid-1"),
                SnapshotEntry::order(dec("100"), dec("1"), "bid-1"),
            ],
            vec![],
            SequenceMarker::Sequence(10),
        );
        engine.apply(&mut book, batch);

        assert_eq!(engine.order_count(), 1);
        assert_eq!(book.level(Side::BUY, dec("100")), Some(dec("1")));

        // Closing the order must leave nothing behind.
        engine.apply(
            &mut book,
            lifecycle(LifecycleKind::Done, 11, "bid-1", Side::BUY, None, None),
        );
        assert_eq!(book.level(Side::BUY, dec("100")), None);
    }
}
