//! Update events decoded from exchange wire messages
//!
//! Every exchange codec turns transport messages into `UpdateBatch`es: one
//! batch per wire message, carrying the message's sequence marker and the
//! `UpdateEvent`s it contained. Reconciliation engines consume batches and
//! never see raw wire data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::book::{PriceLevel, SequenceMarker};
use types::order::Side;

/// One resting entry in a full snapshot.
///
/// Price-keyed protocols leave `order_id` empty; order-keyed protocols carry
/// one entry per resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub price: Decimal,
    pub volume: Decimal,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl SnapshotEntry {
    pub fn level(price: Decimal, volume: Decimal) -> Self {
        Self {
            price,
            volume,
            order_id: None,
        }
    }

    pub fn order(price: Decimal, volume: Decimal, order_id: impl Into<String>) -> Self {
        Self {
            price,
            volume,
            order_id: Some(order_id.into()),
        }
    }

    pub fn as_level(&self) -> PriceLevel {
        PriceLevel::new(self.price, self.volume)
    }
}

/// Lifecycle stage of an exchange-assigned order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleKind {
    /// Order accepted by the matching engine, not yet resting
    Received,
    /// Order is now resting on the book
    Open,
    /// Order left the book (filled or canceled)
    Done,
    /// Resting order's remaining volume changed
    Change,
    /// Resting (maker) order was partially or fully traded against
    Match,
}

/// A single order-keyed diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLifecycle {
    pub kind: LifecycleKind,
    pub sequence: u64,
    pub order_id: String,
    pub side: Side,
    /// Price of the order; absent for market orders and some `done` messages
    pub price: Option<Decimal>,
    /// Remaining volume (`open`, `done`, `change`), order size (`received`)
    /// or traded size (`match`)
    pub volume: Option<Decimal>,
}

/// Common update event produced by every exchange codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum UpdateEvent {
    /// Full point-in-time book
    FullSnapshot {
        bids: Vec<SnapshotEntry>,
        asks: Vec<SnapshotEntry>,
        marker: SequenceMarker,
    },
    /// Replace the volume at a price (zero deletes)
    PriceLevelUpsert {
        side: Side,
        price: Decimal,
        volume: Decimal,
    },
    /// Remove a price level
    PriceLevelDelete { side: Side, price: Decimal },
    /// Order-keyed diff
    OrderLifecycle(OrderLifecycle),
}

impl UpdateEvent {
    /// Get the event type as a string label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self {
            UpdateEvent::FullSnapshot { .. } => "FullSnapshot",
            UpdateEvent::PriceLevelUpsert { .. } => "PriceLevelUpsert",
            UpdateEvent::PriceLevelDelete { .. } => "PriceLevelDelete",
            UpdateEvent::OrderLifecycle(_) => "OrderLifecycle",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, UpdateEvent::FullSnapshot { .. })
    }
}

/// Events decoded from one wire message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateBatch {
    pub marker: SequenceMarker,
    pub events: Vec<UpdateEvent>,
}

impl UpdateBatch {
    pub fn new(marker: SequenceMarker, events: Vec<UpdateEvent>) -> Self {
        Self { marker, events }
    }

    /// Batch carrying no book changes (heartbeats, acks)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Batch holding a single full snapshot
    pub fn snapshot(bids: Vec<SnapshotEntry>, asks: Vec<SnapshotEntry>, marker: SequenceMarker) -> Self {
        Self {
            marker,
            events: vec![UpdateEvent::FullSnapshot { bids, asks, marker }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains_snapshot(&self) -> bool {
        self.events.iter().any(UpdateEvent::is_snapshot)
    }
}
