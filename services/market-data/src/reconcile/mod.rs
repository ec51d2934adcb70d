//! Reconciliation engines
//!
//! Each exchange protocol folds its updates onto a `PriceLevelBook` through
//! one `ReconciliationEngine` strategy:
//!
//! - [`OrderKeyedEngine`]: sequence-numbered, order-id keyed diffs
//! - [`TimestampKeyedEngine`]: timestamp-keyed price-level replacements with
//!   REST snapshot bootstrap and backlog
//! - [`SignedVolumeEngine`]: unkeyed `(price, count, signed volume)` diffs
//!
//! Engines never surface consistency problems as errors. A gap or stale state
//! is a state transition: the engine discards the book and reports
//! `needs_resync()`, and the connector restarts the feed from scratch.

mod order_keyed;
mod signed_volume;
mod timestamp_keyed;

pub use order_keyed::{EngineState, OrderKeyedEngine};
pub use signed_volume::{SignedLevel, SignedVolumeEngine};
pub use timestamp_keyed::TimestampKeyedEngine;

use serde::{Deserialize, Serialize};

use types::book::SequenceMarker;

use crate::events::{SnapshotEntry, UpdateBatch, UpdateEvent};
use crate::order_book::PriceLevelBook;

/// Result of applying one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Book was updated.
    Applied,
    /// Batch held back until a snapshot arrives.
    Buffered,
    /// Batch carried nothing applicable (stale or empty).
    Ignored,
    /// Snapshot was older than in-flight diffs; fetch another.
    SnapshotRejected,
    /// Book was discarded; the feed must be restarted.
    ResyncRequired,
}

/// Protocol-specific state machine folding updates onto a book.
pub trait ReconciliationEngine: Send + Sync {
    /// Apply one decoded wire message to the book.
    fn apply(&mut self, book: &mut PriceLevelBook, batch: UpdateBatch) -> ApplyOutcome;

    /// Whether the book has been discarded and the feed must restart.
    fn needs_resync(&self) -> bool;

    /// Whether a snapshot has been applied and the book tracks the exchange.
    fn is_live(&self) -> bool;

    /// Whether the engine is waiting on a REST snapshot to bootstrap.
    ///
    /// True once diffs have been buffered and no snapshot has landed.
    fn wants_bootstrap(&self) -> bool;

    /// Drop all sequence state and backlog, returning to the initial state.
    fn reset(&mut self);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Which strategy an exchange's protocol needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    OrderKeyed,
    TimestampKeyed,
    SignedVolume,
}

impl EngineKind {
    /// Build a fresh engine of this kind.
    pub fn build(&self) -> Box<dyn ReconciliationEngine> {
        match self {
            EngineKind::OrderKeyed => Box::new(OrderKeyedEngine::new()),
            EngineKind::TimestampKeyed => Box::new(TimestampKeyedEngine::new()),
            EngineKind::SignedVolume => Box::new(SignedVolumeEngine::new()),
        }
    }
}

/// Fold one price-level event onto the book. Returns false for other kinds.
fn apply_price_level(book: &mut PriceLevelBook, event: &UpdateEvent) -> bool {
    match event {
        UpdateEvent::PriceLevelUpsert {
            side,
            price,
            volume,
        } => {
            book.set_level(*side, *price, *volume);
            true
        }
        UpdateEvent::PriceLevelDelete { side, price } => {
            book.remove_level(*side, *price);
            true
        }
        _ => false,
    }
}

/// Replace the whole book from snapshot entries, ignoring order ids.
fn load_levels(
    book: &mut PriceLevelBook,
    bids: &[SnapshotEntry],
    asks: &[SnapshotEntry],
    marker: SequenceMarker,
) {
    book.replace(
        bids.iter().map(SnapshotEntry::as_level),
        asks.iter().map(SnapshotEntry::as_level),
        marker,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_build() {
        assert_eq!(EngineKind::OrderKeyed.build().name(), "order_keyed");
        assert_eq!(EngineKind::TimestampKeyed.build().name(), "timestamp_keyed");
        assert_eq!(EngineKind::SignedVolume.build().name(), "signed_volume");
    }

    #[test]
    fn test_fresh_engines_are_not_live() {
        for kind in [
            EngineKind::OrderKeyed,
            EngineKind::TimestampKeyed,
            EngineKind::SignedVolume,
        ] {
            let engine = kind.build();
            assert!(!engine.is_live());
            assert!(!engine.needs_resync());
            assert!(!engine.wants_bootstrap());
        }
    }
}
