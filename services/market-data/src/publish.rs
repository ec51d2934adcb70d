//! Fan-out gating
//!
//! Decides whether a reconciled book is sent on the fan-out channel:
//!
//! - unchanged content (same side/price/volume as the last published book)
//!   is never re-sent;
//! - at most one message per `min_interval`;
//! - a change held back by the interval stays pending, and the connector
//!   re-evaluates it at `next_flush_at()` even if nothing else arrives.
//!
//! The gate only governs fan-out. The book cache and the liveness key are
//! written every cycle regardless.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use types::book::BookSnapshot;

/// Why a book was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Same levels as the last published book.
    Unchanged,
    /// Changed, but the minimum interval has not elapsed; now pending.
    Throttled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    Publish,
    Suppress(SuppressReason),
}

pub struct PublishGate {
    min_interval: Duration,
    last_published: Option<Arc<BookSnapshot>>,
    last_publish_at: Option<Instant>,
    pending: bool,
}

impl PublishGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_published: None,
            last_publish_at: None,
            pending: false,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide on `snapshot`. A `Publish` decision records it as published.
    pub fn evaluate(&mut self, snapshot: &Arc<BookSnapshot>, now: Instant) -> PublishDecision {
        let changed = self
            .last_published
            .as_ref()
            .map_or(true, |last| !last.same_levels(snapshot));
        if !changed {
            self.pending = false;
            return PublishDecision::Suppress(SuppressReason::Unchanged);
        }

        if let Some(at) = self.last_publish_at {
            if now.saturating_duration_since(at) < self.min_interval {
                self.pending = true;
                return PublishDecision::Suppress(SuppressReason::Throttled);
            }
        }

        self.last_published = Some(Arc::clone(snapshot));
        self.last_publish_at = Some(now);
        self.pending = false;
        PublishDecision::Publish
    }

    /// Whether a throttled change is waiting to go out.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// When a pending change may be published.
    pub fn next_flush_at(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_publish_at.map(|at| at + self.min_interval)
    }

    pub fn last_published(&self) -> Option<&Arc<BookSnapshot>> {
        self.last_published.as_ref()
    }
}

impl Default for PublishGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::book::{PriceLevel, SequenceMarker};
    use types::ids::{ExchangeId, Pair};

    fn book(bid: i64, timestamp_ms: i64) -> Arc<BookSnapshot> {
        Arc::new(BookSnapshot::new(
            ExchangeId::new("bitstamp"),
            Pair::parse("BTC/USD").unwrap(),
            vec![PriceLevel::new(Decimal::from(bid), Decimal::ONE)],
            vec![PriceLevel::new(Decimal::from(bid + 1), Decimal::ONE)],
            SequenceMarker::None,
            timestamp_ms,
        ))
    }

    #[test]
    fn test_first_book_publishes() {
        let mut gate = PublishGate::default();
        assert_eq!(gate.evaluate(&book(100, 0), Instant::now()), PublishDecision::Publish);
    }

    #[test]
    fn test_unchanged_suppressed() {
        let mut gate = PublishGate::default();
        let now = Instant::now();
        gate.evaluate(&book(100, 0), now);

        // Different timestamp, same levels
        assert_eq!(
            gate.evaluate(&book(100, 5000), now + Duration::from_secs(10)),
            PublishDecision::Suppress(SuppressReason::Unchanged)
        );
        assert!(!gate.has_pending());
    }

    #[test]
    fn test_throttled_change_is_pending() {
        let mut gate = PublishGate::new(Duration::from_secs(1));
        let start = Instant::now();
        gate.evaluate(&book(100, 0), start);

        let decision = gate.evaluate(&book(101, 1), start + Duration::from_millis(300));
        assert_eq!(decision, PublishDecision::Suppress(SuppressReason::Throttled));
        assert!(gate.has_pending());
        assert_eq!(gate.next_flush_at(), Some(start + Duration::from_secs(1)));

        let decision = gate.evaluate(&book(101, 1), start + Duration::from_secs(1));
        assert_eq!(decision, PublishDecision::Publish);
        assert!(!gate.has_pending());
        assert_eq!(gate.next_flush_at(), None);
    }

    #[test]
    fn test_revert_clears_pending() {
        let mut gate = PublishGate::new(Duration::from_secs(1));
        let start = Instant::now();
        gate.evaluate(&book(100, 0), start);
        gate.evaluate(&book(101, 0), start + Duration::from_millis(100));
        assert!(gate.has_pending());

        gate.evaluate(&book(100, 0), start + Duration::from_millis(200));
        assert!(!gate.has_pending());
    }

    #[test]
    fn test_one_publish_per_change() {
        let mut gate = PublishGate::new(Duration::ZERO);
        let now = Instant::now();
        let mut published = 0;
        for bid in [100, 100, 101, 101, 101, 102] {
            if gate.evaluate(&book(bid, 0), now) == PublishDecision::Publish {
                published += 1;
            }
        }
        assert_eq!(published, 3);
    }
}
