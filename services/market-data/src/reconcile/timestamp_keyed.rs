//! Timestamp-keyed price-level replacement diffs
//!
//! Diffs replace the volume at a price (`0` deletes) and carry the exchange
//! timestamp of the message they came in. The full book comes from a REST
//! snapshot fetched after the stream is already running, so:
//!
//! 1. Diffs are buffered by timestamp until a snapshot lands.
//! 2. A snapshot whose timestamp does not strictly exceed the first buffered
//!    diff is rejected; the connector fetches another one.
//! 3. On an accepted snapshot, buffered diffs newer than it are applied in
//!    ascending timestamp order; older or equal ones are stale and dropped.
//!
//! Polling feeds deliver a `FullSnapshot` every cycle; while live, each one
//! replaces the book wholesale.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use types::book::SequenceMarker;

use super::{apply_price_level, load_levels, ApplyOutcome, ReconciliationEngine};
use crate::events::{UpdateBatch, UpdateEvent};
use crate::order_book::PriceLevelBook;

/// Default cap on diffs buffered while awaiting the snapshot.
const DEFAULT_MAX_BACKLOG: usize = 50_000;

pub struct TimestampKeyedEngine {
    live: bool,
    resync: bool,
    /// Timestamp of the first diff seen since the last reset.
    first_diff_ts: Option<i64>,
    /// Timestamp of the snapshot currently backing the book.
    snapshot_ts: Option<i64>,
    /// Diffs received before the snapshot, keyed by message timestamp.
    backlog: BTreeMap<i64, Vec<UpdateEvent>>,
    buffered: usize,
    max_backlog: usize,
}

impl TimestampKeyedEngine {
    pub fn new() -> Self {
        Self::with_max_backlog(DEFAULT_MAX_BACKLOG)
    }

    pub fn with_max_backlog(max_backlog: usize) -> Self {
        Self {
            live: false,
            resync: false,
            first_diff_ts: None,
            snapshot_ts: None,
            backlog: BTreeMap::new(),
            buffered: 0,
            max_backlog: max_backlog.max(1),
        }
    }

    pub fn first_diff_timestamp(&self) -> Option<i64> {
        self.first_diff_ts
    }

    pub fn snapshot_timestamp(&self) -> Option<i64> {
        self.snapshot_ts
    }

    /// Number of diffs waiting for the snapshot.
    pub fn backlog_len(&self) -> usize {
        self.buffered
    }

    fn accept_snapshot(
        &mut self,
        book: &mut PriceLevelBook,
        event: &UpdateEvent,
    ) -> ApplyOutcome {
        let UpdateEvent::FullSnapshot { bids, asks, marker } = event else {
            return ApplyOutcome::Ignored;
        };
        let snapshot_ts = marker.as_timestamp();

        if !self.live {
            if let Some(first) = self.first_diff_ts {
                if snapshot_ts.map_or(true, |ts| ts <= first) {
                    warn!(
                        exchange = %book.exchange(),
                        snapshot_ts = ?snapshot_ts,
                        first_diff_ts = first,
                        "Snapshot not newer than first buffered diff, rejecting"
                    );
                    return ApplyOutcome::SnapshotRejected;
                }
            }
        }

        load_levels(book, bids, asks, *marker);
        self.snapshot_ts = snapshot_ts;

        if self.live {
            return ApplyOutcome::Applied;
        }
        self.live = true;

        let backlog = std::mem::take(&mut self.backlog);
        self.buffered = 0;
        let mut replayed = 0usize;
        let mut stale = 0usize;
        for (ts, diffs) in backlog {
            if snapshot_ts.is_some_and(|snap| ts <= snap) {
                stale += diffs.len();
                continue;
            }
            for diff in &diffs {
                apply_price_level(book, diff);
            }
            replayed += diffs.len();
            book.set_marker(SequenceMarker::Timestamp(ts));
        }

        info!(
            exchange = %book.exchange(),
            snapshot_ts = ?snapshot_ts,
            replayed,
            stale,
            "Snapshot applied, backlog drained"
        );
        ApplyOutcome::Applied
    }

    fn buffer(&mut self, ts: i64, event: UpdateEvent) -> ApplyOutcome {
        if self.buffered >= self.max_backlog {
            warn!(
                capacity = self.max_backlog,
                "Diff backlog overflowed before a snapshot arrived"
            );
            self.backlog.clear();
            self.buffered = 0;
            self.resync = true;
            return ApplyOutcome::ResyncRequired;
        }
        self.first_diff_ts.get_or_insert(ts);
        self.backlog.entry(ts).or_default().push(event);
        self.buffered += 1;
        ApplyOutcome::Buffered
    }
}

impl Default for TimestampKeyedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine for TimestampKeyedEngine {
    fn apply(&mut self, book: &mut PriceLevelBook, batch: UpdateBatch) -> ApplyOutcome {
        if self.resync {
            return ApplyOutcome::ResyncRequired;
        }

        let diff_ts = batch.marker.as_timestamp();
        let mut outcome = ApplyOutcome::Ignored;

        for event in batch.events {
            let step = match event {
                snapshot @ UpdateEvent::FullSnapshot { .. } => {
                    self.accept_snapshot(book, &snapshot)
                }
                diff @ (UpdateEvent::PriceLevelUpsert { .. }
                | UpdateEvent::PriceLevelDelete { .. }) => {
                    let Some(ts) = diff_ts else {
                        debug!("Diff without timestamp, ignoring");
                        continue;
                    };
                    if !self.live {
                        self.buffer(ts, diff)
                    } else if self.snapshot_ts.is_some_and(|snap| ts <= snap) {
                        ApplyOutcome::Ignored
                    } else {
                        apply_price_level(book, &diff);
                        book.set_marker(batch.marker);
                        ApplyOutcome::Applied
                    }
                }
                UpdateEvent::OrderLifecycle(_) => {
                    debug!("Order lifecycle event on a timestamp-keyed feed, ignoring");
                    ApplyOutcome::Ignored
                }
            };

            match step {
                ApplyOutcome::ResyncRequired | ApplyOutcome::SnapshotRejected => return step,
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
        self.resync
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn wants_bootstrap(&self) -> bool {
        !self.live && !self.resync && self.buffered > 0
    }

    fn reset(&mut self) {
        self.live = false;
        self.resync = false;
        self.first_diff_ts = None;
        self.snapshot_ts = None;
        self.backlog.clear();
        self.buffered = 0;
    }

    fn name(&self) -> &'static str {
        "timestamp_keyed"
    }
}
