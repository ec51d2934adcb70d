//! Per-feed counters
//!
//! One `FeedMetrics` is shared (`Arc`) between a connector task and the
//! supervisor. Counters are relaxed atomics; the binary logs an `export()`
//! of every feed periodically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters for one exchange feed.
pub struct FeedMetrics {
    // Transport
    pub messages_processed: AtomicU64,
    pub decode_errors: AtomicU64,
    pub reconnects: AtomicU64,

    // Reconciliation
    pub resyncs: AtomicU64,
    pub snapshots_rejected: AtomicU64,
    pub apply_ns: Mutex<LatencyTracker>,

    // Publishing
    pub publishes: AtomicU64,
    pub publishes_suppressed: AtomicU64,
    pub sink_failures: AtomicU64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            messages_processed: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            snapshots_rejected: AtomicU64::new(0),
            apply_ns: Mutex::new(LatencyTracker::new(1000)),
            publishes: AtomicU64::new(0),
            publishes_suppressed: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    /// Record one message folded onto the book.
    pub fn record_message(&self, apply_ns: u64) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.apply_ns.lock() {
            tracker.record(apply_ns);
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_rejected(&self) {
        self.snapshots_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.publishes_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Export counters as a sorted name → value map.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("messages_processed".to_string(), self.messages_processed.load(Ordering::Relaxed));
        m.insert("decode_errors".to_string(), self.decode_errors.load(Ordering::Relaxed));
        m.insert("reconnects".to_string(), self.reconnects.load(Ordering::Relaxed));
        m.insert("resyncs".to_string(), self.resyncs.load(Ordering::Relaxed));
        m.insert("snapshots_rejected".to_string(), self.snapshots_rejected.load(Ordering::Relaxed));
        m.insert("publishes".to_string(), self.publishes.load(Ordering::Relaxed));
        m.insert("publishes_suppressed".to_string(), self.publishes_suppressed.load(Ordering::Relaxed));
        m.insert("sink_failures".to_string(), self.sink_failures.load(Ordering::Relaxed));
        if let Ok(tracker) = self.apply_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                m.insert("apply_p99_ns".to_string(), p99);
            }
        }
        m
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding window of latency samples.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p.min(100) * (sorted.len() - 1)) / 100;
        Some(sorted[idx])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
