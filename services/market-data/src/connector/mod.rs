//! Feed connector
//!
//! One connector per exchange + pair, run as its own tokio task. It owns the
//! transport, the exchange codec, the reconciliation engine and the book;
//! nothing else mutates the book. Per processed message (stream) or cycle
//! (poll):
//!
//! 1. decode the payload; undecodable payloads are logged and dropped
//! 2. hand the batch to the engine
//! 3. resync if the engine says so, or if the book is still crossed
//! 4. write the liveness key
//! 5. when live: refresh the book cache, fan out if the publish gate allows,
//!    and hand readers a fresh `Arc<BookSnapshot>`
//!
//! Transport failures are never fatal: polls retry on the next tick and
//! streams reconnect with capped exponential backoff after a full reset.
//! Stopping (shutdown signal or cleared control key) removes the liveness
//! key.

mod backoff;
pub mod bootstrap;
mod poll;
mod stream;

pub use backoff::Backoff;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use types::book::BookSnapshot;
use types::ids::ExchangeId;

use crate::codec::encode_book;
use crate::config::FeedSettings;
use crate::error::FeedError;
use crate::events::UpdateBatch;
use crate::exchanges::{Decoded, ExchangeCodec, Transport};
use crate::metrics::FeedMetrics;
use crate::order_book::PriceLevelBook;
use crate::publish::{PublishDecision, PublishGate, SuppressReason};
use crate::reconcile::{ApplyOutcome, ReconciliationEngine};
use crate::sink::{control_allows, MarketSink, SinkKeys, ORDERBOOK_FEED};

/// What happened to one message or poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Message handled; liveness and publishing are due.
    Processed,
    /// Payload could not be decoded or was an error; nothing written.
    Rejected,
    /// A bootstrap snapshot was older than the buffered diffs.
    SnapshotRejected,
    /// Book discarded; the feed must restart from scratch.
    Resync,
}

pub struct FeedConnector {
    settings: FeedSettings,
    exchange: ExchangeId,
    codec: Box<dyn ExchangeCodec>,
    engine: Box<dyn ReconciliationEngine>,
    book: PriceLevelBook,
    gate: PublishGate,
    sink: Arc<dyn MarketSink>,
    keys: SinkKeys,
    metrics: Arc<FeedMetrics>,
    snapshots: watch::Sender<Arc<BookSnapshot>>,
    shutdown: watch::Receiver<bool>,
    http: reqwest::Client,
    /// Whether the book went live since the last reset.
    went_live: bool,
}

impl FeedConnector {
    pub fn new(
        settings: FeedSettings,
        sink: Arc<dyn MarketSink>,
        metrics: Arc<FeedMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let exchange = settings.exchange_id();
        let book = PriceLevelBook::new(exchange.clone(), settings.pair.clone());
        let (snapshots, _) = watch::channel(Arc::new(book.snapshot(0)));
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            keys: SinkKeys::new(&exchange, ORDERBOOK_FEED, &settings.routing_tag),
            codec: settings.exchange.codec(&settings.pair),
            engine: settings.exchange.engine_kind().build(),
            gate: PublishGate::new(settings.publish_interval),
            settings,
            exchange,
            book,
            sink,
            metrics,
            snapshots,
            shutdown,
            http,
            went_live: false,
        }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn keys(&self) -> &SinkKeys {
        &self.keys
    }

    pub fn book(&self) -> &PriceLevelBook {
        &self.book
    }

    pub fn engine(&self) -> &dyn ReconciliationEngine {
        self.engine.as_ref()
    }

    /// Receiver of the latest live book.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BookSnapshot>> {
        self.snapshots.subscribe()
    }

    fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until shutdown or until the control key is cleared.
    pub async fn run(mut self) {
        info!(
            exchange = %self.exchange,
            pair = %self.settings.pair,
            engine = self.engine.name(),
            "Starting feed connector"
        );

        match self.settings.exchange.transport() {
            Transport::Stream => stream::run(&mut self).await,
            Transport::Poll => poll::run(&mut self).await,
        }

        self.clear_liveness().await;
        info!(exchange = %self.exchange, "Feed connector stopped");
    }

    /// Decode one stream text frame and fold it onto the book.
    pub fn handle_text(&mut self, text: &str) -> CycleOutcome {
        match self.codec.decode(text) {
            Ok(Decoded::Batch(batch)) => self.apply_batch(batch),
            Ok(Decoded::Reconnect) => {
                info!(exchange = %self.exchange, "Exchange requested reconnect");
                CycleOutcome::Resync
            }
            Err(e) => {
                self.metrics.record_decode_error();
                warn!(exchange = %self.exchange, error = %e, "Dropping undecodable message");
                CycleOutcome::Rejected
            }
        }
    }

    /// Hand a decoded batch to the engine and check the book afterwards.
    pub fn apply_batch(&mut self, batch: UpdateBatch) -> CycleOutcome {
        let started = std::time::Instant::now();
        let outcome = self.engine.apply(&mut self.book, batch);
        self.metrics
            .record_message(started.elapsed().as_nanos().min(u64::MAX as u128) as u64);

        match outcome {
            ApplyOutcome::ResyncRequired => return CycleOutcome::Resync,
            ApplyOutcome::SnapshotRejected => {
                self.metrics.record_snapshot_rejected();
                return CycleOutcome::SnapshotRejected;
            }
            _ => {}
        }

        if self.engine.is_live() {
            if self.book.is_crossed() {
                warn!(
                    exchange = %self.exchange,
                    best_bid = ?self.book.best_bid().map(|l| l.price),
                    best_ask = ?self.book.best_ask().map(|l| l.price),
                    "Book crossed after batch, resyncing"
                );
                return CycleOutcome::Resync;
            }
            self.went_live = true;
        }
        CycleOutcome::Processed
    }

    /// Whether the engine is waiting for a REST snapshot.
    pub fn needs_snapshot(&self) -> bool {
        self.engine.wants_bootstrap()
    }

    /// Fetch the bootstrap snapshot, refetching stale ones, and apply it.
    pub async fn bootstrap(&mut self) -> CycleOutcome {
        let Some(url) = self
            .settings
            .rest_url
            .as_deref()
            .and_then(|base| self.codec.snapshot_url(base))
        else {
            error!(exchange = %self.exchange, "Feed needs a snapshot but has no REST endpoint");
            return CycleOutcome::Resync;
        };

        let attempts = self.settings.bootstrap_attempts.max(1);
        let mut backoff = Backoff::new(self.settings.reconnect_initial, self.settings.reconnect_max);

        for attempt in 1..=attempts {
            match bootstrap::fetch_snapshot(&self.http, self.codec.as_ref(), &url).await {
                Ok(batch) => match self.apply_batch(batch) {
                    CycleOutcome::SnapshotRejected => {
                        debug!(exchange = %self.exchange, attempt, "Snapshot stale, refetching");
                    }
                    other => return other,
                },
                Err(e) if !e.is_retryable() => {
                    error!(exchange = %self.exchange, url = %url, error = %e, "Snapshot request refused");
                    return CycleOutcome::Resync;
                }
                Err(e) => {
                    warn!(exchange = %self.exchange, attempt, error = %e, "Bootstrap attempt failed");
                }
            }

            if attempt < attempts && self.pause(backoff.next_delay()).await {
                return CycleOutcome::Resync;
            }
        }

        warn!(exchange = %self.exchange, attempts, "Bootstrap attempts exhausted");
        CycleOutcome::Resync
    }

    /// Sleep for `delay`; returns true if shutdown was signalled meanwhile.
    async fn pause(&mut self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    /// Drop the book and all protocol state.
    ///
    /// The cached book is withdrawn too: the heartbeat keeps ticking while
    /// the feed rebuilds, and readers must not pair it with a discarded book.
    pub async fn resync(&mut self) {
        self.metrics.record_resync();
        info!(
            exchange = %self.exchange,
            engine = self.engine.name(),
            "Discarding book and resynchronizing"
        );
        self.book = PriceLevelBook::new(self.exchange.clone(), self.settings.pair.clone());
        self.engine.reset();
        self.codec.reset();
        self.went_live = false;

        self.snapshots.send_replace(Arc::new(self.book.snapshot(0)));
        if let Err(e) = self.sink.delete(&self.keys.orderbook).await {
            self.metrics.record_sink_failure();
            warn!(exchange = %self.exchange, error = %e, "Could not withdraw cached book");
        }
    }

    /// Liveness, cache and fan-out writes after a processed message.
    pub async fn complete_cycle(&mut self) {
        self.write_heartbeat().await;

        if !self.engine.is_live() {
            return;
        }

        let snapshot = Arc::new(self.book.snapshot(chrono::Utc::now().timestamp_millis()));
        self.snapshots.send_replace(Arc::clone(&snapshot));

        let payload = match encode_book(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                error!(exchange = %self.exchange, error = %e, "Failed to encode book");
                return;
            }
        };

        if let Err(e) = self.sink.set(&self.keys.orderbook, &payload).await {
            self.metrics.record_sink_failure();
            warn!(exchange = %self.exchange, error = %e, "Book cache write failed");
        }

        self.maybe_publish(&snapshot, &payload).await;
    }

    /// Publish a throttled change once its interval has passed.
    pub async fn flush_pending(&mut self) {
        if !self.gate.has_pending() || !self.engine.is_live() {
            return;
        }
        let snapshot = Arc::new(self.book.snapshot(chrono::Utc::now().timestamp_millis()));
        match encode_book(&snapshot) {
            Ok(payload) => self.maybe_publish(&snapshot, &payload).await,
            Err(e) => error!(exchange = %self.exchange, error = %e, "Failed to encode book"),
        }
    }

    /// When the gate holds a pending change, the instant it may go out.
    pub fn next_flush_at(&self) -> Option<Instant> {
        self.gate.next_flush_at()
    }

    async fn maybe_publish(&mut self, snapshot: &Arc<BookSnapshot>, payload: &str) {
        match self.gate.evaluate(snapshot, Instant::now()) {
            PublishDecision::Publish => {
                match self.sink.publish(&self.keys.channel, payload).await {
                    Ok(()) => self.metrics.record_publish(),
                    Err(e) => {
                        self.metrics.record_sink_failure();
                        warn!(exchange = %self.exchange, error = %e, "Fan-out publish failed");
                    }
                }
            }
            PublishDecision::Suppress(reason) => {
                self.metrics.record_suppressed();
                if reason == SuppressReason::Throttled {
                    debug!(exchange = %self.exchange, "Publish throttled, change pending");
                }
            }
        }
    }

    async fn write_heartbeat(&self) {
        let now = chrono::Utc::now().timestamp().to_string();
        if let Err(e) = self.sink.set(&self.keys.heartbeat, &now).await {
            self.metrics.record_sink_failure();
            warn!(exchange = %self.exchange, error = %e, "Heartbeat write failed");
        }
    }

    async fn clear_liveness(&self) {
        if let Err(e) = self.sink.delete(&self.keys.heartbeat).await {
            warn!(exchange = %self.exchange, error = %e, "Could not clear heartbeat key");
        }
    }

    /// Read the control key. `Ok(false)` means an operator stopped the feed.
    ///
    /// A missing key is a configuration error. An unreachable sink is not a
    /// reason to stop, so it reads as "continue".
    pub async fn check_control(&self) -> Result<bool, FeedError> {
        match self.sink.get(&self.keys.control).await {
            Ok(Some(value)) => {
                let allowed = control_allows(&value);
                if !allowed {
                    info!(exchange = %self.exchange, key = %self.keys.control, "Control key cleared, stopping feed");
                }
                Ok(allowed)
            }
            Ok(None) => Err(FeedError::MissingControlKey(self.keys.control.clone())),
            Err(e) => {
                self.metrics.record_sink_failure();
                warn!(exchange = %self.exchange, error = %e, "Control key unreadable, continuing");
                Ok(true)
            }
        }
    }

    /// `check_control` collapsed to "keep running?", logging a missing key loudly.
    async fn should_continue(&self) -> bool {
        if self.is_stopped() {
            return false;
        }
        match self.check_control().await {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(exchange = %self.exchange, error = %e, "Feed is not enabled, stopping");
                false
            }
        }
    }
}
