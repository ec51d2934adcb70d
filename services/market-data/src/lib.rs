//! Market Data Service
//!
//! Maintains a consistent local replica of each exchange's order book from
//! that exchange's public market-data feed and makes it available to
//! downstream consumers:
//! - Per-exchange price-level books rebuilt from streamed or polled updates
//! - Strategy-specific reconciliation (order-keyed, timestamp-keyed,
//!   signed-volume) with gap detection and resync
//! - Liveness heartbeats, a JSON book cache and throttled fan-out via a
//!   key-value / pub-sub sink
//! - Operator control keys to stop individual feeds
//!
//! # Architecture
//!
//! ```text
//!   websocket / REST
//!        │
//!   ┌────▼────┐
//!   │  Codec  │  ← exchange wire format → UpdateBatch
//!   └────┬────┘
//!        │
//!   ┌────▼─────┐
//!   │  Engine  │  ← buffers, sequences, detects gaps
//!   └────┬─────┘
//!        │
//!   ┌────▼────┐
//!   │  Book   │  ← PriceLevelBook, owned by one connector
//!   └────┬────┘
//!        │
//!   ┌────┴───────────┬──────────────┐
//!   │                │              │
//! ┌─▼────────┐  ┌────▼─────┐  ┌─────▼──────┐
//! │Heartbeat │  │Book cache│  │PublishGate │
//! └──────────┘  └──────────┘  └─────┬──────┘
//!                                   │
//!                              fan-out channel
//! ```
//!
//! One `FeedConnector` task per exchange + pair, spawned by the
//! `Supervisor`. Connectors share nothing but the sink.

pub mod codec;
pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod exchanges;
pub mod metrics;
pub mod order_book;
pub mod publish;
pub mod reconcile;
pub mod redis_sink;
pub mod sink;
pub mod supervisor;

pub use config::{FeedSettings, MarketDataConfig};
pub use connector::FeedConnector;
pub use order_book::PriceLevelBook;
pub use sink::{InMemorySink, MarketSink};
pub use supervisor::Supervisor;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
