//! Key-value and pub/sub sink
//!
//! Connectors write three things per feed:
//!
//! | What | Key / channel | When |
//! |------|---------------|------|
//! | Liveness | `{exchange}_{feed_type}_heartbeat` | every processed cycle |
//! | Book cache | `{exchange}_orderbook` | every live cycle |
//! | Fan-out | `{exchange}.{feed_type}.{routing_tag}` | when the publish gate allows |
//!
//! and read one: the control key `{exchange}_orderbook_should_continue`,
//! which operators clear to stop the feed.
//!
//! `InMemorySink` backs tests and single-process deployments; `RedisSink`
//! (see `redis_sink`) is the production backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use types::ids::ExchangeId;

use crate::error::SinkError;

/// Feed type for order book connectors.
pub const ORDERBOOK_FEED: &str = "orderbook";

/// Opaque key-value store with publish/subscribe fan-out.
#[async_trait]
pub trait MarketSink: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), SinkError>;
    async fn get(&self, key: &str) -> Result<Option<String>, SinkError>;
    async fn delete(&self, key: &str) -> Result<(), SinkError>;
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SinkError>;
}

pub fn heartbeat_key(exchange: &ExchangeId, feed_type: &str) -> String {
    format!("{exchange}_{feed_type}_heartbeat")
}

pub fn orderbook_key(exchange: &ExchangeId) -> String {
    format!("{exchange}_orderbook")
}

pub fn control_key(exchange: &ExchangeId) -> String {
    format!("{exchange}_orderbook_should_continue")
}

pub fn fanout_channel(exchange: &ExchangeId, feed_type: &str, routing_tag: &str) -> String {
    format!("{exchange}.{feed_type}.{routing_tag}")
}

/// Whether a control key value lets the feed keep running.
///
/// Empty, `0` and `false` mean stop.
pub fn control_allows(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// All sink names used by one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkKeys {
    pub heartbeat: String,
    pub orderbook: String,
    pub control: String,
    pub channel: String,
}

impl SinkKeys {
    pub fn new(exchange: &ExchangeId, feed_type: &str, routing_tag: &str) -> Self {
        Self {
            heartbeat: heartbeat_key(exchange, feed_type),
            orderbook: orderbook_key(exchange),
            control: control_key(exchange),
            channel: fanout_channel(exchange, feed_type, routing_tag),
        }
    }
}

/// A message sent on a fan-out channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub channel: String,
    pub payload: String,
}

/// In-process sink backed by a concurrent map and a broadcast channel.
pub struct InMemorySink {
    values: DashMap<String, String>,
    fanout: broadcast::Sender<Published>,
    history: Mutex<Vec<Published>>,
    available: AtomicBool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// `capacity` bounds the broadcast queue per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (fanout, _) = broadcast::channel(capacity.max(1));
        Self {
            values: DashMap::new(),
            fanout,
            history: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Subscribe to every fan-out message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.fanout.subscribe()
    }

    /// Every message published so far.
    pub fn published(&self) -> Vec<Published> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Messages published on one channel.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|p| p.channel == channel)
            .map(|p| p.payload)
            .collect()
    }

    /// Synchronous read, for tests and in-process readers.
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SinkError::Unavailable("in-memory sink disabled".to_string()))
        }
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketSink for InMemorySink {
    async fn set(&self, key: &str, value: &str) -> Result<(), SinkError> {
        self.check()?;
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SinkError> {
        self.check()?;
        Ok(self.value(key))
    }

    async fn delete(&self, key: &str) -> Result<(), SinkError> {
        self.check()?;
        self.values.remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SinkError> {
        self.check()?;
        let message = Published {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        if let Ok(mut history) = self.history.lock() {
            history.push(message.clone());
        }
        // No subscribers is not an error
        let _ = self.fanout.send(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        let exchange = ExchangeId::new("Bitstamp");
        let keys = SinkKeys::new(&exchange, ORDERBOOK_FEED, "btc_usd");
        assert_eq!(keys.heartbeat, "bitstamp_orderbook_heartbeat");
        assert_eq!(keys.orderbook, "bitstamp_orderbook");
        assert_eq!(keys.control, "bitstamp_orderbook_should_continue");
        assert_eq!(keys.channel, "bitstamp.orderbook.btc_usd");
    }

    #[test]
    fn test_control_values() {
        assert!(control_allows("1"));
        assert!(control_allows("true"));
        assert!(!control_allows(""));
        assert!(!control_allows("0"));
        assert!(!control_allows("False"));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let sink = InMemorySink::new();
        sink.set("k", "v").await.unwrap();
        assert_eq!(sink.get("k").await.unwrap(), Some("v".to_string()));
        sink.delete("k").await.unwrap();
        assert_eq!(sink.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let sink = InMemorySink::new();
        let mut rx = sink.subscribe();
        sink.publish("a.orderbook.btc_usd", "{}").await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.channel, "a.orderbook.btc_usd");
        assert_eq!(sink.published_on("a.orderbook.btc_usd"), vec!["{}".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_sink_fails() {
        let sink = InMemorySink::new();
        sink.set_available(false);
        assert!(matches!(
            sink.set("k", "v").await,
            Err(SinkError::Unavailable(_))
        ));
        sink.set_available(true);
        assert!(sink.set("k", "v").await.is_ok());
    }
}
