//! Reading reconciled books back from the sink
//!
//! Connectors cache each book under `{exchange}_orderbook` and refresh a
//! heartbeat every cycle. A book whose heartbeat is missing or stale belongs
//! to a stopped or stuck feed and is left out of detection.

use std::sync::Arc;

use market_data::codec::decode_book;
use market_data::sink::{heartbeat_key, orderbook_key, MarketSink, ORDERBOOK_FEED};
use tracing::{debug, warn};
use types::book::BookSnapshot;
use types::ids::{ExchangeId, Pair};

/// Fresh cached books for `exchanges`, in the given order.
pub async fn load_books(
    sink: &dyn MarketSink,
    exchanges: &[ExchangeId],
    pair: &Pair,
    max_heartbeat_age_secs: i64,
    now_secs: i64,
) -> Vec<Arc<BookSnapshot>> {
    let mut books = Vec::with_capacity(exchanges.len());
    for exchange in exchanges {
        if let Some(book) = load_book(sink, exchange, pair, max_heartbeat_age_secs, now_secs).await {
            books.push(Arc::new(book));
        }
    }
    books
}

async fn load_book(
    sink: &dyn MarketSink,
    exchange: &ExchangeId,
    pair: &Pair,
    max_heartbeat_age_secs: i64,
    now_secs: i64,
) -> Option<BookSnapshot> {
    let heartbeat = match sink.get(&heartbeat_key(exchange, ORDERBOOK_FEED)).await {
        Ok(value) => value.and_then(|v| v.trim().parse::<i64>().ok()),
        Err(e) => {
            warn!(exchange = %exchange, error = %e, "Heartbeat unreadable");
            return None;
        }
    };
    match heartbeat {
        Some(ts) if now_secs - ts <= max_heartbeat_age_secs => {}
        other => {
            debug!(exchange = %exchange, heartbeat = ?other, "Feed not live, skipping");
            return None;
        }
    }

    let payload = match sink.get(&orderbook_key(exchange)).await {
        Ok(Some(payload)) => payload,
        Ok(None) => return None,
        Err(e) => {
            warn!(exchange = %exchange, error = %e, "Book cache unreadable");
            return None;
        }
    };

    match decode_book(&payload) {
        Ok(cached) => Some(cached.into_snapshot(exchange.clone(), pair.clone())),
        Err(e) => {
            warn!(exchange = %exchange, error = %e, "Cached book undecodable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_data::sink::InMemorySink;

    const BOOK: &str = r#"{"timestamp":1700000000000,"bids":[["100","1",""]],"asks":[["101","2",""]]}"#;

    fn exchanges() -> Vec<ExchangeId> {
        vec![ExchangeId::new("bitstamp"), ExchangeId::new("kraken")]
    }

    #[tokio::test]
    async fn test_loads_fresh_books_only() {
        let sink = InMemorySink::new();
        sink.set("bitstamp_orderbook", BOOK).await.unwrap();
        sink.set("bitstamp_orderbook_heartbeat", "1000").await.unwrap();
        sink.set("kraken_orderbook", BOOK).await.unwrap();
        sink.set("kraken_orderbook_heartbeat", "900").await.unwrap();

        let pair = Pair::parse("BTC/USD").unwrap();
        let books = load_books(&sink, &exchanges(), &pair, 10, 1005).await;

        assert_eq!(books.len(), 1);
        assert_eq!(books[0].exchange.as_str(), "bitstamp");
        assert_eq!(books[0].asks[0].volume, rust_decimal::Decimal::from(2));
    }

    #[tokio::test]
    async fn test_missing_heartbeat_skips_book() {
        let sink = InMemorySink::new();
        sink.set("bitstamp_orderbook", BOOK).await.unwrap();

        let pair = Pair::parse("BTC/USD").unwrap();
        assert!(load_books(&sink, &exchanges(), &pair, 10, 1005).await.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_cache_skipped() {
        let sink = InMemorySink::new();
        sink.set("bitstamp_orderbook", "{").await.unwrap();
        sink.set("bitstamp_orderbook_heartbeat", "1000").await.unwrap();

        let pair = Pair::parse("BTC/USD").unwrap();
        assert!(load_books(&sink, &exchanges(), &pair, 10, 1000).await.is_empty());
    }
}
