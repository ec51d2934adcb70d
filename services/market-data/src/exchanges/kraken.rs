//! Kraken public `Depth` endpoint, polled
//!
//! Each response is a complete book and is delivered as a `FullSnapshot`
//! stamped with the newest level timestamp.

use serde_json::Value;
use types::book::SequenceMarker;
use types::ids::Pair;

use super::{field, parse_levels, Decoded, ExchangeCodec, ExchangeKind};
use crate::error::DecodeError;
use crate::events::UpdateBatch;

/// Depth requested per side.
const DEPTH_COUNT: u32 = 100;

pub struct KrakenCodec {
    pair_param: String,
}

/// Kraken's asset code for a currency.
fn asset_code(code: &str) -> &str {
    match code {
        "BTC" => "XBT",
        "DOGE" => "XDG",
        other => other,
    }
}

impl KrakenCodec {
    pub fn new(pair: &Pair) -> Self {
        Self {
            pair_param: format!(
                "{}{}",
                asset_code(pair.base().as_str()),
                asset_code(pair.quote().as_str())
            ),
        }
    }
}

/// Newest per-level timestamp (seconds, possibly fractional) in microseconds.
fn newest_timestamp(book: &Value) -> Option<i64> {
    ["bids", "asks"]
        .iter()
        .filter_map(|side| book.get(*side).and_then(Value::as_array))
        .flatten()
        .filter_map(|row| row.get(2))
        .filter_map(|ts| match ts {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        })
        .map(|secs| (secs * 1_000_000.0) as i64)
        .max()
}

impl ExchangeCodec for KrakenCodec {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Kraken
    }

    fn subscribe_messages(&self) -> Vec<String> {
        Vec::new()
    }

    fn decode(&mut self, _text: &str) -> Result<Decoded, DecodeError> {
        Err(DecodeError::UnexpectedShape(
            "kraken books are polled, not streamed".into(),
        ))
    }

    fn snapshot_url(&self, rest_base: &str) -> Option<String> {
        Some(format!(
            "{}/0/public/Depth?pair={}&count={}",
            rest_base.trim_end_matches('/'),
            self.pair_param,
            DEPTH_COUNT
        ))
    }

    fn decode_snapshot(&self, body: &str) -> Result<UpdateBatch, DecodeError> {
        let value: Value = serde_json::from_str(body)?;

        if let Some(errors) = value.get("error").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(DecodeError::ExchangeError(joined));
            }
        }

        // Result is keyed by Kraken's canonical pair name (e.g. XXBTZUSD)
        let book = field(&value, "result")?
            .as_object()
            .and_then(|result| result.values().next())
            .ok_or(DecodeError::MissingField("result"))?;

        let marker = newest_timestamp(book)
            .map(SequenceMarker::Timestamp)
            .unwrap_or_default();
        let bids = parse_levels(book, "bids", false)?;
        let asks = parse_levels(book, "asks", false)?;
        Ok(UpdateBatch::snapshot(bids, asks, marker))
    }
}
