//! Bitstamp `diff_order_book` channel (timestamp-keyed level replacements)

use serde_json::{json, Value};
use types::book::SequenceMarker;
use types::ids::Pair;
use types::order::Side;

use super::{field, parse_levels, str_field, Decoded, ExchangeCodec, ExchangeKind};
use crate::error::DecodeError;
use crate::events::{UpdateBatch, UpdateEvent};

pub struct BitstampCodec {
    market: String,
}

impl BitstampCodec {
    pub fn new(pair: &Pair) -> Self {
        Self {
            market: format!("{}{}", pair.base(), pair.quote()).to_ascii_lowercase(),
        }
    }

    fn channel(&self) -> String {
        format!("diff_order_book_{}", self.market)
    }
}

/// Exchange time in microseconds, from `microtimestamp` or `timestamp` (seconds).
fn timestamp_micros(data: &Value) -> Result<i64, DecodeError> {
    let parse = |raw: &Value| -> Result<i64, DecodeError> {
        let text = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.trim()
            .parse::<i64>()
            .map_err(|_| DecodeError::UnexpectedShape(format!("bad timestamp {text}")))
    };

    if let Some(micros) = data.get("microtimestamp") {
        return parse(micros);
    }
    let seconds = parse(field(data, "timestamp")?)?;
    seconds
        .checked_mul(1_000_000)
        .ok_or_else(|| DecodeError::UnexpectedShape(format!("timestamp {seconds} out of range")))
}

impl ExchangeCodec for BitstampCodec {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bitstamp
    }

    fn subscribe_messages(&self) -> Vec<String> {
        vec![json!({
            "event": "bts:subscribe",
            "data": {"channel": self.channel()},
        })
        .to_string()]
    }

    fn decode(&mut self, text: &str) -> Result<Decoded, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        match str_field(&value, "event")? {
            "data" => {}
            "bts:request_reconnect" => return Ok(Decoded::Reconnect),
            "bts:error" => {
                let message = value
                    .pointer("/data/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(DecodeError::ExchangeError(message.to_string()));
            }
            _ => return Ok(Decoded::control()),
        }

        let data = field(&value, "data")?;
        let marker = SequenceMarker::Timestamp(timestamp_micros(data)?);

        let mut events = Vec::new();
        for (side, name) in [(Side::BUY, "bids"), (Side::SELL, "asks")] {
            for entry in parse_levels(data, name, false)? {
                events.push(UpdateEvent::PriceLevelUpsert {
                    side,
                    price: entry.price,
                    volume: entry.volume,
                });
            }
        }
        Ok(Decoded::Batch(UpdateBatch::new(marker, events)))
    }

    fn snapshot_url(&self, rest_base: &str) -> Option<String> {
        Some(format!(
            "{}/api/v2/order_book/{}/",
            rest_base.trim_end_matches('/'),
            self.market
        ))
    }

    fn decode_snapshot(&self, body: &str) -> Result<UpdateBatch, DecodeError> {
        let value: Value = serde_json::from_str(body)?;
        let marker = SequenceMarker::Timestamp(timestamp_micros(&value)?);
        let bids = parse_levels(&value, "bids", false)?;
        let asks = parse_levels(&value, "asks", false)?;
        Ok(UpdateBatch::snapshot(bids, asks, marker))
    }
}
