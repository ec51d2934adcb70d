//! Coinbase `full` channel (level 3, order-keyed, sequence numbered)

use serde_json::{json, Value};
use types::book::SequenceMarker;
use types::ids::Pair;
use types::numeric::parse_decimal_value;
use types::order::Side;

use super::{field, parse_levels, str_field, Decoded, ExchangeCodec, ExchangeKind};
use crate::error::DecodeError;
use crate::events::{LifecycleKind, OrderLifecycle, UpdateBatch, UpdateEvent};

pub struct CoinbaseCodec {
    product_id: String,
}

impl CoinbaseCodec {
    pub fn new(pair: &Pair) -> Self {
        Self {
            product_id: format!("{}-{}", pair.base(), pair.quote()),
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }
}

fn sequence(value: &Value) -> Result<u64, DecodeError> {
    field(value, "sequence")?
        .as_u64()
        .ok_or_else(|| DecodeError::UnexpectedShape("`sequence` is not an integer".into()))
}

fn optional_decimal(
    value: &Value,
    name: &'static str,
) -> Result<Option<rust_decimal::Decimal>, DecodeError> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => Ok(Some(parse_decimal_value(raw)?)),
    }
}

/// `{sequence, bids: [[price, size, order_id]], asks}`
fn decode_level3(value: &Value) -> Result<UpdateBatch, DecodeError> {
    let marker = SequenceMarker::Sequence(sequence(value)?);
    let bids = parse_levels(value, "bids", true)?;
    let asks = parse_levels(value, "asks", true)?;
    Ok(UpdateBatch::snapshot(bids, asks, marker))
}

impl ExchangeCodec for CoinbaseCodec {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Coinbase
    }

    fn subscribe_messages(&self) -> Vec<String> {
        vec![json!({
            "type": "subscribe",
            "product_ids": [self.product_id],
            "channels": ["full"],
        })
        .to_string()]
    }

    fn decode(&mut self, text: &str) -> Result<Decoded, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let message_type = str_field(&value, "type")?;

        let kind = match message_type {
            "received" => LifecycleKind::Received,
            "open" => LifecycleKind::Open,
            "done" => LifecycleKind::Done,
            "change" => LifecycleKind::Change,
            "match" => LifecycleKind::Match,
            "snapshot" => return Ok(Decoded::Batch(decode_level3(&value)?)),
            "error" => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(DecodeError::ExchangeError(message.to_string()));
            }
            // subscriptions, heartbeat, activate, ...
            _ => return Ok(Decoded::control()),
        };

        let sequence = sequence(&value)?;
        let side = Side::from_wire(str_field(&value, "side")?)
            .ok_or_else(|| DecodeError::UnexpectedShape("unknown side".into()))?;

        let (order_id, volume) = match kind {
            LifecycleKind::Received => (str_field(&value, "order_id")?, optional_decimal(&value, "size")?),
            LifecycleKind::Open | LifecycleKind::Done => (
                str_field(&value, "order_id")?,
                optional_decimal(&value, "remaining_size")?,
            ),
            LifecycleKind::Change => (
                str_field(&value, "order_id")?,
                optional_decimal(&value, "new_size")?,
            ),
            LifecycleKind::Match => (
                str_field(&value, "maker_order_id")?,
                optional_decimal(&value, "size")?,
            ),
        };

        let event = OrderLifecycle {
            kind,
            sequence,
            order_id: order_id.to_string(),
            side,
            price: optional_decimal(&value, "price")?,
            volume,
        };
        Ok(Decoded::Batch(UpdateBatch::new(
            SequenceMarker::Sequence(sequence),
            vec![UpdateEvent::OrderLifecycle(event)],
        )))
    }

    fn snapshot_url(&self, rest_base: &str) -> Option<String> {
        Some(format!(
            "{}/products/{}/book?level=3",
            rest_base.trim_end_matches('/'),
            self.product_id
        ))
    }

    fn decode_snapshot(&self, body: &str) -> Result<UpdateBatch, DecodeError> {
        let value: Value = serde_json::from_str(body)?;
        decode_level3(&value)
    }
}
