//! Bitfinex v2 `book` channel, precision P0 (unkeyed signed-volume levels)
//!
//! Data frames are arrays: `[chanId, [[price, count, amount], ...]]` for the
//! initial snapshot, `[chanId, [price, count, amount]]` for an update and
//! `[chanId, "hb"]` for heartbeats. Events are objects (`info`, `subscribed`,
//! `error`).

use serde_json::{json, Value};
use types::ids::Pair;
use types::numeric::parse_decimal_value;

use super::{Decoded, ExchangeCodec, ExchangeKind};
use crate::error::DecodeError;
use crate::events::UpdateBatch;
use crate::reconcile::SignedLevel;

/// Info code asking clients to reconnect.
const INFO_RECONNECT: i64 = 20051;

pub struct BitfinexCodec {
    symbol: String,
    channel_id: Option<i64>,
}

impl BitfinexCodec {
    pub fn new(pair: &Pair) -> Self {
        Self {
            symbol: format!("t{}{}", pair.base(), pair.quote()),
            channel_id: None,
        }
    }

    pub fn channel_id(&self) -> Option<i64> {
        self.channel_id
    }

    fn decode_event(&mut self, value: &Value) -> Result<Decoded, DecodeError> {
        match value.get("event").and_then(Value::as_str) {
            Some("subscribed") => {
                self.channel_id = value.get("chanId").and_then(Value::as_i64);
                Ok(Decoded::control())
            }
            Some("info") if value.get("code").and_then(Value::as_i64) == Some(INFO_RECONNECT) => {
                Ok(Decoded::Reconnect)
            }
            Some("error") => {
                let message = value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Err(DecodeError::ExchangeError(message.to_string()))
            }
            _ => Ok(Decoded::control()),
        }
    }
}

fn signed_level(entry: &Value) -> Result<SignedLevel, DecodeError> {
    let row = entry
        .as_array()
        .filter(|r| r.len() >= 3)
        .ok_or_else(|| DecodeError::UnexpectedShape("book entry is not [price, count, amount]".into()))?;
    let count = row[1]
        .as_u64()
        .ok_or_else(|| DecodeError::UnexpectedShape("count is not an integer".into()))?;
    Ok(SignedLevel::new(
        parse_decimal_value(&row[0])?,
        count,
        parse_decimal_value(&row[2])?,
    ))
}

impl ExchangeCodec for BitfinexCodec {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bitfinex
    }

    fn subscribe_messages(&self) -> Vec<String> {
        vec![json!({
            "event": "subscribe",
            "channel": "book",
            "symbol": self.symbol,
            "prec": "P0",
            "freq": "F0",
            "len": "100",
        })
        .to_string()]
    }

    fn decode(&mut self, text: &str) -> Result<Decoded, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        if value.is_object() {
            return self.decode_event(&value);
        }

        let frame = value
            .as_array()
            .filter(|f| f.len() >= 2)
            .ok_or_else(|| DecodeError::UnexpectedShape(text.chars().take(64).collect()))?;

        if let (Some(expected), Some(actual)) = (self.channel_id, frame[0].as_i64()) {
            if expected != actual {
                return Ok(Decoded::control());
            }
        }

        let payload = &frame[1];
        if payload.is_string() {
            // "hb"
            return Ok(Decoded::control());
        }
        let entries = payload
            .as_array()
            .ok_or_else(|| DecodeError::UnexpectedShape("payload is not an array".into()))?;

        let is_snapshot = entries.first().map_or(true, Value::is_array);
        if is_snapshot {
            let levels = entries
                .iter()
                .map(signed_level)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Decoded::Batch(SignedLevel::snapshot_batch(&levels)))
        } else {
            let level = signed_level(payload)?;
            Ok(Decoded::Batch(SignedLevel::diff_batch(&[level])))
        }
    }

    fn snapshot_url(&self, _rest_base: &str) -> Option<String> {
        None
    }

    fn decode_snapshot(&self, _body: &str) -> Result<UpdateBatch, DecodeError> {
        Err(DecodeError::UnexpectedShape(
            "bitfinex books bootstrap from the stream".into(),
        ))
    }

    fn reset(&mut self) {
        self.channel_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UpdateEvent;
    use rust_decimal::Decimal;
    use types::order::Side;

    fn make_codec() -> BitfinexCodec {
        BitfinexCodec::new(&Pair::parse("BTC/USD").unwrap())
    }

    fn batch(decoded: Decoded) -> UpdateBatch {
        match decoded {
            Decoded::Batch(batch) => batch,
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_message() {
        let value: Value = serde_json::from_str(&make_codec().subscribe_messages()[0]).unwrap();
        assert_eq!(value["symbol"], "tBTCUSD");
        assert_eq!(value["prec"], "P0");
    }

    #[test]
    fn test_subscribed_records_channel() {
        let mut codec = make_codec();
        codec
            .decode(r#"{"event":"subscribed","channel":"book","chanId":17}"#)
            .unwrap();
        assert_eq!(codec.channel_id(), Some(17));
    }

    #[test]
    fn test_snapshot_frame() {
        let mut codec = make_codec();
        let batch = batch(
            codec
                .decode(r#"[17,[[100.5,2,1.5],[101,1,-0.25]]]"#)
                .unwrap(),
        );
        match &batch.events[0] {
            UpdateEvent::FullSnapshot { bids, asks, .. } => {
                assert_eq!(bids[0].price, Decimal::from_str_exact("100.5").unwrap());
                assert_eq!(asks[0].volume, Decimal::from_str_exact("0.25").unwrap());
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_update_frame() {
        let mut codec = make_codec();
        let batch = batch(codec.decode(r#"[17,[100,0,1]]"#).unwrap());
        assert_eq!(
            batch.events,
            vec![UpdateEvent::PriceLevelDelete {
                side: Side::BUY,
                price: Decimal::from(100),
            }]
        );
    }

    #[test]
    fn test_heartbeat_is_control() {
        let mut codec = make_codec();
        assert_eq!(codec.decode(r#"[17,"hb"]"#).unwrap(), Decoded::control());
    }

    #[test]
    fn test_reconnect_info() {
        let mut codec = make_codec();
        assert_eq!(
            codec
                .decode(r#"{"event":"info","code":20051,"msg":"Stopping"}"#)
                .unwrap(),
            Decoded::Reconnect
        );
    }

    #[test]
    fn test_other_channel_ignored() {
        let mut codec = make_codec();
        codec
            .decode(r#"{"event":"subscribed","channel":"book","chanId":17}"#)
            .unwrap();
        assert_eq!(codec.decode(r#"[99,[100,1,1]]"#).unwrap(), Decoded::control());
    }
}
