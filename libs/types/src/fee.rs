//! Fee schedule types
//!
//! Crossing two books means taking liquidity on both, so only taker rates
//! matter here.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::ExchangeId;

/// Taker fee rate per exchange (0.0025 = 0.25%)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeSchedule {
    taker_rates: BTreeMap<ExchangeId, Decimal>,
}

impl FeeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, exchange: ExchangeId, rate: Decimal) -> Self {
        self.taker_rates.insert(exchange, rate);
        self
    }

    pub fn set(&mut self, exchange: ExchangeId, rate: Decimal) {
        self.taker_rates.insert(exchange, rate);
    }

    /// Taker rate for an exchange; zero when not configured
    pub fn taker_rate(&self, exchange: &ExchangeId) -> Decimal {
        self.taker_rates.get(exchange).copied().unwrap_or(Decimal::ZERO)
    }

    /// Fee for taking `notional` on `exchange`
    pub fn taker_fee(&self, exchange: &ExchangeId, notional: Decimal) -> Decimal {
        notional * self.taker_rate(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_schedule_calculation() {
        let fees = FeeSchedule::new().with(
            ExchangeId::new("bitstamp"),
            Decimal::from_str_exact("0.0025").unwrap(),
        );

        let fee = fees.taker_fee(&ExchangeId::new("bitstamp"), Decimal::from(100000));
        assert_eq!(fee, Decimal::from(250)); // 100000 * 0.0025
    }

    #[test]
    fn test_unconfigured_exchange_is_free() {
        let fees = FeeSchedule::new();
        assert_eq!(fees.taker_rate(&ExchangeId::new("kraken")), Decimal::ZERO);
    }

    #[test]
    fn test_fee_schedule_deserialize() {
        let fees: FeeSchedule =
            serde_json::from_str(r#"{"coinbase": "0.005", "kraken": "0.0026"}"#).unwrap();
        assert_eq!(
            fees.taker_rate(&ExchangeId::new("coinbase")),
            Decimal::from_str_exact("0.005").unwrap()
        );
    }
}
