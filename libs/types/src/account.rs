//! Balance types
//!
//! Balances are owned by the trading side of the system; here they are only
//! read to size executable volume.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Money};

/// Available amount per currency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance {
    available: BTreeMap<Currency, Decimal>,
}

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, currency: Currency, amount: Decimal) -> Self {
        self.set(currency, amount);
        self
    }

    pub fn set(&mut self, currency: Currency, amount: Decimal) {
        self.available.insert(currency, amount);
    }

    /// Available amount in `currency`; zero when the currency is absent
    pub fn available(&self, currency: &Currency) -> Money {
        let amount = self.available.get(currency).copied().unwrap_or(Decimal::ZERO);
        Money::new(amount, currency.clone())
    }
}
