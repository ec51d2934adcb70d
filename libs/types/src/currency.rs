//! Currency-tagged decimal amounts
//!
//! `Money` pairs a `Decimal` amount with its `Currency`. Arithmetic between
//! two amounts is only defined when the currencies agree; mixing currencies
//! returns `MoneyError::CurrencyMismatch` instead of silently coercing.
//! Conversions go through an explicit `ExchangeRates` table.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::MoneyError;

/// Currency code, normalized to uppercase (e.g. `BTC`, `USD`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A decimal amount denominated in a currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Zero amount in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Add two amounts of the same currency
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency.clone()))
    }

    /// Subtract two amounts of the same currency
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency.clone()))
    }

    /// The smaller of two amounts of the same currency
    pub fn min(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        if self.amount <= other.amount {
            Ok(self.clone())
        } else {
            Ok(other.clone())
        }
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.normalize(), self.currency)
    }
}

/// Conversion table between currencies
///
/// A rate `(from, to) -> r` means one unit of `from` is worth `r` units of
/// `to`. The inverse direction is derived when only one side is registered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRates {
    rates: BTreeMap<(Currency, Currency), Decimal>,
}

impl ExchangeRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversion rate
    pub fn insert(&mut self, from: Currency, to: Currency, rate: Decimal) {
        self.rates.insert((from, to), rate);
    }

    /// Look up the rate for converting `from` into `to`
    pub fn rate(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from.clone(), to.clone())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to.clone(), from.clone()))
            .filter(|r| !r.is_zero())
            .map(|r| Decimal::ONE / *r)
    }

    /// Convert an amount into `target`
    pub fn convert(&self, money: &Money, target: &Currency) -> Result<Money, MoneyError> {
        let rate = self
            .rate(&money.currency, target)
            .ok_or_else(|| MoneyError::MissingRate {
                from: money.currency.to_string(),
                to: target.to_string(),
            })?;
        Ok(Money::new(money.amount * rate, target.clone()))
    }
}
