//! Identifier types for exchanges and trading pairs
//!
//! Exchange identifiers are normalized to lowercase so that sink keys such as
//! `coinbase_orderbook` are stable regardless of how a feed was configured.
//! Pairs are `BASE/QUOTE`: the base is the volume currency, the quote is the
//! price currency.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::Currency;
use crate::errors::ParseError;

/// Exchange identifier (e.g. `coinbase`, `bitstamp`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    /// Create an exchange id, normalizing to lowercase
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Trading pair identifier
///
/// Format: "BASE/QUOTE" (e.g., "BTC/USD", "ETH/EUR")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: Currency,
    quote: Currency,
}

impl Pair {
    /// Create a pair from its two currencies
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Parse a `BASE/QUOTE` symbol
    pub fn parse(symbol: &str) -> Result<Self, ParseError> {
        let (base, quote) = symbol
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidPair(symbol.to_string()))?;
        if base.trim().is_empty() || quote.trim().is_empty() || quote.contains('/') {
            return Err(ParseError::InvalidPair(symbol.to_string()));
        }
        Ok(Self::new(Currency::new(base), Currency::new(quote)))
    }

    /// Try to create a Pair, returning None if invalid
    pub fn try_new(symbol: &str) -> Option<Self> {
        Self::parse(symbol).ok()
    }

    /// Currency in which volumes are denominated
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Currency in which prices are denominated
    pub fn quote(&self) -> &Currency {
        &self.quote
    }

    /// Lowercase underscore form used for routing tags, e.g. `btc_usd`
    pub fn routing_tag(&self) -> String {
        format!(
            "{}_{}",
            self.base.as_str().to_ascii_lowercase(),
            self.quote.as_str().to_ascii_lowercase()
        )
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl TryFrom<String> for Pair {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}
