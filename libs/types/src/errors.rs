//! Error types shared across the market-data crates
//!
//! Error taxonomy using thiserror

use thiserror::Error;

/// Errors raised by currency-tagged arithmetic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("No exchange rate from {from} to {to}")]
    MissingRate { from: String, to: String },
}

/// Errors raised while parsing identifiers and wire numbers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid pair (expected BASE/QUOTE): {0}")]
    InvalidPair(String),

    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("Negative volume: {0}")]
    NegativeVolume(String),
}
