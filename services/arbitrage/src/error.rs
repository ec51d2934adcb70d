//! Cross detection errors

use thiserror::Error;
use types::errors::MoneyError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrossError {
    /// The two books trade different base currencies; volumes cannot be matched.
    #[error("Mismatched volume currencies: {buy} vs {sell}")]
    MismatchedVolumeCurrencies { buy: String, sell: String },

    #[error("No exchange rate from {from} to {to}")]
    MissingExchangeRate { from: String, to: String },

    #[error(transparent)]
    Money(#[from] MoneyError),
}
