//! Cross type
//!
//! A cross is a set of asks on one exchange priced below bids on another.
//! Buying the asks and selling into the bids captures the price difference.

use std::fmt;
use std::sync::Arc;

use types::book::BookSnapshot;
use types::currency::Money;
use types::ids::ExchangeId;

/// Result of walking one book's asks against another book's bids.
///
/// `volume` is in the pair's base currency; `revenue` and `fees` are in the
/// buy book's price currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Cross {
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    pub volume: Money,
    pub revenue: Money,
    pub fees: Money,
    /// Book the asks were taken from
    pub buy_book: Arc<BookSnapshot>,
    /// Book the bids were taken from
    pub sell_book: Arc<BookSnapshot>,
}

impl Cross {
    /// Revenue net of fees
    pub fn profit(&self) -> Money {
        Money::new(
            self.revenue.amount - self.fees.amount,
            self.revenue.currency.clone(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_zero()
    }

    pub fn is_profitable(&self) -> bool {
        self.revenue.amount > self.fees.amount
    }
}

impl fmt::Display for Cross {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buy {} on {} / sell on {}: revenue {}, fees {}, profit {}",
            self.volume,
            self.buy_exchange,
            self.sell_exchange,
            self.revenue,
            self.fees,
            self.profit()
        )
    }
}
