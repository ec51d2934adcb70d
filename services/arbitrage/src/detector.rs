//! Cross detection
//!
//! Walks one book's asks (cheapest first) against another book's bids
//! (richest first) for as long as the bid is strictly above the ask,
//! consuming `min(ask remaining, bid remaining)` per step:
//!
//! ```text
//! revenue += (bid - ask) * volume
//! fees    += bid * volume * sell_fee + ask * volume * buy_fee
//! ```
//!
//! Sell-side prices are converted into the buy book's price currency
//! before comparing. Both books must trade the same base currency.
//!
//! Detection is pure: it reads immutable `BookSnapshot`s and never touches a
//! live book.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;
use types::account::Balance;
use types::book::BookSnapshot;
use types::currency::{ExchangeRates, Money};
use types::fee::FeeSchedule;

use crate::cross::Cross;
use crate::error::CrossError;
use crate::sizing;

#[derive(Debug, Clone, Default)]
pub struct CrossDetector {
    fees: FeeSchedule,
    rates: ExchangeRates,
    include_unprofitable: bool,
}

impl CrossDetector {
    pub fn new(fees: FeeSchedule, rates: ExchangeRates) -> Self {
        Self {
            fees,
            rates,
            include_unprofitable: false,
        }
    }

    /// Keep crosses whose revenue does not cover fees.
    pub fn with_unprofitable(mut self, include: bool) -> Self {
        self.include_unprofitable = include;
        self
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn rates(&self) -> &ExchangeRates {
        &self.rates
    }

    /// Cross from buying `buy_book`'s asks and selling into `sell_book`'s bids.
    pub fn detect_directional_cross(
        &self,
        buy_book: &Arc<BookSnapshot>,
        sell_book: &Arc<BookSnapshot>,
    ) -> Result<Option<Cross>, CrossError> {
        if buy_book.volume_currency() != sell_book.volume_currency() {
            return Err(CrossError::MismatchedVolumeCurrencies {
                buy: buy_book.volume_currency().to_string(),
                sell: sell_book.volume_currency().to_string(),
            });
        }

        let price_currency = buy_book.price_currency();
        let rate = self
            .rates
            .rate(sell_book.price_currency(), price_currency)
            .ok_or_else(|| CrossError::MissingExchangeRate {
                from: sell_book.price_currency().to_string(),
                to: price_currency.to_string(),
            })?;
        let buy_fee = self.fees.taker_rate(&buy_book.exchange);
        let sell_fee = self.fees.taker_rate(&sell_book.exchange);

        let mut asks = buy_book.asks.iter().map(|l| (l.price, l.volume));
        let mut bids = sell_book.bids.iter().map(|l| (l.price * rate, l.volume));
        let mut ask = asks.next();
        let mut bid = bids.next();

        let mut volume = Decimal::ZERO;
        let mut revenue = Decimal::ZERO;
        let mut fees = Decimal::ZERO;

        while let (Some((ask_price, ask_left)), Some((bid_price, bid_left))) = (ask, bid) {
            if bid_price <= ask_price {
                break;
            }
            let traded = ask_left.min(bid_left);
            volume += traded;
            revenue += (bid_price - ask_price) * traded;
            fees += bid_price * traded * sell_fee + ask_price * traded * buy_fee;

            ask = if ask_left > traded {
                Some((ask_price, ask_left - traded))
            } else {
                asks.next()
            };
            bid = if bid_left > traded {
                Some((bid_price, bid_left - traded))
            } else {
                bids.next()
            };
        }

        if volume.is_zero() {
            return Ok(None);
        }

        let cross = Cross {
            buy_exchange: buy_book.exchange.clone(),
            sell_exchange: sell_book.exchange.clone(),
            volume: Money::new(volume, buy_book.volume_currency().clone()),
            revenue: Money::new(revenue, price_currency.clone()),
            fees: Money::new(fees, price_currency.clone()),
            buy_book: Arc::clone(buy_book),
            sell_book: Arc::clone(sell_book),
        };

        if !self.include_unprofitable && !cross.is_profitable() {
            debug!(
                buy = %cross.buy_exchange,
                sell = %cross.sell_exchange,
                revenue = %cross.revenue,
                fees = %cross.fees,
                "Discarding unprofitable cross"
            );
            return Ok(None);
        }
        Ok(Some(cross))
    }

    /// Cross between two books in either direction; the more profitable one
    /// if both directions cross.
    pub fn detect_cross(
        &self,
        book1: &Arc<BookSnapshot>,
        book2: &Arc<BookSnapshot>,
    ) -> Result<Option<Cross>, CrossError> {
        let forward = self.detect_directional_cross(book1, book2)?;
        let backward = self.detect_directional_cross(book2, book1)?;

        match (forward, backward) {
            (Some(a), Some(b)) => {
                let b_profit = self.rates.convert(&b.profit(), &a.revenue.currency)?;
                if b_profit.amount > a.profit().amount {
                    Ok(Some(b))
                } else {
                    Ok(Some(a))
                }
            }
            (a, b) => Ok(a.or(b)),
        }
    }

    /// Crosses over every unordered pair of books, most profitable first.
    ///
    /// Profits are ranked in the first book's price currency.
    pub fn detect_crosses_between_many(
        &self,
        books: &[Arc<BookSnapshot>],
    ) -> Result<Vec<Cross>, CrossError> {
        let Some(reference) = books.first().map(|b| b.price_currency().clone()) else {
            return Ok(Vec::new());
        };

        let mut ranked = Vec::new();
        for (i, book1) in books.iter().enumerate() {
            for book2 in &books[i + 1..] {
                if let Some(cross) = self.detect_cross(book1, book2)? {
                    let key = self.rates.convert(&cross.profit(), &reference)?.amount;
                    ranked.push((key, cross));
                }
            }
        }

        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(ranked.into_iter().map(|(_, cross)| cross).collect())
    }

    /// Volume of `cross` both balances can execute, at this detector's fees.
    pub fn executable_volume(
        &self,
        cross: &Cross,
        buy_balance: &Balance,
        sell_balance: &Balance,
    ) -> Money {
        sizing::executable_volume(cross, buy_balance, sell_balance, &self.fees)
    }
}
