//! Executable volume
//!
//! A cross is only worth what the account can actually trade:
//! - sell leg: limited by the base-currency balance on the sell exchange
//! - buy leg: limited by the quote-currency balance on the buy exchange,
//!   walking the buy book's asks and paying the taker fee on each tier

use rust_decimal::Decimal;
use types::account::Balance;
use types::currency::Money;
use types::fee::FeeSchedule;

use crate::cross::Cross;

/// Base volume sellable into the cross given the sell exchange balance.
pub fn max_sell_volume(cross: &Cross, sell_balance: &Balance) -> Money {
    let available = sell_balance.available(&cross.volume.currency);
    Money::new(
        cross.volume.amount.min(available.amount),
        cross.volume.currency.clone(),
    )
}

/// Base volume the buy exchange balance can pay for, fees included.
pub fn max_buy_volume(cross: &Cross, buy_balance: &Balance, fees: &FeeSchedule) -> Money {
    let book = &cross.buy_book;
    let fee_factor = Decimal::ONE + fees.taker_rate(&cross.buy_exchange);
    let mut remaining = buy_balance.available(book.price_currency()).amount;
    let mut volume = Decimal::ZERO;

    for level in &book.asks {
        if remaining <= Decimal::ZERO || level.price <= Decimal::ZERO {
            break;
        }
        let cost = level.price * level.volume * fee_factor;
        if cost <= remaining {
            volume += level.volume;
            remaining -= cost;
        } else {
            volume += (remaining / fee_factor) / level.price;
            break;
        }
    }

    Money::new(volume, book.volume_currency().clone())
}

/// Volume both legs can execute.
pub fn executable_volume(
    cross: &Cross,
    buy_balance: &Balance,
    sell_balance: &Balance,
    fees: &FeeSchedule,
) -> Money {
    let buy_cap = max_buy_volume(cross, buy_balance, fees);
    let sell_cap = max_sell_volume(cross, sell_balance);
    Money::new(buy_cap.amount.min(sell_cap.amount), sell_cap.currency)
}
