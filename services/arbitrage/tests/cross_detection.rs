//! Cross detection over books reconciled by market-data connectors
//!
//! Tests include:
//! - Crosses between books produced by real feed reconciliation
//! - Executable volume sizing against balances
//! - Cross invariants under arbitrary books (property test)

use std::sync::Arc;

use arbitrage::sizing::{executable_volume, max_buy_volume};
use arbitrage::CrossDetector;
use market_data::events::{SnapshotEntry, UpdateBatch};
use market_data::order_book::PriceLevelBook;
use market_data::reconcile::{ReconciliationEngine, TimestampKeyedEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use types::account::Balance;
use types::book::{BookSnapshot, PriceLevel, SequenceMarker};
use types::currency::{Currency, ExchangeRates};
use types::fee::FeeSchedule;
use types::ids::{ExchangeId, Pair};

fn dec(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

fn reconciled_book(exchange: &str, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Arc<BookSnapshot> {
    let entries = |raw: &[(&str, &str)]| -> Vec<SnapshotEntry> {
        raw.iter().map(|(p, v)| SnapshotEntry::level(dec(p), dec(v))).collect()
    };
    let mut book = PriceLevelBook::new(ExchangeId::new(exchange), Pair::parse("BTC/USD").unwrap());
    let mut engine = TimestampKeyedEngine::new();
    engine.apply(
        &mut book,
        UpdateBatch::snapshot(entries(bids), entries(asks), SequenceMarker::Timestamp(1)),
    );
    Arc::new(book.snapshot(0))
}

#[test]
fn test_cross_between_reconciled_books() {
    let cheap = reconciled_book("kraken", &[("99", "1")], &[("100", "1")]);
    let rich = reconciled_book("bitstamp", &[("105", "1")], &[("106", "1")]);

    let zero_fees = CrossDetector::default();
    let cross = zero_fees.detect_cross(&rich, &cheap).unwrap().unwrap();
    assert_eq!(cross.buy_exchange.as_str(), "kraken");
    assert_eq!(cross.sell_exchange.as_str(), "bitstamp");
    assert_eq!(cross.volume.amount, dec("1"));
    assert_eq!(cross.revenue.amount, dec("5"));
    assert_eq!(cross.fees.amount, Decimal::ZERO);

    let fees = FeeSchedule::new()
        .with(ExchangeId::new("kraken"), dec("0.01"))
        .with(ExchangeId::new("bitstamp"), dec("0.01"));
    let cross = CrossDetector::new(fees, ExchangeRates::new())
        .detect_cross(&cheap, &rich)
        .unwrap()
        .unwrap();
    assert_eq!(cross.fees.amount, dec("2.05"));
    assert_eq!(cross.profit().amount, dec("2.95"));
}

#[test]
fn test_no_cross_between_reconciled_books() {
    let a = reconciled_book("kraken", &[("104", "1")], &[("106", "1")]);
    let b = reconciled_book("bitstamp", &[("105", "1")], &[("107", "1")]);
    assert!(CrossDetector::default().detect_cross(&a, &b).unwrap().is_none());
}

#[test]
fn test_executable_volume() {
    let buy = reconciled_book("kraken", &[], &[("100", "1"), ("110", "1")]);
    let sell = reconciled_book("bitstamp", &[("120", "2")], &[]);
    let cross = CrossDetector::default()
        .detect_directional_cross(&buy, &sell)
        .unwrap()
        .unwrap();

    let usd = Balance::new().with(Currency::new("USD"), Decimal::from(200));
    let btc = Balance::new().with(Currency::new("BTC"), dec("1.5"));
    let fees = FeeSchedule::new();

    let buy_cap = max_buy_volume(&cross, &usd, &fees);
    assert_eq!(buy_cap.amount, Decimal::ONE + Decimal::from(100) / Decimal::from(110));
    assert_eq!(executable_volume(&cross, &usd, &btc, &fees).amount, dec("1.5"));
}

// ============================================================================
// Property: cross invariants
// ============================================================================

fn side(ascending: bool) -> impl Strategy<Value = Vec<PriceLevel>> {
    prop::collection::btree_map(90u32..110, 1i64..50, 0..8).prop_map(move |levels| {
        let mut levels: Vec<PriceLevel> = levels
            .into_iter()
            .map(|(p, v)| PriceLevel::new(Decimal::from(p), Decimal::new(v, 1)))
            .collect();
        if !ascending {
            levels.reverse();
        }
        levels
    })
}

fn book(exchange: &'static str) -> impl Strategy<Value = Arc<BookSnapshot>> {
    (side(false), side(true)).prop_map(move |(bids, asks)| {
        Arc::new(BookSnapshot::new(
            ExchangeId::new(exchange),
            Pair::parse("BTC/USD").unwrap(),
            bids,
            asks,
            SequenceMarker::None,
            0,
        ))
    })
}

proptest! {
    #[test]
    fn prop_cross_bounded_by_books(buy in book("a"), sell in book("b"), fee in 0i64..30) {
        let fees = FeeSchedule::new()
            .with(ExchangeId::new("a"), Decimal::new(fee, 3))
            .with(ExchangeId::new("b"), Decimal::new(fee, 3));
        let detector = CrossDetector::new(fees, ExchangeRates::new()).with_unprofitable(true);

        if let Some(cross) = detector.detect_directional_cross(&buy, &sell).unwrap() {
            let ask_total: Decimal = buy.asks.iter().map(|l| l.volume).sum();
            let bid_total: Decimal = sell.bids.iter().map(|l| l.volume).sum();
            prop_assert!(cross.volume.amount > Decimal::ZERO);
            prop_assert!(cross.volume.amount <= ask_total.min(bid_total));
            prop_assert!(cross.revenue.amount > Decimal::ZERO);
            prop_assert!(cross.fees.amount >= Decimal::ZERO);
            prop_assert_eq!(cross.profit().amount, cross.revenue.amount - cross.fees.amount);
            prop_assert!(buy.best_ask().unwrap().price < sell.best_bid().unwrap().price);
        } else {
            let crossing = match (buy.best_ask(), sell.best_bid()) {
                (Some(ask), Some(bid)) => bid.price > ask.price,
                _ => false,
            };
            prop_assert!(!crossing);
        }
    }
}
