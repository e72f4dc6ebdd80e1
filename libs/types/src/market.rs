//! Core market data primitives: trades, candles and order book levels.

use crate::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Taker side of a trade, or direction of a routed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Aggressor bought (or: order to buy)
    Buy,
    /// Aggressor sold (or: order to sell)
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// A single executed trade print. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution price
    pub price: Decimal,
    /// Executed base-asset volume
    pub volume: Decimal,
    /// Venue-reported execution time
    pub timestamp: DateTime<Utc>,
    /// Taker side
    pub side: Side,
}

impl Trade {
    /// Construct a trade print.
    pub fn new(price: Decimal, volume: Decimal, timestamp: DateTime<Utc>, side: Side) -> Self {
        Self {
            price,
            volume,
            timestamp,
            side,
        }
    }
}

/// One OHLC candle for a (venue, symbol, timeframe, open_time).
///
/// Created on the first trade of a period, mutated in place by later trades
/// of the same period (`high`/`low`/`close` only, never `open`), immutable
/// once the period closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Period open time (aligned to the timeframe boundary)
    pub open_time: DateTime<Utc>,
    /// First trade price of the period
    pub open: Decimal,
    /// Highest trade price so far
    pub high: Decimal,
    /// Lowest trade price so far
    pub low: Decimal,
    /// Most recent trade price
    pub close: Decimal,
}

impl Candle {
    /// Open a fresh candle from the first trade of a period.
    pub fn open_at(open_time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    /// Fold a trade price into the open candle. `open` is never touched.
    pub fn apply_price(&mut self, price: Decimal) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
    }

    /// Whether a trade at `ts` belongs to a later period than this candle.
    pub fn period_elapsed(&self, timeframe: Timeframe, ts: DateTime<Utc>) -> bool {
        timeframe.align(ts) > self.open_time
    }
}

/// A single price level on one side of a venue's order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Level price
    pub price: Decimal,
    /// Available base-asset volume at that price
    pub volume: Decimal,
}

impl OrderBookLevel {
    /// Construct a level.
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// A venue-scoped order book snapshot: bids descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Bid levels, best (highest) first
    pub bids: Vec<OrderBookLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<OrderBookLevel>,
    /// Snapshot time
    pub as_of: DateTime<Utc>,
}

impl OrderBook {
    /// Build a book from unordered levels, sorting each side canonically.
    pub fn from_levels(
        mut bids: Vec<OrderBookLevel>,
        mut asks: Vec<OrderBookLevel>,
        as_of: DateTime<Utc>,
    ) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self { bids, asks, as_of }
    }

    /// Best (highest) bid, if any.
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    /// Best (lowest) ask, if any.
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }

    /// Top of book, present only when both sides have at least one level.
    pub fn top(&self) -> Option<BookTop> {
        Some(BookTop {
            bid: self.best_bid()?.clone(),
            ask: self.best_ask()?.clone(),
            as_of: self.as_of,
        })
    }
}

/// Best bid/ask pair for one venue at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTop {
    /// Best bid level
    pub bid: OrderBookLevel,
    /// Best ask level
    pub ask: OrderBookLevel,
    /// Snapshot time
    pub as_of: DateTime<Utc>,
}

impl BookTop {
    /// Quoted spread (ask − bid).
    pub fn spread(&self) -> Decimal {
        self.ask.price - self.bid.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_candle_open_never_changes() {
        let mut candle = Candle::open_at(ts(0), dec!(100));
        candle.apply_price(dec!(105));
        candle.apply_price(dec!(95));
        candle.apply_price(dec!(101));
        assert_eq!(candle.open, dec!(100));
        assert_eq!(candle.high, dec!(105));
        assert_eq!(candle.low, dec!(95));
        assert_eq!(candle.close, dec!(101));
    }

    #[test]
    fn test_period_elapsed() {
        let candle = Candle::open_at(Timeframe::M1.align(ts(60)), dec!(1));
        assert!(!candle.period_elapsed(Timeframe::M1, ts(119)));
        assert!(candle.period_elapsed(Timeframe::M1, ts(120)));
    }

    #[test]
    fn test_book_sides_sorted() {
        let book = OrderBook::from_levels(
            vec![
                OrderBookLevel::new(dec!(99), dec!(1)),
                OrderBookLevel::new(dec!(100), dec!(2)),
            ],
            vec![
                OrderBookLevel::new(dec!(102), dec!(1)),
                OrderBookLevel::new(dec!(101), dec!(3)),
            ],
            ts(0),
        );
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
        assert_eq!(book.best_ask().unwrap().price, dec!(101));
        let top = book.top().unwrap();
        assert_eq!(top.spread(), dec!(1));
    }

    #[test]
    fn test_empty_side_has_no_top() {
        let book = OrderBook::from_levels(vec![], vec![OrderBookLevel::new(dec!(1), dec!(1))], ts(0));
        assert!(book.top().is_none());
    }

    proptest! {
        /// Applying any sequence of trade prices to an open candle keeps the
        /// OHLC invariants: open fixed, high is the running max, low the
        /// running min, close the latest price.
        #[test]
        fn prop_candle_invariants(open in 1u64..1_000_000, prices in prop::collection::vec(1u64..1_000_000, 1..50)) {
            let open = Decimal::from(open);
            let mut candle = Candle::open_at(ts(0), open);
            let mut expected_high = open;
            let mut expected_low = open;

            for raw in &prices {
                let price = Decimal::from(*raw);
                expected_high = expected_high.max(price);
                expected_low = expected_low.min(price);
                candle.apply_price(price);

                prop_assert_eq!(candle.open, open);
                prop_assert_eq!(candle.high, expected_high);
                prop_assert_eq!(candle.low, expected_low);
                prop_assert_eq!(candle.close, price);
                prop_assert!(candle.low <= candle.high);
            }

            let last = Decimal::from(*prices.last().unwrap());
            prop_assert_eq!(candle.close, last);
        }
    }
}
