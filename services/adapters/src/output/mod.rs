//! Outbound delegate seams.
//!
//! The aggregation core never talks to trading or storage endpoints itself.
//! When a router plan is executed, each leg is handed to an injected
//! [`ExecutionDelegate`]; completed fills may be handed to an optional
//! [`PersistenceDelegate`] for bookkeeping. The core holds no durable state
//! and runs fine with both absent.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::{Side, Symbol, VenueId};

/// How an order should rest on the venue's book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Take whatever the book offers.
    Market,
    /// Rest at a price; requires [`OrderRequest::price`].
    Limit,
}

/// One order leg bound for a single venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// The venue to place on.
    pub venue: VenueId,
    /// The pair to trade.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Market or limit.
    pub order_type: OrderType,
    /// Base-asset quantity.
    pub amount: Decimal,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
}

impl OrderRequest {
    /// A market order for `amount` of `symbol` on `venue`.
    pub fn market(venue: VenueId, symbol: Symbol, side: Side, amount: Decimal) -> Self {
        Self {
            venue,
            symbol,
            side,
            order_type: OrderType::Market,
            amount,
            price: None,
        }
    }

    /// A limit order resting at `price`.
    pub fn limit(
        venue: VenueId,
        symbol: Symbol,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            venue,
            symbol,
            side,
            order_type: OrderType::Limit,
            amount,
            price: Some(price),
        }
    }
}

/// What actually happened to a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// The venue that executed.
    pub venue: VenueId,
    /// The pair traded.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Base-asset quantity filled; may be below the requested amount.
    pub filled_amount: Decimal,
    /// Volume-weighted fill price.
    pub average_price: Decimal,
    /// Venue-assigned order reference.
    pub order_ref: String,
}

/// A completed fill, offered to the persistence delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    /// The venue that filled.
    pub venue: VenueId,
    /// The pair traded.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Base-asset quantity filled.
    pub amount: Decimal,
    /// Volume-weighted fill price.
    pub price: Decimal,
    /// When the fill completed.
    pub executed_at: DateTime<Utc>,
}

impl FillRecord {
    /// Build a fill record from an execution result, stamped now.
    pub fn from_result(result: &OrderResult) -> Self {
        Self {
            venue: result.venue,
            symbol: result.symbol.clone(),
            side: result.side,
            amount: result.filled_amount,
            price: result.average_price,
            executed_at: Utc::now(),
        }
    }
}

/// Injected order-placement capability.
///
/// Called only from the router's execute step. Implementations own their
/// credentials and venue wiring; the core only checks the venue advertises
/// order placement before delegating.
#[async_trait]
pub trait ExecutionDelegate: Send + Sync {
    /// Place one order leg and report what filled.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult>;
}

/// Optional fill-record handoff for bookkeeping.
#[async_trait]
pub trait PersistenceDelegate: Send + Sync {
    /// Record one completed fill. Failures are logged, never fatal.
    async fn record_fill(&self, fill: &FillRecord) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_request_constructors() {
        let market = OrderRequest::market(
            VenueId::Binance,
            Symbol::new("BTC", "USDT"),
            Side::Buy,
            dec!(0.5),
        );
        assert_eq!(market.order_type, OrderType::Market);
        assert_eq!(market.price, None);

        let limit = OrderRequest::limit(
            VenueId::Kraken,
            Symbol::new("BTC", "USD"),
            Side::Sell,
            dec!(0.5),
            dec!(65000),
        );
        assert_eq!(limit.order_type, OrderType::Limit);
        assert_eq!(limit.price, Some(dec!(65000)));
    }

    #[test]
    fn test_fill_record_mirrors_result() {
        let result = OrderResult {
            venue: VenueId::Coinbase,
            symbol: Symbol::new("ETH", "USD"),
            side: Side::Buy,
            filled_amount: dec!(2),
            average_price: dec!(3100.25),
            order_ref: "ord-123".to_string(),
        };
        let fill = FillRecord::from_result(&result);
        assert_eq!(fill.venue, VenueId::Coinbase);
        assert_eq!(fill.amount, dec!(2));
        assert_eq!(fill.price, dec!(3100.25));
    }
}
