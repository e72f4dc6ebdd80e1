//! Cross-venue liquidity aggregates and execution plans.
//!
//! These are derived values: recomputed from live venue snapshots, cached
//! briefly, never persisted.

use crate::{BookTop, Symbol, VenueId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One venue's contribution to an aggregation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySource {
    /// Venue this snapshot came from
    pub venue: VenueId,
    /// Canonical symbol
    pub symbol: Symbol,
    /// Best bid price
    pub bid_price: Decimal,
    /// Best ask price
    pub ask_price: Decimal,
    /// Volume available at the best bid
    pub bid_volume: Decimal,
    /// Volume available at the best ask
    pub ask_volume: Decimal,
    /// Quoted spread (ask − bid)
    pub spread: Decimal,
    /// Snapshot time
    pub as_of: DateTime<Utc>,
}

impl LiquiditySource {
    /// Derive a source from a venue book top.
    pub fn from_top(venue: VenueId, symbol: Symbol, top: &BookTop) -> Self {
        Self {
            venue,
            symbol,
            bid_price: top.bid.price,
            ask_price: top.ask.price,
            bid_volume: top.bid.volume,
            ask_volume: top.ask.volume,
            spread: top.spread(),
            as_of: top.as_of,
        }
    }
}

/// The merged best-price view across every venue quoting a symbol.
///
/// Invariant: `best_bid` is the maximum bid and `best_ask` the minimum ask
/// over `sources`; ties go to the larger quoted volume, then to venue-list
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLiquidity {
    /// Canonical symbol
    pub symbol: Symbol,
    /// Highest bid across sources
    pub best_bid: Decimal,
    /// Venue quoting the best bid
    pub best_bid_venue: VenueId,
    /// Lowest ask across sources
    pub best_ask: Decimal,
    /// Venue quoting the best ask
    pub best_ask_venue: VenueId,
    /// Σ bid volume across sources
    pub total_bid_volume: Decimal,
    /// Σ ask volume across sources
    pub total_ask_volume: Decimal,
    /// Σ(bid×vol)/Σ(vol) across sources
    pub volume_weighted_bid: Decimal,
    /// Σ(ask×vol)/Σ(vol) across sources
    pub volume_weighted_ask: Decimal,
    /// The per-venue snapshots this round merged, in venue-list order
    pub sources: Vec<LiquiditySource>,
    /// Aggregation time
    pub as_of: DateTime<Utc>,
}

/// One venue's slice of a routed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLeg {
    /// Venue to execute on
    pub venue: VenueId,
    /// Base-asset amount for this leg
    pub amount: Decimal,
    /// Quoted price for this leg
    pub price: Decimal,
    /// amount × price
    pub cost: Decimal,
}

/// The venue-by-venue breakdown of how an order would be filled.
///
/// `total_amount` may be less than requested when venues ran out of quoted
/// volume; a partial plan is a valid result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Filled base-asset amount (≤ requested)
    pub total_amount: Decimal,
    /// Σ leg costs
    pub total_cost: Decimal,
    /// total_cost / total_amount
    pub average_price: Decimal,
    /// Per-venue slices, in consumption order
    pub legs: Vec<ExecutionLeg>,
    /// |worst single-venue price − average_price| × total_amount; informational
    pub estimated_savings_vs_worst_venue: Decimal,
}

impl ExecutionPlan {
    /// An empty plan (nothing could be filled).
    pub fn empty() -> Self {
        Self {
            total_amount: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            average_price: Decimal::ZERO,
            legs: Vec::new(),
            estimated_savings_vs_worst_venue: Decimal::ZERO,
        }
    }
}
