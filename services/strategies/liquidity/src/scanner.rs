//! Cross-venue arbitrage scanning.
//!
//! Every ordered venue pair in an aggregation round is checked: buy at one
//! venue's ask, sell at another's bid. A pair is reported only when the
//! spread survives the round-trip fee AND clears the percentage threshold;
//! reported opportunities are ranked by estimated net profit over the
//! tradable volume. Fees are taker fees per venue, summed across both legs.

use crate::aggregator::LiquidityAggregator;
use crate::config::ScannerConfig;
use adapter_service::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use types::{AggregatedLiquidity, Symbol, VenueId};

/// One profitable venue pair, net of fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitrageOpportunity {
    /// Symbol the pair trades
    pub symbol: Symbol,
    /// Venue to buy at
    pub buy_venue: VenueId,
    /// Venue to sell at
    pub sell_venue: VenueId,
    /// Ask at the buy venue
    pub buy_price: Decimal,
    /// Bid at the sell venue
    pub sell_price: Decimal,
    /// sell_price − buy_price
    pub spread: Decimal,
    /// Spread as a percentage of the buy price
    pub spread_pct: Decimal,
    /// Round-trip fee in quote terms (buy price × summed fee rates)
    pub round_trip_fee: Decimal,
    /// spread − round_trip_fee
    pub net_spread: Decimal,
    /// min(buy-side ask volume, sell-side bid volume)
    pub tradable_volume: Decimal,
    /// net_spread × tradable_volume; the ranking key
    pub estimated_profit: Decimal,
    /// When the round was evaluated
    pub detected_at: DateTime<Utc>,
}

pub struct ArbitrageScanner {
    aggregator: Arc<LiquidityAggregator>,
    config: ScannerConfig,
}

impl ArbitrageScanner {
    pub fn new(aggregator: Arc<LiquidityAggregator>, config: ScannerConfig) -> Self {
        Self { aggregator, config }
    }

    /// Scan the freshest aggregation round for a symbol. Best opportunity
    /// first; empty when nothing survives fees and the threshold.
    pub async fn scan(&self, symbol: &Symbol) -> Result<Vec<ArbitrageOpportunity>> {
        let liquidity = self.aggregator.aggregated_liquidity(symbol).await?;
        let opportunities = evaluate(&liquidity, &self.config);
        debug!(%symbol, venues = liquidity.sources.len(), found = opportunities.len(),
            "arbitrage scan complete");
        Ok(opportunities)
    }
}

/// Evaluate every ordered venue pair in one round. Pure so the fee and
/// threshold model is testable without venue wiring.
pub(crate) fn evaluate(
    liquidity: &AggregatedLiquidity,
    config: &ScannerConfig,
) -> Vec<ArbitrageOpportunity> {
    let mut opportunities = Vec::new();
    let detected_at = Utc::now();

    for buy in &liquidity.sources {
        for sell in &liquidity.sources {
            if buy.venue == sell.venue {
                continue;
            }
            let spread = sell.bid_price - buy.ask_price;
            if spread <= Decimal::ZERO || buy.ask_price <= Decimal::ZERO {
                continue;
            }
            let spread_pct = spread / buy.ask_price * dec!(100);
            if spread_pct < config.min_spread_pct {
                continue;
            }
            let fee_rate = config.fee_for(buy.venue) + config.fee_for(sell.venue);
            let round_trip_fee = buy.ask_price * fee_rate / dec!(100);
            let net_spread = spread - round_trip_fee;
            if net_spread <= Decimal::ZERO {
                continue;
            }
            let tradable_volume = buy.ask_volume.min(sell.bid_volume);
            opportunities.push(ArbitrageOpportunity {
                symbol: liquidity.symbol.clone(),
                buy_venue: buy.venue,
                sell_venue: sell.venue,
                buy_price: buy.ask_price,
                sell_price: sell.bid_price,
                spread,
                spread_pct,
                round_trip_fee,
                net_spread,
                tradable_volume,
                estimated_profit: net_spread * tradable_volume,
                detected_at,
            });
        }
    }

    opportunities.sort_by(|a, b| b.estimated_profit.cmp(&a.estimated_profit));
    opportunities
}
