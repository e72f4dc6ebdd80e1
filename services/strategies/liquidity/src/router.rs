//! Smart order routing across venues.
//!
//! A plan is built greedily from the freshest aggregation round: best price
//! first, consume each venue's quoted volume, stop when filled. Partial
//! fills are valid plans; callers compare `total_amount` against what they
//! asked for. Execution is optional and delegated; the router validates
//! venue capability before any leg leaves the building, so a plan either
//! executes in full or not at all.

use crate::aggregator::LiquidityAggregator;
use adapter_service::{
    AdapterError, ExecutionDelegate, FillRecord, OrderRequest, OrderResult, PersistenceDelegate,
    Result, VenueAdapter,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use types::{AggregatedLiquidity, ExecutionLeg, ExecutionPlan, Side, Symbol, VenueId};

pub struct SmartOrderRouter {
    aggregator: Arc<LiquidityAggregator>,
    capabilities: HashMap<VenueId, bool>,
    execution: Option<Arc<dyn ExecutionDelegate>>,
    persistence: Option<Arc<dyn PersistenceDelegate>>,
}

impl SmartOrderRouter {
    pub fn new(aggregator: Arc<LiquidityAggregator>, adapters: &[Arc<dyn VenueAdapter>]) -> Self {
        let capabilities = adapters
            .iter()
            .map(|adapter| {
                (
                    adapter.venue(),
                    adapter.capabilities().supports_order_placement,
                )
            })
            .collect();
        Self {
            aggregator,
            capabilities,
            execution: None,
            persistence: None,
        }
    }

    /// Attach an order-placement capability.
    pub fn with_execution_delegate(mut self, delegate: Arc<dyn ExecutionDelegate>) -> Self {
        self.execution = Some(delegate);
        self
    }

    /// Attach a fill bookkeeping capability.
    pub fn with_persistence_delegate(mut self, delegate: Arc<dyn PersistenceDelegate>) -> Self {
        self.persistence = Some(delegate);
        self
    }

    /// Plan how `amount` of `symbol` would be filled across venues.
    pub async fn route(
        &self,
        symbol: &Symbol,
        side: Side,
        amount: Decimal,
    ) -> Result<ExecutionPlan> {
        if amount <= Decimal::ZERO {
            return Err(AdapterError::Configuration(
                "route amount must be positive".to_string(),
            ));
        }
        let liquidity = self.aggregator.aggregated_liquidity(symbol).await?;
        let plan = build_plan(&liquidity, side, amount);
        if plan.total_amount < amount {
            info!(%symbol, %side, requested = %amount, filled = %plan.total_amount,
                "quoted volume only covers a partial fill");
        }
        Ok(plan)
    }

    /// Execute every leg of a plan through the injected delegate.
    ///
    /// Fails up front without placing anything when no delegate is attached
    /// or any leg's venue does not accept orders.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        symbol: &Symbol,
        side: Side,
    ) -> Result<Vec<OrderResult>> {
        let delegate = self.execution.as_ref().ok_or_else(|| {
            AdapterError::NotSupported("no execution delegate configured".to_string())
        })?;
        for leg in &plan.legs {
            let accepts = self.capabilities.get(&leg.venue).copied().unwrap_or(false);
            if !accepts {
                return Err(AdapterError::unsupported(leg.venue, "order placement"));
            }
        }

        let mut results = Vec::with_capacity(plan.legs.len());
        for leg in &plan.legs {
            let request =
                OrderRequest::limit(leg.venue, symbol.clone(), side, leg.amount, leg.price);
            let result = delegate.place_order(&request).await?;
            info!(venue = %result.venue, %symbol, filled = %result.filled_amount,
                price = %result.average_price, order_ref = %result.order_ref, "leg executed");

            if let Some(persistence) = &self.persistence {
                let fill = FillRecord::from_result(&result);
                if let Err(e) = persistence.record_fill(&fill).await {
                    warn!(venue = %result.venue, error = %e, "fill bookkeeping failed");
                }
            }
            results.push(result);
        }
        Ok(results)
    }
}

/// Greedy best-price plan over one aggregation round. Pure; consumes quoted
/// top-of-book volume only.
pub(crate) fn build_plan(
    liquidity: &AggregatedLiquidity,
    side: Side,
    amount: Decimal,
) -> ExecutionPlan {
    let mut quotes: Vec<(VenueId, Decimal, Decimal)> = liquidity
        .sources
        .iter()
        .map(|s| match side {
            Side::Buy => (s.venue, s.ask_price, s.ask_volume),
            Side::Sell => (s.venue, s.bid_price, s.bid_volume),
        })
        .filter(|(_, _, volume)| *volume > Decimal::ZERO)
        .collect();

    // Stable sort keeps venue-list order among equal prices.
    match side {
        Side::Buy => quotes.sort_by(|a, b| a.1.cmp(&b.1)),
        Side::Sell => quotes.sort_by(|a, b| b.1.cmp(&a.1)),
    }

    let mut legs = Vec::new();
    let mut remaining = amount;
    for (venue, price, volume) in quotes {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(volume);
        legs.push(ExecutionLeg {
            venue,
            amount: take,
            price,
            cost: take * price,
        });
        remaining -= take;
    }

    if legs.is_empty() {
        return ExecutionPlan::empty();
    }

    let total_amount: Decimal = legs.iter().map(|leg| leg.amount).sum();
    let total_cost: Decimal = legs.iter().map(|leg| leg.cost).sum();
    let average_price = total_cost / total_amount;
    // Worst consumed price is always the last leg after sorting.
    let worst_price = legs[legs.len() - 1].price;
    let estimated_savings_vs_worst_venue = (worst_price - average_price).abs() * total_amount;

    ExecutionPlan {
        total_amount,
        total_cost,
        average_price,
        legs,
        estimated_savings_vs_worst_venue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::config::AggregatorConfig;
    use crate::testutil::{source, MockVenue};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use types::{BookTop, OrderBookLevel};

    fn btc_usd() -> Symbol {
        Symbol::new("BTC", "USD")
    }

    fn round(sources: Vec<types::LiquiditySource>) -> AggregatedLiquidity {
        aggregate(btc_usd(), sources).unwrap()
    }

    #[test]
    fn test_buy_plan_consumes_cheapest_first() {
        // Buy 10: A has 4 @ 101, B has plenty @ 102.
        let liquidity = round(vec![
            source(VenueId::Binance, dec!(100), dec!(5), dec!(101), dec!(4)),
            source(VenueId::Coinbase, dec!(100), dec!(5), dec!(102), dec!(100)),
        ]);
        let plan = build_plan(&liquidity, Side::Buy, dec!(10));

        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].venue, VenueId::Binance);
        assert_eq!(plan.legs[0].amount, dec!(4));
        assert_eq!(plan.legs[0].price, dec!(101));
        assert_eq!(plan.legs[1].venue, VenueId::Coinbase);
        assert_eq!(plan.legs[1].amount, dec!(6));
        assert_eq!(plan.legs[1].price, dec!(102));
        assert_eq!(plan.total_amount, dec!(10));
        assert_eq!(plan.average_price, dec!(101.6));
        assert_eq!(plan.total_cost, dec!(1016));
        // Everything at the worst price would cost 102; savings 0.4 × 10.
        assert_eq!(plan.estimated_savings_vs_worst_venue, dec!(4.0));
    }

    #[test]
    fn test_sell_plan_consumes_highest_bid_first() {
        let liquidity = round(vec![
            source(VenueId::Binance, dec!(100), dec!(5), dec!(103), dec!(1)),
            source(VenueId::Kraken, dec!(101), dec!(3), dec!(103), dec!(1)),
        ]);
        let plan = build_plan(&liquidity, Side::Sell, dec!(6));

        assert_eq!(plan.legs[0].venue, VenueId::Kraken);
        assert_eq!(plan.legs[0].amount, dec!(3));
        assert_eq!(plan.legs[1].venue, VenueId::Binance);
        assert_eq!(plan.legs[1].amount, dec!(3));
        assert_eq!(plan.average_price, dec!(100.5));
    }

    #[test]
    fn test_partial_fill_is_a_valid_plan() {
        let liquidity = round(vec![source(
            VenueId::Binance,
            dec!(100),
            dec!(5),
            dec!(101),
            dec!(4),
        )]);
        let plan = build_plan(&liquidity, Side::Buy, dec!(20));
        assert_eq!(plan.total_amount, dec!(4));
        assert!(plan.total_amount < dec!(20));
    }

    #[test]
    fn test_no_quoted_volume_yields_empty_plan() {
        let liquidity = round(vec![source(
            VenueId::Binance,
            dec!(100),
            dec!(0),
            dec!(101),
            dec!(0),
        )]);
        let plan = build_plan(&liquidity, Side::Buy, dec!(1));
        assert_eq!(plan.total_amount, Decimal::ZERO);
        assert!(plan.legs.is_empty());
    }

    fn top(bid: Decimal, bid_vol: Decimal, ask: Decimal, ask_vol: Decimal) -> BookTop {
        BookTop {
            bid: OrderBookLevel::new(bid, bid_vol),
            ask: OrderBookLevel::new(ask, ask_vol),
            as_of: Utc::now(),
        }
    }

    fn router_over(venues: Vec<Arc<MockVenue>>) -> SmartOrderRouter {
        let adapters: Vec<Arc<dyn VenueAdapter>> = venues
            .into_iter()
            .map(|venue| venue as Arc<dyn VenueAdapter>)
            .collect();
        let aggregator = Arc::new(LiquidityAggregator::new(
            adapters.clone(),
            AggregatorConfig::default(),
        ));
        SmartOrderRouter::new(aggregator, &adapters)
    }

    #[tokio::test]
    async fn test_route_rejects_non_positive_amount() {
        let router = router_over(vec![Arc::new(MockVenue::with_top(
            VenueId::Binance,
            top(dec!(100), dec!(1), dec!(101), dec!(1)),
        ))]);
        let err = router.route(&btc_usd(), Side::Buy, dec!(0)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Configuration(_)));
    }

    struct RecordingDelegate {
        placed: Mutex<Vec<OrderRequest>>,
    }

    impl RecordingDelegate {
        fn new() -> Self {
            Self {
                placed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExecutionDelegate for RecordingDelegate {
        async fn place_order(&self, request: &OrderRequest) -> adapter_service::Result<OrderResult> {
            let order_ref = {
                let mut placed = self.placed.lock();
                placed.push(request.clone());
                format!("ord-{}", placed.len())
            };
            Ok(OrderResult {
                venue: request.venue,
                symbol: request.symbol.clone(),
                side: request.side,
                filled_amount: request.amount,
                average_price: request.price.unwrap_or_default(),
                order_ref,
            })
        }
    }

    struct FailingLedger;

    #[async_trait]
    impl PersistenceDelegate for FailingLedger {
        async fn record_fill(&self, _fill: &FillRecord) -> adapter_service::Result<()> {
            Err(AdapterError::NotSupported("ledger offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_execute_without_delegate_is_unsupported() {
        let router = router_over(vec![Arc::new(MockVenue::trading(
            VenueId::Binance,
            top(dec!(100), dec!(1), dec!(101), dec!(1)),
        ))]);
        let plan = router.route(&btc_usd(), Side::Buy, dec!(1)).await.unwrap();
        let err = router.execute(&plan, &btc_usd(), Side::Buy).await.unwrap_err();
        assert_eq!(err.kind(), adapter_service::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_execute_refuses_data_only_venue_before_placing() {
        let delegate = Arc::new(RecordingDelegate::new());
        // with_top venues do not accept orders.
        let router = router_over(vec![Arc::new(MockVenue::with_top(
            VenueId::Gemini,
            top(dec!(100), dec!(2), dec!(101), dec!(2)),
        ))])
        .with_execution_delegate(delegate.clone());

        let plan = router.route(&btc_usd(), Side::Buy, dec!(1)).await.unwrap();
        let err = router.execute(&plan, &btc_usd(), Side::Buy).await.unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));
        assert!(delegate.placed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_execute_places_each_leg_in_plan_order() {
        let delegate = Arc::new(RecordingDelegate::new());
        let router = router_over(vec![
            Arc::new(MockVenue::trading(
                VenueId::Binance,
                top(dec!(100), dec!(5), dec!(101), dec!(4)),
            )),
            Arc::new(MockVenue::trading(
                VenueId::Coinbase,
                top(dec!(100), dec!(5), dec!(102), dec!(100)),
            )),
        ])
        .with_execution_delegate(delegate.clone())
        .with_persistence_delegate(Arc::new(FailingLedger));

        let plan = router.route(&btc_usd(), Side::Buy, dec!(10)).await.unwrap();
        // Bookkeeping failures must not fail the execution.
        let results = router.execute(&plan, &btc_usd(), Side::Buy).await.unwrap();

        assert_eq!(results.len(), 2);
        let placed = delegate.placed.lock();
        assert_eq!(placed[0].venue, VenueId::Binance);
        assert_eq!(placed[0].amount, dec!(4));
        assert_eq!(placed[0].price, Some(dec!(101)));
        assert_eq!(placed[1].venue, VenueId::Coinbase);
        assert_eq!(placed[1].amount, dec!(6));
    }
}
