//! Engine lifecycle: configuration in, running service out.
//!
//! Wires adapters → pool → hub → aggregator/router/scanner, owns startup
//! subscriptions and shutdown. Everything is explicitly constructed and
//! injected; a test can build an engine against mock venues and tear it
//! down without touching global state.

use crate::aggregator::LiquidityAggregator;
use crate::config::EngineConfig;
use crate::router::SmartOrderRouter;
use crate::scanner::ArbitrageScanner;
use adapter_service::{
    build_adapter, ExecutionDelegate, MarketDataHub, PersistenceDelegate, VenueAdapter,
};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use types::{Symbol, Timeframe, VenueId};

pub struct LiquidityEngine {
    hub: Arc<MarketDataHub>,
    aggregator: Arc<LiquidityAggregator>,
    router: SmartOrderRouter,
    scanner: ArbitrageScanner,
    subscriptions: Vec<(VenueId, Symbol)>,
    stream_timeframe: Timeframe,
}

impl LiquidityEngine {
    /// Build the full component graph from a validated configuration.
    pub fn build(config: EngineConfig) -> anyhow::Result<Self> {
        let EngineConfig {
            market_data,
            aggregator: aggregator_config,
            scanner: scanner_config,
            stream_timeframe,
        } = config;

        let mut adapters: Vec<Arc<dyn VenueAdapter>> = Vec::new();
        for (venue, venue_config) in &market_data.venues {
            if !venue_config.enabled {
                continue;
            }
            let adapter = build_adapter(*venue, &market_data)
                .with_context(|| format!("failed to build {venue} adapter"))?;
            adapters.push(adapter);
        }
        if adapters.is_empty() {
            anyhow::bail!("no venues enabled");
        }

        let subscriptions: Vec<(VenueId, Symbol)> = market_data
            .venues
            .iter()
            .filter(|(_, venue_config)| venue_config.enabled)
            .flat_map(|(venue, venue_config)| {
                venue_config
                    .symbols
                    .iter()
                    .cloned()
                    .map(move |symbol| (*venue, symbol))
            })
            .collect();

        let hub = Arc::new(MarketDataHub::new(market_data, adapters.clone()));
        let aggregator = Arc::new(LiquidityAggregator::new(
            adapters.clone(),
            aggregator_config,
        ));
        let router = SmartOrderRouter::new(aggregator.clone(), &adapters);
        let scanner = ArbitrageScanner::new(aggregator.clone(), scanner_config);

        Ok(Self {
            hub,
            aggregator,
            router,
            scanner,
            subscriptions,
            stream_timeframe,
        })
    }

    /// Attach an order-placement capability to the router.
    pub fn with_execution_delegate(mut self, delegate: Arc<dyn ExecutionDelegate>) -> Self {
        self.router = self.router.with_execution_delegate(delegate);
        self
    }

    /// Attach a fill bookkeeping capability to the router.
    pub fn with_persistence_delegate(mut self, delegate: Arc<dyn PersistenceDelegate>) -> Self {
        self.router = self.router.with_persistence_delegate(delegate);
        self
    }

    /// Start the hub and establish every configured market data feed.
    ///
    /// A venue that fails to subscribe is logged and skipped; the engine
    /// runs with whatever feeds came up.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.hub.start();

        let mut live = 0usize;
        for (venue, symbol) in &self.subscriptions {
            match self
                .hub
                .subscribe(*venue, symbol.clone(), self.stream_timeframe)
                .await
            {
                Ok(_stream) => live += 1,
                Err(e) => warn!(%venue, %symbol, error = %e, "subscription failed at startup"),
            }
        }
        if live == 0 {
            anyhow::bail!("no market data feed could be established");
        }
        info!(
            feeds = live,
            configured = self.subscriptions.len(),
            "market data subscriptions established"
        );
        Ok(())
    }

    pub fn hub(&self) -> &Arc<MarketDataHub> {
        &self.hub
    }

    pub fn aggregator(&self) -> &Arc<LiquidityAggregator> {
        &self.aggregator
    }

    pub fn router(&self) -> &SmartOrderRouter {
        &self.router
    }

    pub fn scanner(&self) -> &ArbitrageScanner {
        &self.scanner
    }

    /// Stop the hub consumer and close every venue connection.
    pub async fn shutdown(&self) {
        self.hub.shutdown().await;
        info!("engine stopped");
    }
}
