//! Cross-venue liquidity aggregation.
//!
//! One aggregation round fans out a book-top fetch to every venue that can
//! answer, with bounded concurrency and a per-venue timeout so a slow venue
//! cannot stall the round. A failing or slow venue is excluded, not fatal;
//! only a round with zero usable snapshots errors. Rounds are cached briefly
//! so chatty consumers (router, scanner, UI polling) do not hammer venue
//! REST endpoints.

use crate::config::AggregatorConfig;
use adapter_service::{AdapterError, Result, VenueAdapter};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use types::{AggregatedLiquidity, LiquiditySource, Symbol};

pub struct LiquidityAggregator {
    adapters: Vec<Arc<dyn VenueAdapter>>,
    config: AggregatorConfig,
    cache: RwLock<HashMap<Symbol, AggregatedLiquidity>>,
}

impl LiquidityAggregator {
    pub fn new(adapters: Vec<Arc<dyn VenueAdapter>>, config: AggregatorConfig) -> Self {
        Self {
            adapters,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The merged best-price view for a symbol, served from cache when the
    /// last round is still within the TTL.
    pub async fn aggregated_liquidity(&self, symbol: &Symbol) -> Result<AggregatedLiquidity> {
        let ttl = chrono::Duration::milliseconds(self.config.cache_ttl_ms as i64);
        if let Some(cached) = self.cache.read().get(symbol) {
            if Utc::now() - cached.as_of < ttl {
                debug!(%symbol, "aggregation served from cache");
                return Ok(cached.clone());
            }
        }

        let sources = self.collect_sources(symbol).await;
        let aggregated = aggregate(symbol.clone(), sources)?;
        self.cache
            .write()
            .insert(symbol.clone(), aggregated.clone());
        Ok(aggregated)
    }

    /// Fan out one round of book-top fetches. Exclusions are logged, never
    /// propagated; sources come back in venue-list order.
    async fn collect_sources(&self, symbol: &Symbol) -> Vec<LiquiditySource> {
        let timeout = Duration::from_millis(self.config.venue_timeout_ms);
        let capable: Vec<(usize, Arc<dyn VenueAdapter>)> = self
            .adapters
            .iter()
            .filter(|adapter| adapter.capabilities().supports_book_snapshot)
            .cloned()
            .enumerate()
            .collect();

        let mut rounds: Vec<(usize, LiquiditySource)> = stream::iter(capable)
            .map(|(order, adapter)| {
                let symbol = symbol.clone();
                async move {
                    let venue = adapter.venue();
                    match tokio::time::timeout(timeout, adapter.fetch_book_top(&symbol)).await {
                        Ok(Ok(top)) => {
                            Some((order, LiquiditySource::from_top(venue, symbol, &top)))
                        }
                        Ok(Err(e)) => {
                            warn!(%venue, %symbol, error = %e, "venue excluded from aggregation round");
                            None
                        }
                        Err(_) => {
                            warn!(%venue, %symbol, timeout_ms = timeout.as_millis() as u64,
                                "venue timed out; excluded from aggregation round");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_fetches)
            .filter_map(|round| async move { round })
            .collect()
            .await;

        rounds.sort_by_key(|(order, _)| *order);
        rounds.into_iter().map(|(_, source)| source).collect()
    }
}

/// Merge one round of per-venue snapshots. Pure so the selection rules are
/// testable without any venue wiring.
pub(crate) fn aggregate(
    symbol: Symbol,
    sources: Vec<LiquiditySource>,
) -> Result<AggregatedLiquidity> {
    if sources.is_empty() {
        return Err(AdapterError::NoLiquidity { symbol });
    }

    // Ties go to the larger quoted volume, then to venue-list order.
    let mut best_bid = &sources[0];
    let mut best_ask = &sources[0];
    for source in &sources[1..] {
        if source.bid_price > best_bid.bid_price
            || (source.bid_price == best_bid.bid_price && source.bid_volume > best_bid.bid_volume)
        {
            best_bid = source;
        }
        if source.ask_price < best_ask.ask_price
            || (source.ask_price == best_ask.ask_price && source.ask_volume > best_ask.ask_volume)
        {
            best_ask = source;
        }
    }

    let total_bid_volume: Decimal = sources.iter().map(|s| s.bid_volume).sum();
    let total_ask_volume: Decimal = sources.iter().map(|s| s.ask_volume).sum();
    let volume_weighted_bid = if total_bid_volume > Decimal::ZERO {
        sources
            .iter()
            .map(|s| s.bid_price * s.bid_volume)
            .sum::<Decimal>()
            / total_bid_volume
    } else {
        best_bid.bid_price
    };
    let volume_weighted_ask = if total_ask_volume > Decimal::ZERO {
        sources
            .iter()
            .map(|s| s.ask_price * s.ask_volume)
            .sum::<Decimal>()
            / total_ask_volume
    } else {
        best_ask.ask_price
    };

    Ok(AggregatedLiquidity {
        symbol,
        best_bid: best_bid.bid_price,
        best_bid_venue: best_bid.venue,
        best_ask: best_ask.ask_price,
        best_ask_venue: best_ask.venue,
        total_bid_volume,
        total_ask_volume,
        volume_weighted_bid,
        volume_weighted_ask,
        sources,
        as_of: Utc::now(),
    })
}
