//! # Meridian Adapters - Venue Data Aggregation Layer
//!
//! ## Purpose
//!
//! Venue adapters, a supervised WebSocket connection pool and the market data
//! hub for the Meridian aggregation system. Normalizes trades, candles and
//! order book tops from heterogeneous exchange feeds into one canonical shape
//! so that strategy services never see venue spelling, units or field order.
//!
//! ## Integration Points
//!
//! - **Input Sources**: WebSocket streams and REST endpoints from four venues
//! - **Output Destinations**: per-shard broadcast channels consumed by
//!   strategy services and presentation layers
//! - **Execution Boundary**: injected [`ExecutionDelegate`] /
//!   [`PersistenceDelegate`] capabilities; the core places no orders itself
//! - **Configuration**: environment or JSON file, per-venue overrides
//! - **Error Handling**: one [`AdapterError`] taxonomy with a coarse
//!   [`ErrorKind`] for handling policy
//!
//! ## Architecture Role
//!
//! Adapters are the boundary between external exchange protocols and the
//! canonical market model in [`types`]. Everything venue-specific (symbol
//! spelling, timeframe vocabulary, timestamp units, price encoding, heartbeat
//! discipline) lives behind the [`VenueAdapter`] trait; everything above the
//! hub is venue-agnostic.
//!
//! ### ✅ Adapters ARE:
//! - **Normalizers**: venue JSON → [`types::Trade`] / [`types::Candle`]
//! - **Connection managers**: reconnect with exponential backoff, heartbeat
//!   and staleness detection, resubscribe-on-reconnect
//! - **Capability reporters**: each venue declares what it can do; callers
//!   get `Unsupported` instead of surprises
//!
//! ### ❌ Adapters are NOT:
//! - **Strategy logic** (no routing or arbitrage decisions here)
//! - **Durable storage** (in-memory rings and candle history only)
//! - **Order gateways** (execution is delegated, never embedded)
//!
//! ## Venue Matrix
//!
//! | Venue | Transport | Symbol spelling | Quirks |
//! |-------|-----------|-----------------|--------|
//! | [`BinanceAdapter`] | WebSocket + REST | `BTCUSDT` | text `ping`/`pong`, ms times |
//! | [`CoinbaseAdapter`] | WebSocket + REST | `BTC-USD` | maker-side flip, RFC3339 times |
//! | [`KrakenAdapter`] | WebSocket + REST | `XBT/USD` | XBT remap, signed session token |
//! | [`GeminiAdapter`] | REST polling | `btcusd` | no streaming, `1hr`/`1day` vocab |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use adapter_service::{build_adapter, MarketDataConfig, MarketDataHub};
//! use types::{Symbol, Timeframe, VenueId};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MarketDataConfig::from_env();
//!     config.validate()?;
//!
//!     let adapters = config
//!         .venues
//!         .iter()
//!         .filter(|(_, venue)| venue.enabled)
//!         .map(|(venue, _)| build_adapter(*venue, &config))
//!         .collect::<Result<Vec<_>, _>>()?;
//!
//!     let hub = MarketDataHub::new(config, adapters);
//!     hub.start();
//!
//!     let mut events = hub
//!         .subscribe(VenueId::Binance, Symbol::new("BTC", "USDT"), Timeframe::M1)
//!         .await?;
//!     while let Ok(event) = events.recv().await {
//!         tracing::info!(?event, "market event");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod hub;
pub mod input;
pub mod output;
pub mod rate_limit;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export the adapter surface
pub use error::{AdapterError, ErrorKind, Result};
pub use input::collectors::{
    build_adapter, BinanceAdapter, CoinbaseAdapter, GeminiAdapter, KrakenAdapter,
};
pub use input::connection::{ConnectionId, ConnectionPolicy, ConnectionState};
pub use input::pool::{ConnectionPool, ConnectionStats, PoolStats};
pub use input::{HeartbeatSpec, ParsedMessage, VenueAdapter, VenueCapabilities};

// Re-export the hub surface
pub use config::{HubConfig, MarketDataConfig, PoolConfig, VenueConfig};
pub use hub::{HubStats, MarketDataHub, MarketSnapshot};
pub use rate_limit::VenueRateLimiter;

// Re-export the delegate seams
pub use output::{
    ExecutionDelegate, FillRecord, OrderRequest, OrderResult, OrderType, PersistenceDelegate,
};

// Re-export canonical types for convenience
pub use types::{
    BookTop, Candle, FeedStatus, MarketEvent, OrderBook, OrderBookLevel, Side, Symbol, Timeframe,
    Trade, VenueEvent, VenueId,
};
