//! # Meridian Canonical Types Library
//!
//! Venue-independent market data model shared by every Meridian service.
//! All adapters normalize their venue's wire format into these types; the
//! hub, aggregator, router and scanner never see venue-specific shapes.
//!
//! ## Design Philosophy
//!
//! - **One canonical model**: a single `Trade`/`Candle`/`BookTop` vocabulary
//!   regardless of how a venue spells it on the wire
//! - **Exact arithmetic**: all prices and volumes are `rust_decimal::Decimal`,
//!   never floats
//! - **No I/O**: this crate holds data and invariants only; transport and
//!   state live in the service crates
//! - **Typed events**: cross-task communication uses the enums in
//!   [`event`], not callbacks over shared state

pub mod event;
pub mod liquidity;
pub mod market;
pub mod symbol;
pub mod timeframe;
pub mod venue;

pub use event::{FeedStatus, MarketEvent, VenueEvent};
pub use liquidity::{AggregatedLiquidity, ExecutionLeg, ExecutionPlan, LiquiditySource};
pub use market::{BookTop, Candle, OrderBook, OrderBookLevel, Side, Trade};
pub use symbol::{Symbol, SymbolParseError};
pub use timeframe::{Timeframe, TimeframeParseError};
pub use venue::{VenueId, VenueParseError};
