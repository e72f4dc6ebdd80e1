//! Input side: the venue adapter trait and the connection machinery that
//! drives adapters against live endpoints.
//!
//! Each venue implements [`VenueAdapter`] and nothing else; symbol mapping,
//! timeframe vocabulary, wire parsing and REST paths all live behind the
//! trait. Connection lifecycle (reconnect, heartbeat, outbound queueing) is
//! venue-agnostic and lives in [`connection`].

pub mod collectors;
pub mod connection;
pub mod pool;

use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use types::{BookTop, Candle, Symbol, Timeframe, Trade, VenueId};

/// What a venue can do. Callers check these before dispatching an operation
/// so unsupported requests fail fast instead of hitting the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueCapabilities {
    /// Venue pushes trades over a persistent stream
    pub supports_streaming: bool,
    /// Venue serves top-of-book snapshots over REST
    pub supports_book_snapshot: bool,
    /// Venue serves historical candles over REST
    pub supports_candle_history: bool,
    /// Venue accepts order placement
    pub supports_order_placement: bool,
    /// Venue accepts withdrawal requests
    pub supports_withdrawals: bool,
}

/// Heartbeat behaviour a venue's stream expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatSpec {
    /// We send this payload every interval
    ClientPing { payload: String },
    /// Venue sends pings; we only answer what `parse_message` tells us to
    ServerPing,
    /// No heartbeat traffic either way
    None,
}

/// Outcome of parsing one inbound stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// Normalized trades, already in canonical symbol form
    Trades { symbol: Symbol, trades: Vec<Trade> },
    /// Liveness signal; resets the silence clock, nothing else
    Heartbeat,
    /// Venue pinged us at the application level; send this back
    Ping { reply: String },
    /// Subscription or status acknowledgement
    Ack { detail: String },
    /// Venue reported an error in-band
    VenueError { message: String },
    /// Valid message we don't consume (order book deltas, system notices)
    Ignored,
}

/// One venue's protocol, normalized to canonical types.
///
/// Implementations are cheap to clone behind `Arc` and hold no connection
/// state; everything here is either pure translation or a self-contained
/// REST call.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Which venue this adapter speaks for.
    fn venue(&self) -> VenueId;

    /// Feature support for this venue.
    fn capabilities(&self) -> VenueCapabilities;

    /// Venue-native symbol to canonical form ("XBTUSD" -> BTC/USD).
    fn normalize_symbol(&self, raw: &str) -> Result<Symbol>;

    /// Canonical symbol to venue-native form (BTC/USD -> "XBTUSD").
    fn denormalize_symbol(&self, symbol: &Symbol) -> String;

    /// Canonical timeframe to venue vocabulary, or `Unsupported` when the
    /// venue has no such granularity.
    fn convert_timeframe(&self, timeframe: Timeframe) -> Result<String>;

    /// Stream endpoint URL. May perform a handshake request first (session
    /// tokens); errors out for venues without a stream.
    async fn stream_endpoint(&self) -> Result<String>;

    /// Subscribe payloads for a set of symbols, ready to send verbatim.
    fn subscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>>;

    /// Unsubscribe payloads for a set of symbols.
    fn unsubscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>>;

    /// Heartbeat behaviour for this venue's stream.
    fn heartbeat(&self) -> HeartbeatSpec;

    /// Parse one inbound text frame.
    fn parse_message(&self, raw: &str) -> Result<ParsedMessage>;

    /// Historical candles, ascending by open time, at most `limit` rows.
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>>;

    /// Current top of book.
    async fn fetch_book_top(&self, symbol: &Symbol) -> Result<BookTop>;

    /// Recent public trades, ascending by timestamp. Only REST-polling
    /// venues need this; streaming venues keep the default.
    async fn fetch_recent_trades(&self, _symbol: &Symbol) -> Result<Vec<Trade>> {
        Err(AdapterError::unsupported(self.venue(), "fetch_recent_trades"))
    }
}
