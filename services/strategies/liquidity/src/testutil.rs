//! Shared test fixtures for the strategy modules.

use adapter_service::{
    AdapterError, HeartbeatSpec, ParsedMessage, Result, VenueAdapter, VenueCapabilities,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use types::{BookTop, Candle, LiquiditySource, Symbol, Timeframe, VenueId};

/// A venue that answers book-top fetches from a fixture and counts calls.
pub struct MockVenue {
    venue: VenueId,
    top: Option<BookTop>,
    fail: bool,
    accepts_orders: bool,
    book_calls: AtomicUsize,
}

impl MockVenue {
    pub fn with_top(venue: VenueId, top: BookTop) -> Self {
        Self {
            venue,
            top: Some(top),
            fail: false,
            accepts_orders: false,
            book_calls: AtomicUsize::new(0),
        }
    }

    pub fn trading(venue: VenueId, top: BookTop) -> Self {
        Self {
            accepts_orders: true,
            ..Self::with_top(venue, top)
        }
    }

    pub fn failing(venue: VenueId) -> Self {
        Self {
            venue,
            top: None,
            fail: true,
            accepts_orders: false,
            book_calls: AtomicUsize::new(0),
        }
    }

    pub fn book_calls(&self) -> usize {
        self.book_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn venue(&self) -> VenueId {
        self.venue
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            supports_streaming: false,
            supports_book_snapshot: true,
            supports_candle_history: false,
            supports_order_placement: self.accepts_orders,
            supports_withdrawals: false,
        }
    }

    fn normalize_symbol(&self, raw: &str) -> Result<Symbol> {
        raw.parse()
            .map_err(|_| AdapterError::parse(self.venue, format!("bad symbol: {raw}")))
    }

    fn denormalize_symbol(&self, symbol: &Symbol) -> String {
        symbol.to_string()
    }

    fn convert_timeframe(&self, timeframe: Timeframe) -> Result<String> {
        Ok(timeframe.as_str().to_string())
    }

    async fn stream_endpoint(&self) -> Result<String> {
        Err(AdapterError::unsupported(self.venue, "streaming"))
    }

    fn subscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        Ok(symbols.iter().map(|s| format!("SUB:{s}")).collect())
    }

    fn unsubscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        Ok(symbols.iter().map(|s| format!("UNSUB:{s}")).collect())
    }

    fn heartbeat(&self) -> HeartbeatSpec {
        HeartbeatSpec::None
    }

    fn parse_message(&self, _raw: &str) -> Result<ParsedMessage> {
        Ok(ParsedMessage::Ignored)
    }

    async fn fetch_candles(
        &self,
        _symbol: &Symbol,
        _timeframe: Timeframe,
        _limit: u32,
    ) -> Result<Vec<Candle>> {
        Err(AdapterError::unsupported(self.venue, "fetch_candles"))
    }

    async fn fetch_book_top(&self, _symbol: &Symbol) -> Result<BookTop> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AdapterError::ConnectionFailed {
                venue: self.venue,
                reason: "mock venue down".to_string(),
            });
        }
        self.top
            .clone()
            .ok_or_else(|| AdapterError::unsupported(self.venue, "fetch_book_top"))
    }
}

/// A liquidity source fixture for BTC/USD.
pub fn source(
    venue: VenueId,
    bid_price: Decimal,
    bid_volume: Decimal,
    ask_price: Decimal,
    ask_volume: Decimal,
) -> LiquiditySource {
    LiquiditySource {
        venue,
        symbol: Symbol::new("BTC", "USD"),
        bid_price,
        ask_price,
        bid_volume,
        ask_volume,
        spread: ask_price - bid_price,
        as_of: Utc::now(),
    }
}
