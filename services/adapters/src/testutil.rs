//! Adapter doubles shared by unit tests.

use crate::error::{AdapterError, Result};
use crate::input::{HeartbeatSpec, ParsedMessage, VenueAdapter, VenueCapabilities};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use types::{BookTop, Candle, Symbol, Timeframe, Trade, VenueId};

/// Polling-style adapter that never touches the network. Trades and candles
/// are served from fixed fixtures; call counters let tests assert caching.
pub(crate) struct MockAdapter {
    pub venue: VenueId,
    pub capabilities: VenueCapabilities,
    pub trades: Vec<Trade>,
    pub candles: Vec<Candle>,
    pub top: Option<BookTop>,
    pub candle_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn polling(venue: VenueId) -> Self {
        Self {
            venue,
            capabilities: VenueCapabilities {
                supports_streaming: false,
                supports_book_snapshot: false,
                supports_candle_history: false,
                supports_order_placement: false,
                supports_withdrawals: false,
            },
            trades: Vec::new(),
            candles: Vec::new(),
            top: None,
            candle_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_candles(venue: VenueId, candles: Vec<Candle>) -> Self {
        let mut mock = Self::polling(venue);
        mock.capabilities.supports_candle_history = true;
        mock.candles = candles;
        mock
    }
}

#[async_trait]
impl VenueAdapter for MockAdapter {
    fn venue(&self) -> VenueId {
        self.venue
    }

    fn capabilities(&self) -> VenueCapabilities {
        self.capabilities
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
        Err(AdapterError::unsupported(self.venue, "stream_endpoint"))
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
        limit: u32,
    ) -> Result<Vec<Candle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candles.iter().take(limit as usize).cloned().collect())
    }

    async fn fetch_book_top(&self, _symbol: &Symbol) -> Result<BookTop> {
        self.top
            .clone()
            .ok_or_else(|| AdapterError::unsupported(self.venue, "fetch_book_top"))
    }

    async fn fetch_recent_trades(&self, _symbol: &Symbol) -> Result<Vec<Trade>> {
        Ok(self.trades.clone())
    }
}
