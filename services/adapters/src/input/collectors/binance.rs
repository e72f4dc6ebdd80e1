//! Binance adapter.
//!
//! Symbols are concatenated uppercase pairs (`BTCUSDT`), lowercased in
//! stream names. Binance pings at the application level with a bare `ping`
//! text frame and expects a literal `pong` back; subscribe requests carry a
//! client-chosen id that comes back in the ack.

use super::{field, http_error, parse_decimal, rest_client, status_error, str_field};
use crate::config::VenueConfig;
use crate::error::{AdapterError, Result};
use crate::input::{HeartbeatSpec, ParsedMessage, VenueAdapter, VenueCapabilities};
use crate::rate_limit::VenueRateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use types::{BookTop, Candle, OrderBookLevel, Side, Symbol, Timeframe, Trade, VenueId};

/// Known quote assets, longest first so `BTCUSDT` splits before `USD` can
/// match.
const QUOTE_ASSETS: [&str; 7] = ["USDT", "BUSD", "USDC", "BTC", "ETH", "EUR", "USD"];

/// Binance venue adapter: combined-stream WebSocket plus public REST.
pub struct BinanceAdapter {
    ws_url: String,
    rest_url: String,
    client: reqwest::Client,
    limiter: VenueRateLimiter,
    request_timeout_ms: u64,
    next_request_id: AtomicU64,
}

impl BinanceAdapter {
    /// Build from the venue's config section. Fails when `ws_url` is absent.
    pub fn new(config: &VenueConfig, request_timeout_ms: u64) -> Result<Self> {
        let ws_url = config
            .ws_url
            .clone()
            .ok_or_else(|| AdapterError::Configuration("binance requires ws_url".to_string()))?;
        Ok(Self {
            ws_url,
            rest_url: config.rest_url.clone(),
            client: rest_client(request_timeout_ms)?,
            limiter: VenueRateLimiter::new(VenueId::Binance, config.requests_per_minute),
            request_timeout_ms,
            next_request_id: AtomicU64::new(1),
        })
    }

    fn stream_params(&self, symbols: &[Symbol]) -> Vec<String> {
        symbols
            .iter()
            .map(|s| format!("{}@trade", self.denormalize_symbol(s).to_ascii_lowercase()))
            .collect()
    }

    fn parse_trade_event(&self, value: &Value) -> Result<ParsedMessage> {
        let venue = VenueId::Binance;
        let symbol = self.normalize_symbol(str_field(venue, value, "s")?)?;
        let price = parse_decimal(venue, str_field(venue, value, "p")?)?;
        let volume = parse_decimal(venue, str_field(venue, value, "q")?)?;
        let ts_ms = field(venue, value, "T")?
            .as_i64()
            .ok_or(AdapterError::MissingField { venue, field: "T" })?;
        let timestamp = DateTime::from_timestamp_millis(ts_ms).ok_or_else(|| {
            AdapterError::parse(venue, format!("trade time out of range: {ts_ms}"))
        })?;
        // `m` true means the buyer was the maker, so the taker sold.
        let buyer_is_maker = field(venue, value, "m")?.as_bool().unwrap_or(false);
        let side = if buyer_is_maker { Side::Sell } else { Side::Buy };
        Ok(ParsedMessage::Trades {
            symbol,
            trades: vec![Trade::new(price, volume, timestamp, side)],
        })
    }
}

/// One kline row: `[openTime, open, high, low, close, volume, ...]`, prices
/// as strings.
fn parse_kline_row(row: &Value) -> Result<Candle> {
    let venue = VenueId::Binance;
    let arr = row
        .as_array()
        .ok_or_else(|| AdapterError::parse(venue, "kline row is not an array".to_string()))?;
    if arr.len() < 5 {
        return Err(AdapterError::parse(
            venue,
            format!("kline row too short: {} fields", arr.len()),
        ));
    }
    let open_ms = arr[0]
        .as_i64()
        .ok_or(AdapterError::MissingField { venue, field: "openTime" })?;
    let open_time = DateTime::from_timestamp_millis(open_ms)
        .ok_or_else(|| AdapterError::parse(venue, format!("kline time out of range: {open_ms}")))?;
    let decimal_at = |idx: usize| -> Result<Decimal> {
        let raw = arr[idx]
            .as_str()
            .ok_or(AdapterError::MissingField { venue, field: "ohlc" })?;
        parse_decimal(venue, raw)
    };
    Ok(Candle {
        open_time,
        open: decimal_at(1)?,
        high: decimal_at(2)?,
        low: decimal_at(3)?,
        close: decimal_at(4)?,
    })
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            supports_streaming: true,
            supports_book_snapshot: true,
            supports_candle_history: true,
            supports_order_placement: true,
            supports_withdrawals: false,
        }
    }

    fn normalize_symbol(&self, raw: &str) -> Result<Symbol> {
        let upper = raw.to_ascii_uppercase();
        for quote in QUOTE_ASSETS {
            if let Some(base) = upper.strip_suffix(quote) {
                if !base.is_empty() {
                    return Ok(Symbol::new(base, quote));
                }
            }
        }
        Err(AdapterError::parse(
            VenueId::Binance,
            format!("unrecognized symbol: {raw}"),
        ))
    }

    fn denormalize_symbol(&self, symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote())
    }

    fn convert_timeframe(&self, timeframe: Timeframe) -> Result<String> {
        // Binance's interval vocabulary matches the canonical spelling.
        Ok(timeframe.as_str().to_string())
    }

    async fn stream_endpoint(&self) -> Result<String> {
        Ok(self.ws_url.clone())
    }

    fn subscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        Ok(vec![json!({
            "method": "SUBSCRIBE",
            "params": self.stream_params(symbols),
            "id": id,
        })
        .to_string()])
    }

    fn unsubscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        Ok(vec![json!({
            "method": "UNSUBSCRIBE",
            "params": self.stream_params(symbols),
            "id": id,
        })
        .to_string()])
    }

    fn heartbeat(&self) -> HeartbeatSpec {
        HeartbeatSpec::ServerPing
    }

    fn parse_message(&self, raw: &str) -> Result<ParsedMessage> {
        let trimmed = raw.trim();
        if trimmed == "ping" {
            return Ok(ParsedMessage::Ping {
                reply: "pong".to_string(),
            });
        }
        let value: Value = serde_json::from_str(trimmed)?;
        match value.get("e").and_then(Value::as_str) {
            Some("trade") => self.parse_trade_event(&value),
            Some(_) => Ok(ParsedMessage::Ignored),
            None => {
                if let Some(error) = value.get("error") {
                    Ok(ParsedMessage::VenueError {
                        message: error.to_string(),
                    })
                } else if value.get("id").is_some() {
                    Ok(ParsedMessage::Ack {
                        detail: trimmed.to_string(),
                    })
                } else {
                    Ok(ParsedMessage::Ignored)
                }
            }
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let venue = VenueId::Binance;
        let interval = self.convert_timeframe(timeframe)?;
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.rest_url,
            self.denormalize_symbol(symbol),
            interval,
            limit
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http_error(venue, e, self.request_timeout_ms))?;
        if !response.status().is_success() {
            return Err(status_error(venue, response.status()));
        }
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| http_error(venue, e, self.request_timeout_ms))?;
        // Rows already come oldest first.
        rows.iter().map(parse_kline_row).collect()
    }

    async fn fetch_book_top(&self, symbol: &Symbol) -> Result<BookTop> {
        let venue = VenueId::Binance;
        self.limiter.acquire().await;
        let url = format!(
            "{}/api/v3/ticker/bookTicker?symbol={}",
            self.rest_url,
            self.denormalize_symbol(symbol)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http_error(venue, e, self.request_timeout_ms))?;
        if !response.status().is_success() {
            return Err(status_error(venue, response.status()));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| http_error(venue, e, self.request_timeout_ms))?;
        Ok(BookTop {
            bid: OrderBookLevel::new(
                parse_decimal(venue, str_field(venue, &value, "bidPrice")?)?,
                parse_decimal(venue, str_field(venue, &value, "bidQty")?)?,
            ),
            ask: OrderBookLevel::new(
                parse_decimal(venue, str_field(venue, &value, "askPrice")?)?,
                parse_decimal(venue, str_field(venue, &value, "askQty")?)?,
            ),
            as_of: Utc::now(),
        })
    }
}
