//! Gemini adapter.
//!
//! No streaming here: Gemini is driven through REST polling, so the stream
//! surface answers `Unsupported` and the pool runs the polling loop against
//! `fetch_recent_trades` instead. Symbols are lowercase concatenations
//! (`btcusd`), candle vocabulary is Gemini's own (`1hr`, `1day`) with no
//! four-hour bucket at all, and both trades and candles arrive newest first.

use super::{decimal_from_f64, http_error, parse_decimal, rest_client, status_error};
use crate::config::VenueConfig;
use crate::error::{AdapterError, Result};
use crate::input::{HeartbeatSpec, ParsedMessage, VenueAdapter, VenueCapabilities};
use crate::rate_limit::VenueRateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use types::{BookTop, Candle, OrderBookLevel, Side, Symbol, Timeframe, Trade, VenueId};

/// Quote assets Gemini lists against, longest first so `btcusdt` splits
/// before `usd` can match.
const QUOTE_ASSETS: &[&str] = &[
    "USDT", "GUSD", "USD", "BTC", "ETH", "EUR", "GBP", "SGD", "DAI",
];

const RECENT_TRADES_LIMIT: u32 = 50;

/// Gemini venue adapter: public REST only, served by the polling loop.
pub struct GeminiAdapter {
    rest_url: String,
    client: reqwest::Client,
    limiter: VenueRateLimiter,
    request_timeout_ms: u64,
}

impl GeminiAdapter {
    /// Build from the venue's config section.
    pub fn new(config: &VenueConfig, request_timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            rest_url: config.rest_url.clone(),
            client: rest_client(request_timeout_ms)?,
            limiter: VenueRateLimiter::new(VenueId::Gemini, config.requests_per_minute),
            request_timeout_ms,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let venue = VenueId::Gemini;
        self.limiter.acquire().await;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http_error(venue, e, self.request_timeout_ms))?;
        if !response.status().is_success() {
            return Err(status_error(venue, response.status()));
        }
        response
            .json()
            .await
            .map_err(|e| http_error(venue, e, self.request_timeout_ms))
    }
}

/// One trade object: string prices, millisecond times, `type` is the
/// taker side.
fn parse_trade_object(value: &Value) -> Result<Trade> {
    let venue = VenueId::Gemini;
    let price = parse_decimal(
        venue,
        value
            .get("price")
            .and_then(Value::as_str)
            .ok_or(AdapterError::MissingField { venue, field: "price" })?,
    )?;
    let volume = parse_decimal(
        venue,
        value
            .get("amount")
            .and_then(Value::as_str)
            .ok_or(AdapterError::MissingField { venue, field: "amount" })?,
    )?;
    let millis = value
        .get("timestampms")
        .and_then(Value::as_i64)
        .ok_or(AdapterError::MissingField { venue, field: "timestampms" })?;
    let timestamp = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AdapterError::parse(venue, format!("trade time out of range: {millis}")))?;
    let side = match value.get("type").and_then(Value::as_str) {
        Some("buy") => Side::Buy,
        Some("sell") => Side::Sell,
        other => {
            return Err(AdapterError::parse(venue, format!("unknown side: {other:?}")));
        }
    };
    Ok(Trade::new(price, volume, timestamp, side))
}

/// One candle row: `[time_ms, open, high, low, close, volume]`, numbers
/// throughout.
fn parse_candle_row(row: &Value) -> Result<Candle> {
    let venue = VenueId::Gemini;
    let arr = row
        .as_array()
        .ok_or_else(|| AdapterError::parse(venue, "candle row is not an array".to_string()))?;
    if arr.len() < 5 {
        return Err(AdapterError::parse(
            venue,
            format!("candle row too short: {} fields", arr.len()),
        ));
    }
    let millis = arr[0]
        .as_i64()
        .ok_or(AdapterError::MissingField { venue, field: "time" })?;
    let open_time = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AdapterError::parse(venue, format!("candle time out of range: {millis}")))?;
    let decimal_at = |idx: usize| {
        let raw = arr[idx]
            .as_f64()
            .ok_or(AdapterError::MissingField { venue, field: "candle" })?;
        decimal_from_f64(venue, raw)
    };
    Ok(Candle {
        open_time,
        open: decimal_at(1)?,
        high: decimal_at(2)?,
        low: decimal_at(3)?,
        close: decimal_at(4)?,
    })
}

fn parse_book_level(venue: VenueId, value: &Value, side: &'static str) -> Result<OrderBookLevel> {
    let level = value
        .get(side)
        .and_then(Value::as_array)
        .and_then(|levels| levels.first())
        .ok_or(AdapterError::MissingField { venue, field: side })?;
    let price = level
        .get("price")
        .and_then(Value::as_str)
        .ok_or(AdapterError::MissingField { venue, field: "price" })?;
    let amount = level
        .get("amount")
        .and_then(Value::as_str)
        .ok_or(AdapterError::MissingField { venue, field: "amount" })?;
    Ok(OrderBookLevel::new(
        parse_decimal(venue, price)?,
        parse_decimal(venue, amount)?,
    ))
}

#[async_trait]
impl VenueAdapter for GeminiAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Gemini
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            supports_streaming: false,
            supports_book_snapshot: true,
            supports_candle_history: true,
            supports_order_placement: false,
            supports_withdrawals: false,
        }
    }

    fn normalize_symbol(&self, raw: &str) -> Result<Symbol> {
        let upper = raw.to_ascii_uppercase();
        for quote in QUOTE_ASSETS {
            if let Some(base) = upper.strip_suffix(quote) {
                if !base.is_empty() {
                    return Ok(Symbol::new(base, *quote));
                }
            }
        }
        Err(AdapterError::parse(
            VenueId::Gemini,
            format!("unrecognized symbol: {raw}"),
        ))
    }

    fn denormalize_symbol(&self, symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote()).to_ascii_lowercase()
    }

    fn convert_timeframe(&self, timeframe: Timeframe) -> Result<String> {
        let tag = match timeframe {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1hr",
            Timeframe::D1 => "1day",
            Timeframe::H4 => {
                return Err(AdapterError::unsupported(
                    VenueId::Gemini,
                    format!("{timeframe} candles"),
                ));
            }
        };
        Ok(tag.to_string())
    }

    async fn stream_endpoint(&self) -> Result<String> {
        Err(AdapterError::unsupported(
            VenueId::Gemini,
            "websocket streaming",
        ))
    }

    fn subscribe_payload(&self, _symbols: &[Symbol]) -> Result<Vec<String>> {
        Err(AdapterError::unsupported(
            VenueId::Gemini,
            "websocket streaming",
        ))
    }

    fn unsubscribe_payload(&self, _symbols: &[Symbol]) -> Result<Vec<String>> {
        Err(AdapterError::unsupported(
            VenueId::Gemini,
            "websocket streaming",
        ))
    }

    fn heartbeat(&self) -> HeartbeatSpec {
        HeartbeatSpec::None
    }

    fn parse_message(&self, _raw: &str) -> Result<ParsedMessage> {
        Err(AdapterError::unsupported(
            VenueId::Gemini,
            "websocket streaming",
        ))
    }

    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let tag = self.convert_timeframe(timeframe)?;
        let url = format!(
            "{}/v2/candles/{}/{}",
            self.rest_url,
            self.denormalize_symbol(symbol),
            tag
        );
        let value = self.get_json(&url).await?;
        let rows = value.as_array().ok_or(AdapterError::MissingField {
            venue: VenueId::Gemini,
            field: "candles",
        })?;

        // Gemini serves newest first; callers get oldest first.
        let mut candles: Vec<Candle> = rows.iter().map(parse_candle_row).collect::<Result<_>>()?;
        candles.reverse();
        let skip = candles.len().saturating_sub(limit as usize);
        Ok(candles.split_off(skip))
    }

    async fn fetch_book_top(&self, symbol: &Symbol) -> Result<BookTop> {
        let venue = VenueId::Gemini;
        let url = format!(
            "{}/v1/book/{}?limit_bids=1&limit_asks=1",
            self.rest_url,
            self.denormalize_symbol(symbol)
        );
        let value = self.get_json(&url).await?;
        Ok(BookTop {
            bid: parse_book_level(venue, &value, "bids")?,
            ask: parse_book_level(venue, &value, "asks")?,
            as_of: Utc::now(),
        })
    }

    async fn fetch_recent_trades(&self, symbol: &Symbol) -> Result<Vec<Trade>> {
        let url = format!(
            "{}/v1/trades/{}?limit_trades={}",
            self.rest_url,
            self.denormalize_symbol(symbol),
            RECENT_TRADES_LIMIT
        );
        let value = self.get_json(&url).await?;
        let rows = value.as_array().ok_or(AdapterError::MissingField {
            venue: VenueId::Gemini,
            field: "trades",
        })?;

        // Newest first on the wire; the polling loop wants oldest first.
        let mut trades: Vec<Trade> = rows.iter().map(parse_trade_object).collect::<Result<_>>()?;
        trades.reverse();
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new(&VenueConfig::for_venue(VenueId::Gemini), 5_000).unwrap()
    }

    fn adapter_against(server: &mockito::Server) -> GeminiAdapter {
        let mut config = VenueConfig::for_venue(VenueId::Gemini);
        config.rest_url = server.url();
        GeminiAdapter::new(&config, 5_000).unwrap()
    }

    #[test]
    fn test_symbol_mapping() {
        let adapter = adapter();
        assert_eq!(
            adapter.normalize_symbol("btcusd").unwrap(),
            Symbol::new("BTC", "USD")
        );
        assert_eq!(
            adapter.normalize_symbol("ETHBTC").unwrap(),
            Symbol::new("ETH", "BTC")
        );
        assert_eq!(adapter.denormalize_symbol(&Symbol::new("BTC", "USD")), "btcusd");
        assert!(adapter.normalize_symbol("btcxyz").is_err());
    }

    #[test]
    fn test_timeframe_vocabulary() {
        let adapter = adapter();
        assert_eq!(adapter.convert_timeframe(Timeframe::M1).unwrap(), "1m");
        assert_eq!(adapter.convert_timeframe(Timeframe::H1).unwrap(), "1hr");
        assert_eq!(adapter.convert_timeframe(Timeframe::D1).unwrap(), "1day");
        let err = adapter.convert_timeframe(Timeframe::H4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_streaming_surface_is_unsupported() {
        let adapter = adapter();
        assert!(!adapter.capabilities().supports_streaming);
        assert!(adapter.stream_endpoint().await.is_err());
        assert!(adapter.subscribe_payload(&[Symbol::new("BTC", "USD")]).is_err());
        assert_eq!(adapter.heartbeat(), HeartbeatSpec::None);
    }

    #[tokio::test]
    async fn test_fetch_recent_trades_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/trades/btcusd")
            .match_query(mockito::Matcher::UrlEncoded(
                "limit_trades".into(),
                "50".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"timestamp":1672515789,"timestampms":1672515789500,"tid":2,"price":"16601.50","amount":"0.02","exchange":"gemini","type":"sell"},{"timestamp":1672515780,"timestampms":1672515780000,"tid":1,"price":"16600.00","amount":"0.01","exchange":"gemini","type":"buy"}]"#,
            )
            .create_async()
            .await;

        let adapter = adapter_against(&server);
        let trades = adapter
            .fetch_recent_trades(&Symbol::new("BTC", "USD"))
            .await
            .unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].timestamp.timestamp_millis(), 1672515780000);
        assert_eq!(trades[0].price, dec!(16600));
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[1].timestamp.timestamp_millis(), 1672515789500);
        assert_eq!(trades[1].side, Side::Sell);
    }

    #[tokio::test]
    async fn test_fetch_candles_reverses_and_limits() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/candles/btcusd/1m")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[[1672531320000,3.0,4.0,2.5,3.5,12.0],[1672531260000,2.0,3.0,1.5,2.5,11.0],[1672531200000,1.0,2.0,0.5,1.5,10.0]]"#,
            )
            .create_async()
            .await;

        let adapter = adapter_against(&server);
        let candles = adapter
            .fetch_candles(&Symbol::new("BTC", "USD"), Timeframe::M1, 2)
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time.timestamp_millis(), 1672531260000);
        assert_eq!(candles[0].open, dec!(2));
        assert_eq!(candles[1].open_time.timestamp_millis(), 1672531320000);
        assert_eq!(candles[1].close, dec!(3.5));
    }

    #[tokio::test]
    async fn test_fetch_book_top() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/book/btcusd")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"bids":[{"price":"16600.00","amount":"1.5","timestamp":"1672515780"}],"asks":[{"price":"16601.00","amount":"0.8","timestamp":"1672515780"}]}"#,
            )
            .create_async()
            .await;

        let adapter = adapter_against(&server);
        let top = adapter.fetch_book_top(&Symbol::new("BTC", "USD")).await.unwrap();
        assert_eq!(top.bid.price, dec!(16600));
        assert_eq!(top.bid.volume, dec!(1.5));
        assert_eq!(top.ask.price, dec!(16601));
        assert_eq!(top.spread(), dec!(1));
    }
}
