//! Coinbase Exchange adapter.
//!
//! Symbols are dash-separated (`BTC-USD`). Candle granularity is a fixed
//! set of second counts, so 30m and 4h genuinely do not exist here. The
//! feed has no ping protocol; we subscribe to the heartbeat channel so the
//! silence detector always has traffic to watch.

use super::{decimal_from_f64, http_error, parse_decimal, rest_client, status_error, str_field};
use crate::config::VenueConfig;
use crate::error::{AdapterError, Result};
use crate::input::{HeartbeatSpec, ParsedMessage, VenueAdapter, VenueCapabilities};
use crate::rate_limit::VenueRateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use types::{BookTop, Candle, OrderBookLevel, Side, Symbol, Timeframe, Trade, VenueId};

/// Coinbase venue adapter: matches-channel WebSocket plus Exchange REST.
pub struct CoinbaseAdapter {
    ws_url: String,
    rest_url: String,
    client: reqwest::Client,
    limiter: VenueRateLimiter,
    request_timeout_ms: u64,
}

impl CoinbaseAdapter {
    /// Build from the venue's config section. Fails when `ws_url` is absent.
    pub fn new(config: &VenueConfig, request_timeout_ms: u64) -> Result<Self> {
        let ws_url = config
            .ws_url
            .clone()
            .ok_or_else(|| AdapterError::Configuration("coinbase requires ws_url".to_string()))?;
        Ok(Self {
            ws_url,
            rest_url: config.rest_url.clone(),
            client: rest_client(request_timeout_ms)?,
            limiter: VenueRateLimiter::new(VenueId::Coinbase, config.requests_per_minute),
            request_timeout_ms,
        })
    }

    fn parse_match(&self, value: &Value) -> Result<ParsedMessage> {
        let venue = VenueId::Coinbase;
        let symbol = self.normalize_symbol(str_field(venue, value, "product_id")?)?;
        let price = parse_decimal(venue, str_field(venue, value, "price")?)?;
        let volume = parse_decimal(venue, str_field(venue, value, "size")?)?;
        let raw_time = str_field(venue, value, "time")?;
        let timestamp = DateTime::parse_from_rfc3339(raw_time)
            .map_err(|e| AdapterError::parse(venue, format!("bad match time {raw_time}: {e}")))?
            .with_timezone(&Utc);
        // The `side` field is the maker's side; the taker did the opposite.
        let side = match str_field(venue, value, "side")? {
            "sell" => Side::Buy,
            "buy" => Side::Sell,
            other => {
                return Err(AdapterError::parse(venue, format!("unknown side: {other}")));
            }
        };
        Ok(ParsedMessage::Trades {
            symbol,
            trades: vec![Trade::new(price, volume, timestamp, side)],
        })
    }
}

/// One candle row: `[time, low, high, open, close, volume]`, seconds and
/// plain JSON numbers, newest first in the response.
fn parse_candle_row(row: &Value) -> Result<Candle> {
    let venue = VenueId::Coinbase;
    let arr = row
        .as_array()
        .ok_or_else(|| AdapterError::parse(venue, "candle row is not an array".to_string()))?;
    if arr.len() < 5 {
        return Err(AdapterError::parse(
            venue,
            format!("candle row too short: {} fields", arr.len()),
        ));
    }
    let secs = arr[0]
        .as_i64()
        .ok_or(AdapterError::MissingField { venue, field: "time" })?;
    let open_time = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AdapterError::parse(venue, format!("candle time out of range: {secs}")))?;
    let decimal_at = |idx: usize| -> Result<Decimal> {
        let raw = arr[idx]
            .as_f64()
            .ok_or(AdapterError::MissingField { venue, field: "ohlc" })?;
        decimal_from_f64(venue, raw)
    };
    Ok(Candle {
        open_time,
        low: decimal_at(1)?,
        high: decimal_at(2)?,
        open: decimal_at(3)?,
        close: decimal_at(4)?,
    })
}

fn parse_book_level(venue: VenueId, levels: &Value, side: &'static str) -> Result<OrderBookLevel> {
    let first = levels
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(Value::as_array)
        .ok_or(AdapterError::MissingField { venue, field: side })?;
    let price = first
        .first()
        .and_then(Value::as_str)
        .ok_or(AdapterError::MissingField { venue, field: side })?;
    let volume = first
        .get(1)
        .and_then(Value::as_str)
        .ok_or(AdapterError::MissingField { venue, field: side })?;
    Ok(OrderBookLevel::new(
        parse_decimal(venue, price)?,
        parse_decimal(venue, volume)?,
    ))
}

#[async_trait]
impl VenueAdapter for CoinbaseAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Coinbase
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
        let (base, quote) = raw
            .split_once('-')
            .ok_or_else(|| AdapterError::parse(VenueId::Coinbase, format!("unrecognized symbol: {raw}")))?;
        if base.is_empty() || quote.is_empty() {
            return Err(AdapterError::parse(
                VenueId::Coinbase,
                format!("unrecognized symbol: {raw}"),
            ));
        }
        Ok(Symbol::new(base, quote))
    }

    fn denormalize_symbol(&self, symbol: &Symbol) -> String {
        format!("{}-{}", symbol.base(), symbol.quote())
    }

    fn convert_timeframe(&self, timeframe: Timeframe) -> Result<String> {
        let granularity = match timeframe {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::D1 => 86_400,
            Timeframe::M30 | Timeframe::H4 => {
                return Err(AdapterError::unsupported(
                    VenueId::Coinbase,
                    format!("{} candles", timeframe.as_str()),
                ));
            }
        };
        Ok(granularity.to_string())
    }

    async fn stream_endpoint(&self) -> Result<String> {
        Ok(self.ws_url.clone())
    }

    fn subscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        let product_ids: Vec<String> = symbols.iter().map(|s| self.denormalize_symbol(s)).collect();
        Ok(vec![json!({
            "type": "subscribe",
            "product_ids": product_ids,
            "channels": ["matches", "heartbeat"],
        })
        .to_string()])
    }

    fn unsubscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        let product_ids: Vec<String> = symbols.iter().map(|s| self.denormalize_symbol(s)).collect();
        Ok(vec![json!({
            "type": "unsubscribe",
            "product_ids": product_ids,
            "channels": ["matches", "heartbeat"],
        })
        .to_string()])
    }

    fn heartbeat(&self) -> HeartbeatSpec {
        HeartbeatSpec::None
    }

    fn parse_message(&self, raw: &str) -> Result<ParsedMessage> {
        let value: Value = serde_json::from_str(raw)?;
        match value.get("type").and_then(Value::as_str) {
            Some("match") | Some("last_match") => self.parse_match(&value),
            Some("heartbeat") => Ok(ParsedMessage::Heartbeat),
            Some("subscriptions") => Ok(ParsedMessage::Ack {
                detail: raw.to_string(),
            }),
            Some("error") => Ok(ParsedMessage::VenueError {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            _ => Ok(ParsedMessage::Ignored),
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let venue = VenueId::Coinbase;
        let granularity = self.convert_timeframe(timeframe)?;
        self.limiter.acquire().await;
        let url = format!(
            "{}/products/{}/candles?granularity={}",
            self.rest_url,
            self.denormalize_symbol(symbol),
            granularity
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
        let mut candles: Vec<Candle> = rows
            .iter()
            .take(limit as usize)
            .map(parse_candle_row)
            .collect::<Result<_>>()?;
        // Coinbase serves newest first; callers get oldest first.
        candles.reverse();
        Ok(candles)
    }

    async fn fetch_book_top(&self, symbol: &Symbol) -> Result<BookTop> {
        let venue = VenueId::Coinbase;
        self.limiter.acquire().await;
        let url = format!(
            "{}/products/{}/book?level=1",
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
        let bids = value
            .get("bids")
            .ok_or(AdapterError::MissingField { venue, field: "bids" })?;
        let asks = value
            .get("asks")
            .ok_or(AdapterError::MissingField { venue, field: "asks" })?;
        Ok(BookTop {
            bid: parse_book_level(venue, bids, "bids")?,
            ask: parse_book_level(venue, asks, "asks")?,
            as_of: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    fn adapter() -> CoinbaseAdapter {
        CoinbaseAdapter::new(&VenueConfig::for_venue(VenueId::Coinbase), 5_000).unwrap()
    }

    #[test]
    fn test_symbol_mapping() {
        let adapter = adapter();
        assert_eq!(
            adapter.normalize_symbol("BTC-USD").unwrap(),
            Symbol::new("BTC", "USD")
        );
        assert!(adapter.normalize_symbol("BTCUSD").is_err());
        assert_eq!(
            adapter.denormalize_symbol(&Symbol::new("ETH", "USD")),
            "ETH-USD"
        );
    }

    #[test]
    fn test_granularity_gaps() {
        let adapter = adapter();
        assert_eq!(adapter.convert_timeframe(Timeframe::M1).unwrap(), "60");
        assert_eq!(adapter.convert_timeframe(Timeframe::D1).unwrap(), "86400");

        let err = adapter.convert_timeframe(Timeframe::M30).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(adapter.convert_timeframe(Timeframe::H4).is_err());
    }

    #[test]
    fn test_parse_match_flips_maker_side() {
        let adapter = adapter();
        let raw = r#"{"type":"match","trade_id":10,"sequence":50,"maker_order_id":"a","taker_order_id":"b","time":"2023-01-01T00:00:30.123456Z","product_id":"BTC-USD","size":"0.025","price":"16600.50","side":"sell"}"#;
        match adapter.parse_message(raw).unwrap() {
            ParsedMessage::Trades { symbol, trades } => {
                assert_eq!(symbol, Symbol::new("BTC", "USD"));
                assert_eq!(trades[0].price, dec!(16600.50));
                assert_eq!(trades[0].volume, dec!(0.025));
                // Maker sold, so the taker bought.
                assert_eq!(trades[0].side, Side::Buy);
            }
            other => panic!("expected trades, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_control_messages() {
        let adapter = adapter();
        assert_eq!(
            adapter
                .parse_message(r#"{"type":"heartbeat","sequence":90,"product_id":"BTC-USD","time":"2023-01-01T00:00:00Z"}"#)
                .unwrap(),
            ParsedMessage::Heartbeat
        );
        assert!(matches!(
            adapter
                .parse_message(r#"{"type":"subscriptions","channels":[]}"#)
                .unwrap(),
            ParsedMessage::Ack { .. }
        ));
        match adapter
            .parse_message(r#"{"type":"error","message":"Failed to subscribe","reason":"bad product"}"#)
            .unwrap()
        {
            ParsedMessage::VenueError { message } => assert_eq!(message, "Failed to subscribe"),
            other => panic!("expected venue error, got {other:?}"),
        }
        assert_eq!(
            adapter
                .parse_message(r#"{"type":"ticker","product_id":"BTC-USD"}"#)
                .unwrap(),
            ParsedMessage::Ignored
        );
    }

    #[test]
    fn test_parse_candle_row_layout() {
        // [time, low, high, open, close, volume]
        let row = json!([1672531200, 16590.0, 16620.5, 16600.0, 16610.25, 120.5]);
        let candle = parse_candle_row(&row).unwrap();
        assert_eq!(candle.open_time.timestamp(), 1672531200);
        assert_eq!(candle.low, dec!(16590.0));
        assert_eq!(candle.high, dec!(16620.5));
        assert_eq!(candle.open, dec!(16600.0));
        assert_eq!(candle.close, dec!(16610.25));
    }

    #[tokio::test]
    async fn test_fetch_candles_reverses_to_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/products/BTC-USD/candles")
            .match_query(mockito::Matcher::UrlEncoded(
                "granularity".into(),
                "60".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[[1672531320,3,5,4,4.5,10],[1672531260,2,4,3,3.5,11],[1672531200,1,3,2,2.5,12]]"#,
            )
            .create_async()
            .await;

        let mut config = VenueConfig::for_venue(VenueId::Coinbase);
        config.rest_url = server.url();
        let adapter = CoinbaseAdapter::new(&config, 5_000).unwrap();

        let candles = adapter
            .fetch_candles(&Symbol::new("BTC", "USD"), Timeframe::M1, 10)
            .await
            .unwrap();
        assert_eq!(candles.len(), 3);
        assert!(candles[0].open_time < candles[1].open_time);
        assert!(candles[1].open_time < candles[2].open_time);
        assert_eq!(candles[0].open, dec!(2));
    }

    #[tokio::test]
    async fn test_fetch_book_top_parses_level_one() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/products/BTC-USD/book")
            .match_query(mockito::Matcher::UrlEncoded("level".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"bids":[["16568.11","2.25",3]],"asks":[["16569.44","0.75",1]],"sequence":100}"#,
            )
            .create_async()
            .await;

        let mut config = VenueConfig::for_venue(VenueId::Coinbase);
        config.rest_url = server.url();
        let adapter = CoinbaseAdapter::new(&config, 5_000).unwrap();

        let top = adapter
            .fetch_book_top(&Symbol::new("BTC", "USD"))
            .await
            .unwrap();
        assert_eq!(top.bid.price, dec!(16568.11));
        assert_eq!(top.bid.volume, dec!(2.25));
        assert_eq!(top.ask.price, dec!(16569.44));
        assert!(top.spread() > Decimal::ZERO);
    }
}
