//! Kraken adapter.
//!
//! Kraken spells bitcoin `XBT`, so symbols are remapped to the canonical
//! `BTC` on the way in and back on the way out. Stream pairs are
//! slash-separated (`XBT/USD`), REST pairs concatenated (`XBTUSD`). When
//! credentials are configured, a session token is minted over signed REST
//! before each connect and attached to subscribe payloads. The feed expects
//! a client-side `{"event":"ping"}` at the heartbeat interval.

use super::{http_error, parse_decimal, rest_client, status_error};
use crate::config::VenueConfig;
use crate::error::{AdapterError, Result};
use crate::input::{HeartbeatSpec, ParsedMessage, VenueAdapter, VenueCapabilities};
use crate::rate_limit::VenueRateLimiter;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde_json::{json, Value};
use sha2::{Digest, Sha256, Sha512};
use types::{BookTop, Candle, OrderBookLevel, Side, Symbol, Timeframe, Trade, VenueId};

type HmacSha512 = Hmac<Sha512>;

fn to_canonical_asset(asset: &str) -> String {
    if asset.eq_ignore_ascii_case("XBT") {
        "BTC".to_string()
    } else {
        asset.to_ascii_uppercase()
    }
}

fn to_kraken_asset(asset: &str) -> String {
    if asset.eq_ignore_ascii_case("BTC") {
        "XBT".to_string()
    } else {
        asset.to_ascii_uppercase()
    }
}

/// Kraken REST signature: HMAC-SHA512 over path + SHA256(nonce + body),
/// keyed with the base64-decoded secret, emitted as base64.
fn sign_request(path: &str, nonce: &str, body: &str, secret: &str) -> Result<String> {
    let venue = VenueId::Kraken;
    let key = BASE64
        .decode(secret)
        .map_err(|_| AdapterError::AuthenticationFailed {
            venue,
            reason: "api_secret is not valid base64".to_string(),
        })?;

    let mut digest = Sha256::new();
    digest.update(nonce.as_bytes());
    digest.update(body.as_bytes());
    let inner = digest.finalize();

    let mut mac =
        HmacSha512::new_from_slice(&key).map_err(|_| AdapterError::AuthenticationFailed {
            venue,
            reason: "api_secret rejected".to_string(),
        })?;
    mac.update(path.as_bytes());
    mac.update(&inner);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Kraken venue adapter: v1 WebSocket plus public/private REST.
pub struct KrakenAdapter {
    ws_url: String,
    rest_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    token: RwLock<Option<String>>,
    client: reqwest::Client,
    limiter: VenueRateLimiter,
    request_timeout_ms: u64,
}

impl KrakenAdapter {
    /// Build from the venue's config section. Fails when `ws_url` is absent;
    /// credentials stay optional and gate only the signed-token handshake.
    pub fn new(config: &VenueConfig, request_timeout_ms: u64) -> Result<Self> {
        let ws_url = config
            .ws_url
            .clone()
            .ok_or_else(|| AdapterError::Configuration("kraken requires ws_url".to_string()))?;
        Ok(Self {
            ws_url,
            rest_url: config.rest_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            token: RwLock::new(None),
            client: rest_client(request_timeout_ms)?,
            limiter: VenueRateLimiter::new(VenueId::Kraken, config.requests_per_minute),
            request_timeout_ms,
        })
    }

    /// REST pair spelling (`XBTUSD`).
    fn rest_pair(&self, symbol: &Symbol) -> String {
        format!(
            "{}{}",
            to_kraken_asset(symbol.base()),
            to_kraken_asset(symbol.quote())
        )
    }

    async fn fetch_websocket_token(&self) -> Result<String> {
        let venue = VenueId::Kraken;
        let (Some(api_key), Some(api_secret)) = (&self.api_key, &self.api_secret) else {
            return Err(AdapterError::AuthenticationFailed {
                venue,
                reason: "stream token requires api_key and api_secret".to_string(),
            });
        };

        self.limiter.acquire().await;
        let path = "/0/private/GetWebSocketsToken";
        let nonce = Utc::now().timestamp_millis().to_string();
        let body = format!("nonce={nonce}");
        let signature = sign_request(path, &nonce, &body, api_secret)?;

        let response = self
            .client
            .post(format!("{}{path}", self.rest_url))
            .header("API-Key", api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
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

        if let Some(errors) = value.get("error").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(AdapterError::AuthenticationFailed {
                    venue,
                    reason: joined,
                });
            }
        }
        value
            .pointer("/result/token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(AdapterError::MissingField {
                venue,
                field: "token",
            })
    }

    fn parse_trade_array(&self, arr: &[Value]) -> Result<ParsedMessage> {
        let venue = VenueId::Kraken;
        // [channelId, [[price, volume, time, side, orderType, misc], ...], "trade", pair]
        let pair = arr
            .last()
            .and_then(Value::as_str)
            .ok_or(AdapterError::MissingField { venue, field: "pair" })?;
        let symbol = self.normalize_symbol(pair)?;
        let rows = arr
            .get(1)
            .and_then(Value::as_array)
            .ok_or(AdapterError::MissingField { venue, field: "trades" })?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .ok_or_else(|| AdapterError::parse(venue, "trade row is not an array".to_string()))?;
            if fields.len() < 4 {
                return Err(AdapterError::parse(
                    venue,
                    format!("trade row too short: {} fields", fields.len()),
                ));
            }
            let price = parse_decimal(
                venue,
                fields[0].as_str().ok_or(AdapterError::MissingField { venue, field: "price" })?,
            )?;
            let volume = parse_decimal(
                venue,
                fields[1].as_str().ok_or(AdapterError::MissingField { venue, field: "volume" })?,
            )?;
            let raw_time = fields[2]
                .as_str()
                .ok_or(AdapterError::MissingField { venue, field: "time" })?;
            let timestamp = timestamp_from_float_secs(venue, raw_time)?;
            let side = match fields[3].as_str() {
                Some("b") => Side::Buy,
                Some("s") => Side::Sell,
                other => {
                    return Err(AdapterError::parse(venue, format!("unknown side: {other:?}")));
                }
            };
            trades.push(Trade::new(price, volume, timestamp, side));
        }
        Ok(ParsedMessage::Trades { symbol, trades })
    }
}

/// Kraken trade times are float seconds in a string.
fn timestamp_from_float_secs(venue: VenueId, raw: &str) -> Result<DateTime<Utc>> {
    let secs: f64 = raw.parse().map_err(|_| AdapterError::InvalidNumeric {
        venue,
        value: raw.to_string(),
    })?;
    // "NaN" parses as f64 and would cast to epoch zero.
    if !secs.is_finite() {
        return Err(AdapterError::InvalidNumeric { venue, value: raw.to_string() });
    }
    DateTime::from_timestamp_millis((secs * 1_000.0) as i64)
        .ok_or_else(|| AdapterError::parse(venue, format!("trade time out of range: {raw}")))
}

/// One OHLC row: `[time, open, high, low, close, vwap, volume, count]`,
/// second times as numbers and string prices, oldest first.
fn parse_ohlc_row(row: &Value) -> Result<Candle> {
    let venue = VenueId::Kraken;
    let arr = row
        .as_array()
        .ok_or_else(|| AdapterError::parse(venue, "ohlc row is not an array".to_string()))?;
    if arr.len() < 5 {
        return Err(AdapterError::parse(
            venue,
            format!("ohlc row too short: {} fields", arr.len()),
        ));
    }
    let secs = arr[0]
        .as_i64()
        .ok_or(AdapterError::MissingField { venue, field: "time" })?;
    let open_time = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AdapterError::parse(venue, format!("ohlc time out of range: {secs}")))?;
    let decimal_at = |idx: usize| {
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

/// Non-empty `error` arrays are venue errors; otherwise yields `result`.
fn kraken_result(value: &Value) -> Result<&Value> {
    let venue = VenueId::Kraken;
    if let Some(errors) = value.get("error").and_then(Value::as_array) {
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AdapterError::parse(venue, format!("venue error: {joined}")));
        }
    }
    value.get("result").ok_or(AdapterError::MissingField {
        venue,
        field: "result",
    })
}

#[async_trait]
impl VenueAdapter for KrakenAdapter {
    fn venue(&self) -> VenueId {
        VenueId::Kraken
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
            .split_once('/')
            .ok_or_else(|| AdapterError::parse(VenueId::Kraken, format!("unrecognized symbol: {raw}")))?;
        if base.is_empty() || quote.is_empty() {
            return Err(AdapterError::parse(
                VenueId::Kraken,
                format!("unrecognized symbol: {raw}"),
            ));
        }
        Ok(Symbol::new(&to_canonical_asset(base), &to_canonical_asset(quote)))
    }

    fn denormalize_symbol(&self, symbol: &Symbol) -> String {
        format!(
            "{}/{}",
            to_kraken_asset(symbol.base()),
            to_kraken_asset(symbol.quote())
        )
    }

    fn convert_timeframe(&self, timeframe: Timeframe) -> Result<String> {
        let minutes = match timeframe {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1_440,
        };
        Ok(minutes.to_string())
    }

    async fn stream_endpoint(&self) -> Result<String> {
        // Fresh token per connect; stale tokens die with their session.
        if self.api_key.is_some() && self.api_secret.is_some() {
            let token = self.fetch_websocket_token().await?;
            *self.token.write() = Some(token);
        }
        Ok(self.ws_url.clone())
    }

    fn subscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        let pairs: Vec<String> = symbols.iter().map(|s| self.denormalize_symbol(s)).collect();
        let mut subscription = json!({ "name": "trade" });
        if let Some(token) = self.token.read().clone() {
            subscription["token"] = json!(token);
        }
        Ok(vec![json!({
            "event": "subscribe",
            "pair": pairs,
            "subscription": subscription,
        })
        .to_string()])
    }

    fn unsubscribe_payload(&self, symbols: &[Symbol]) -> Result<Vec<String>> {
        let pairs: Vec<String> = symbols.iter().map(|s| self.denormalize_symbol(s)).collect();
        Ok(vec![json!({
            "event": "unsubscribe",
            "pair": pairs,
            "subscription": { "name": "trade" },
        })
        .to_string()])
    }

    fn heartbeat(&self) -> HeartbeatSpec {
        HeartbeatSpec::ClientPing {
            payload: json!({ "event": "ping" }).to_string(),
        }
    }

    fn parse_message(&self, raw: &str) -> Result<ParsedMessage> {
        let value: Value = serde_json::from_str(raw)?;
        if let Some(arr) = value.as_array() {
            let is_trade = arr.len() >= 4 && arr.get(2).and_then(Value::as_str) == Some("trade");
            return if is_trade {
                self.parse_trade_array(arr)
            } else {
                Ok(ParsedMessage::Ignored)
            };
        }
        match value.get("event").and_then(Value::as_str) {
            Some("heartbeat") | Some("pong") => Ok(ParsedMessage::Heartbeat),
            Some("systemStatus") => Ok(ParsedMessage::Ack {
                detail: raw.to_string(),
            }),
            Some("subscriptionStatus") => {
                if value.get("status").and_then(Value::as_str) == Some("error") {
                    Ok(ParsedMessage::VenueError {
                        message: value
                            .get("errorMessage")
                            .and_then(Value::as_str)
                            .unwrap_or("subscription rejected")
                            .to_string(),
                    })
                } else {
                    Ok(ParsedMessage::Ack {
                        detail: raw.to_string(),
                    })
                }
            }
            _ => Ok(ParsedMessage::Ignored),
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let venue = VenueId::Kraken;
        let interval = self.convert_timeframe(timeframe)?;
        self.limiter.acquire().await;
        let url = format!(
            "{}/0/public/OHLC?pair={}&interval={}",
            self.rest_url,
            self.rest_pair(symbol),
            interval
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
        let result = kraken_result(&value)?;

        // The result keys by venue pair spelling; rows sit under the first
        // key that is not the pagination cursor.
        let rows = result
            .as_object()
            .and_then(|map| {
                map.iter()
                    .find(|(key, _)| key.as_str() != "last")
                    .map(|(_, rows)| rows)
            })
            .and_then(Value::as_array)
            .ok_or(AdapterError::MissingField { venue, field: "ohlc" })?;

        let skip = rows.len().saturating_sub(limit as usize);
        rows[skip..].iter().map(parse_ohlc_row).collect()
    }

    async fn fetch_book_top(&self, symbol: &Symbol) -> Result<BookTop> {
        let venue = VenueId::Kraken;
        self.limiter.acquire().await;
        let url = format!(
            "{}/0/public/Ticker?pair={}",
            self.rest_url,
            self.rest_pair(symbol)
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
        let result = kraken_result(&value)?;
        let ticker = result
            .as_object()
            .and_then(|map| map.values().next())
            .ok_or(AdapterError::MissingField { venue, field: "ticker" })?;

        // a/b are [price, wholeLotVolume, lotVolume].
        let level = |side: &'static str| -> Result<OrderBookLevel> {
            let arr = ticker
                .get(side)
                .and_then(Value::as_array)
                .ok_or(AdapterError::MissingField { venue, field: side })?;
            let price = arr
                .first()
                .and_then(Value::as_str)
                .ok_or(AdapterError::MissingField { venue, field: side })?;
            let volume = arr
                .get(2)
                .and_then(Value::as_str)
                .ok_or(AdapterError::MissingField { venue, field: side })?;
            Ok(OrderBookLevel::new(
                parse_decimal(venue, price)?,
                parse_decimal(venue, volume)?,
            ))
        };
        Ok(BookTop {
            bid: level("b")?,
            ask: level("a")?,
            as_of: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> KrakenAdapter {
        KrakenAdapter::new(&VenueConfig::for_venue(VenueId::Kraken), 5_000).unwrap()
    }

    #[test]
    fn test_xbt_remap_round_trip() {
        let adapter = adapter();
        assert_eq!(
            adapter.normalize_symbol("XBT/USD").unwrap(),
            Symbol::new("BTC", "USD")
        );
        assert_eq!(
            adapter.normalize_symbol("ETH/EUR").unwrap(),
            Symbol::new("ETH", "EUR")
        );
        assert_eq!(
            adapter.denormalize_symbol(&Symbol::new("BTC", "USD")),
            "XBT/USD"
        );
        assert_eq!(adapter.rest_pair(&Symbol::new("BTC", "USD")), "XBTUSD");
        assert!(adapter.normalize_symbol("XBTUSD").is_err());
    }

    #[test]
    fn test_interval_minutes() {
        let adapter = adapter();
        assert_eq!(adapter.convert_timeframe(Timeframe::M1).unwrap(), "1");
        assert_eq!(adapter.convert_timeframe(Timeframe::H4).unwrap(), "240");
        assert_eq!(adapter.convert_timeframe(Timeframe::D1).unwrap(), "1440");
    }

    #[test]
    fn test_parse_trade_batch() {
        let adapter = adapter();
        let raw = r#"[337,[["16601.30000","0.01000000","1672515789.123456","b","m",""],["16601.40000","0.25000000","1672515789.500000","s","l",""]],"trade","XBT/USD"]"#;
        match adapter.parse_message(raw).unwrap() {
            ParsedMessage::Trades { symbol, trades } => {
                assert_eq!(symbol, Symbol::new("BTC", "USD"));
                assert_eq!(trades.len(), 2);
                assert_eq!(trades[0].price, dec!(16601.3));
                assert_eq!(trades[0].side, Side::Buy);
                assert_eq!(trades[0].timestamp.timestamp_millis(), 1672515789123);
                assert_eq!(trades[1].side, Side::Sell);
            }
            other => panic!("expected trades, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_trade_time_rejected() {
        let adapter = adapter();
        for time in ["NaN", "inf", "-inf"] {
            let raw = format!(
                r#"[337,[["16601.30000","0.01000000","{time}","b","m",""]],"trade","XBT/USD"]"#
            );
            let err = adapter.parse_message(&raw).unwrap_err();
            assert!(
                matches!(err, AdapterError::InvalidNumeric { .. }),
                "time {time:?} produced {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_control_messages() {
        let adapter = adapter();
        assert_eq!(
            adapter.parse_message(r#"{"event":"heartbeat"}"#).unwrap(),
            ParsedMessage::Heartbeat
        );
        assert_eq!(
            adapter
                .parse_message(r#"{"event":"pong","reqid":42}"#)
                .unwrap(),
            ParsedMessage::Heartbeat
        );
        assert!(matches!(
            adapter
                .parse_message(r#"{"event":"systemStatus","status":"online","version":"1.9.0"}"#)
                .unwrap(),
            ParsedMessage::Ack { .. }
        ));
        assert!(matches!(
            adapter
                .parse_message(
                    r#"{"event":"subscriptionStatus","status":"subscribed","pair":"XBT/USD"}"#
                )
                .unwrap(),
            ParsedMessage::Ack { .. }
        ));
        match adapter
            .parse_message(
                r#"{"event":"subscriptionStatus","status":"error","errorMessage":"Currency pair not supported"}"#
            )
            .unwrap()
        {
            ParsedMessage::VenueError { message } => {
                assert_eq!(message, "Currency pair not supported");
            }
            other => panic!("expected venue error, got {other:?}"),
        }
        // Spread channel arrays are not ours.
        assert_eq!(
            adapter
                .parse_message(r#"[338,["16600.1","16600.9","1672515789.1","1.0","2.0"],"spread","XBT/USD"]"#)
                .unwrap(),
            ParsedMessage::Ignored
        );
    }

    #[test]
    fn test_client_ping_heartbeat() {
        match adapter().heartbeat() {
            HeartbeatSpec::ClientPing { payload } => {
                let value: Value = serde_json::from_str(&payload).unwrap();
                assert_eq!(value["event"], "ping");
            }
            other => panic!("expected client ping, got {other:?}"),
        }
    }

    // Known-answer vector from Kraken's REST auth documentation.
    #[test]
    fn test_signature_known_answer() {
        let secret = "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";
        let signature = sign_request(
            "/0/private/AddOrder",
            "1616492376594",
            "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
            secret,
        )
        .unwrap();
        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn test_signature_rejects_bad_secret() {
        let err = sign_request("/0/private/GetWebSocketsToken", "1", "nonce=1", "!!!").unwrap_err();
        assert!(matches!(err, AdapterError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_parse_ohlc_row_layout() {
        let row = json!([
            1672531200,
            "16600.1",
            "16610.2",
            "16590.3",
            "16605.4",
            "16600.0",
            "12.5",
            42
        ]);
        let candle = parse_ohlc_row(&row).unwrap();
        assert_eq!(candle.open_time.timestamp(), 1672531200);
        assert_eq!(candle.open, dec!(16600.1));
        assert_eq!(candle.high, dec!(16610.2));
        assert_eq!(candle.low, dec!(16590.3));
        assert_eq!(candle.close, dec!(16605.4));
    }

    #[tokio::test]
    async fn test_token_flow_attaches_to_subscribe() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/0/private/GetWebSocketsToken")
            .match_header("API-Key", "test-key")
            .match_header("API-Sign", mockito::Matcher::Regex(".+".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":[],"result":{"token":"WW91ciBhdXRoIHRva2Vu","expires":900}}"#)
            .create_async()
            .await;

        let mut config = VenueConfig::for_venue(VenueId::Kraken);
        config.rest_url = server.url();
        config.api_key = Some("test-key".to_string());
        config.api_secret = Some(BASE64.encode(b"test-secret"));
        let adapter = KrakenAdapter::new(&config, 5_000).unwrap();

        // Without the handshake the payload carries no token.
        let before = adapter.subscribe_payload(&[Symbol::new("BTC", "USD")]).unwrap();
        assert!(!before[0].contains("token"));

        let endpoint = adapter.stream_endpoint().await.unwrap();
        assert_eq!(endpoint, "wss://ws.kraken.com");
        mock.assert_async().await;

        let after = adapter.subscribe_payload(&[Symbol::new("BTC", "USD")]).unwrap();
        let value: Value = serde_json::from_str(&after[0]).unwrap();
        assert_eq!(value["event"], "subscribe");
        assert_eq!(value["pair"][0], "XBT/USD");
        assert_eq!(value["subscription"]["name"], "trade");
        assert_eq!(value["subscription"]["token"], "WW91ciBhdXRoIHRva2Vu");
    }

    #[tokio::test]
    async fn test_token_error_is_authentication_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/0/private/GetWebSocketsToken")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":["EAPI:Invalid key"]}"#)
            .create_async()
            .await;

        let mut config = VenueConfig::for_venue(VenueId::Kraken);
        config.rest_url = server.url();
        config.api_key = Some("bad-key".to_string());
        config.api_secret = Some(BASE64.encode(b"whatever"));
        let adapter = KrakenAdapter::new(&config, 5_000).unwrap();

        let err = adapter.stream_endpoint().await.unwrap_err();
        match err {
            AdapterError::AuthenticationFailed { venue, reason } => {
                assert_eq!(venue, VenueId::Kraken);
                assert_eq!(reason, "EAPI:Invalid key");
            }
            other => panic!("expected authentication failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_candles_respects_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/0/public/OHLC")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("pair".into(), "XBTUSD".into()),
                mockito::Matcher::UrlEncoded("interval".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":[],"result":{"XXBTZUSD":[[1672531200,"1","2","0.5","1.5","1.2","10",5],[1672531260,"1.5","2.5","1","2","1.8","11",6],[1672531320,"2","3","1.5","2.5","2.2","12",7]],"last":1672531320}}"#,
            )
            .create_async()
            .await;

        let mut config = VenueConfig::for_venue(VenueId::Kraken);
        config.rest_url = server.url();
        let adapter = KrakenAdapter::new(&config, 5_000).unwrap();

        let candles = adapter
            .fetch_candles(&Symbol::new("BTC", "USD"), Timeframe::M1, 2)
            .await
            .unwrap();
        // Newest two of the three, still oldest first.
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time.timestamp(), 1672531260);
        assert_eq!(candles[1].open_time.timestamp(), 1672531320);
    }
}
