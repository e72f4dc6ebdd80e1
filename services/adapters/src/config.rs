//! Configuration for the adapter service.
//!
//! Nested sections with production defaults, environment variable overrides
//! (`MERIDIAN_*`), JSON file loading and validation. Per-venue sections can
//! override pool-level connection policy, which is how venues with different
//! heartbeat cadences or criticality get their own tuning without code
//! changes.

use crate::input::connection::ConnectionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use types::{Symbol, VenueId};
use url::Url;

/// Complete configuration for the market data core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Connection pool policy defaults
    pub pool: PoolConfig,
    /// Market data hub sizing
    pub hub: HubConfig,
    /// Per-venue endpoints, credentials and policy overrides.
    /// Map order is the canonical venue-list order used for tie-breaking.
    pub venues: BTreeMap<VenueId, VenueConfig>,
}

/// Pool-level connection policy defaults (overridable per venue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent connections the pool will hold
    pub max_connections: usize,
    /// Outbound messages buffered per connection while disconnected
    pub outbound_queue_cap: usize,
    /// Command channel depth per connection task
    pub command_buffer: usize,
    /// WebSocket open timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// REST request timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Heartbeat interval (seconds); 2× this of silence force-closes
    pub heartbeat_interval_secs: u64,
    /// First reconnect delay (milliseconds)
    pub base_backoff_ms: u64,
    /// Reconnect delay cap (milliseconds)
    pub max_backoff_ms: u64,
    /// Reconnect attempts before a connection is terminally failed
    pub max_reconnect_attempts: u32,
    /// Poll cadence for REST-polling venues (seconds)
    pub poll_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 32,
            outbound_queue_cap: 64,
            command_buffer: 256,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
            heartbeat_interval_secs: 30,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            max_reconnect_attempts: 5,
            poll_interval_secs: 2,
        }
    }
}

/// Market data hub sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Trades retained per (venue, symbol); oldest evicted on overflow
    pub trade_buffer_capacity: usize,
    /// Closed candles retained per (venue, symbol, timeframe)
    pub candle_history_capacity: usize,
    /// Candles to backfill over REST on first subscribe (0 disables)
    pub backfill_candles: u32,
    /// Fan-in channel depth between pool and hub
    pub event_buffer: usize,
    /// Broadcast channel depth per (venue, symbol) shard
    pub broadcast_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            trade_buffer_capacity: 100,
            candle_history_capacity: 500,
            backfill_candles: 100,
            event_buffer: 1024,
            broadcast_buffer: 256,
        }
    }
}

/// One venue's endpoints, credentials and policy overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Whether this venue participates at all
    pub enabled: bool,
    /// Stream endpoint; required for streaming venues, absent for REST-polling ones
    pub ws_url: Option<String>,
    /// REST base URL
    pub rest_url: String,
    /// API key, where the venue's handshake wants one
    pub api_key: Option<String>,
    /// API secret, where the venue's handshake wants one
    pub api_secret: Option<String>,
    /// Symbols the service subscribes on startup (canonical form)
    pub symbols: Vec<Symbol>,
    /// Local REST rate limit for this venue
    pub requests_per_minute: u32,
    /// Override pool heartbeat interval for this venue
    pub heartbeat_interval_secs: Option<u64>,
    /// Override pool base backoff for this venue
    pub base_backoff_ms: Option<u64>,
    /// Override pool backoff cap for this venue
    pub max_backoff_ms: Option<u64>,
    /// Override pool reconnect budget for this venue
    pub max_reconnect_attempts: Option<u32>,
    /// Override poll cadence for this venue (REST-polling venues)
    pub poll_interval_secs: Option<u64>,
}

impl VenueConfig {
    /// Production defaults for one venue.
    pub fn for_venue(venue: VenueId) -> Self {
        let base = Self {
            enabled: true,
            ws_url: None,
            rest_url: String::new(),
            api_key: None,
            api_secret: None,
            symbols: Vec::new(),
            requests_per_minute: 600,
            heartbeat_interval_secs: None,
            base_backoff_ms: None,
            max_backoff_ms: None,
            max_reconnect_attempts: None,
            poll_interval_secs: None,
        };
        match venue {
            VenueId::Binance => Self {
                ws_url: Some("wss://stream.binance.com:9443/ws".to_string()),
                rest_url: "https://api.binance.com".to_string(),
                symbols: vec![Symbol::new("BTC", "USDT"), Symbol::new("ETH", "USDT")],
                requests_per_minute: 1200,
                ..base
            },
            VenueId::Coinbase => Self {
                ws_url: Some("wss://ws-feed.exchange.coinbase.com".to_string()),
                rest_url: "https://api.exchange.coinbase.com".to_string(),
                symbols: vec![Symbol::new("BTC", "USD"), Symbol::new("ETH", "USD")],
                ..base
            },
            VenueId::Kraken => Self {
                ws_url: Some("wss://ws.kraken.com".to_string()),
                rest_url: "https://api.kraken.com".to_string(),
                symbols: vec![Symbol::new("BTC", "USD"), Symbol::new("ETH", "USD")],
                requests_per_minute: 180,
                ..base
            },
            VenueId::Gemini => Self {
                rest_url: "https://api.gemini.com".to_string(),
                symbols: vec![Symbol::new("BTC", "USD")],
                requests_per_minute: 120,
                ..base
            },
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        let venues = VenueId::ALL
            .iter()
            .map(|&venue| (venue, VenueConfig::for_venue(venue)))
            .collect();
        Self {
            pool: PoolConfig::default(),
            hub: HubConfig::default(),
            venues,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl MarketDataConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults overridden by `MERIDIAN_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.pool.max_connections =
            env_parse("MERIDIAN_MAX_CONNECTIONS", config.pool.max_connections);
        config.pool.heartbeat_interval_secs = env_parse(
            "MERIDIAN_HEARTBEAT_INTERVAL_SECS",
            config.pool.heartbeat_interval_secs,
        );
        config.pool.base_backoff_ms =
            env_parse("MERIDIAN_BASE_BACKOFF_MS", config.pool.base_backoff_ms);
        config.pool.max_backoff_ms =
            env_parse("MERIDIAN_MAX_BACKOFF_MS", config.pool.max_backoff_ms);
        config.pool.max_reconnect_attempts = env_parse(
            "MERIDIAN_MAX_RECONNECT_ATTEMPTS",
            config.pool.max_reconnect_attempts,
        );
        config.pool.request_timeout_ms =
            env_parse("MERIDIAN_REQUEST_TIMEOUT_MS", config.pool.request_timeout_ms);
        config.hub.backfill_candles =
            env_parse("MERIDIAN_BACKFILL_CANDLES", config.hub.backfill_candles);

        for (&venue, venue_config) in config.venues.iter_mut() {
            let prefix = format!("MERIDIAN_{}", venue.as_str().to_ascii_uppercase());
            venue_config.enabled = env_parse(&format!("{prefix}_ENABLED"), venue_config.enabled);
            if let Ok(url) = std::env::var(format!("{prefix}_WS_URL")) {
                venue_config.ws_url = Some(url);
            }
            if let Ok(url) = std::env::var(format!("{prefix}_REST_URL")) {
                venue_config.rest_url = url;
            }
            if let Ok(key) = std::env::var(format!("{prefix}_API_KEY")) {
                venue_config.api_key = Some(key);
            }
            if let Ok(secret) = std::env::var(format!("{prefix}_API_SECRET")) {
                venue_config.api_secret = Some(secret);
            }
            if let Ok(raw) = std::env::var(format!("{prefix}_SYMBOLS")) {
                let symbols: Vec<Symbol> = raw
                    .split(',')
                    .filter_map(|s| s.trim().parse().ok())
                    .collect();
                if !symbols.is_empty() {
                    venue_config.symbols = symbols;
                }
            }
        }

        config
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool.max_connections == 0 {
            anyhow::bail!("pool.max_connections must be positive");
        }
        if self.pool.outbound_queue_cap == 0 {
            anyhow::bail!("pool.outbound_queue_cap must be positive");
        }
        if self.pool.heartbeat_interval_secs == 0 {
            anyhow::bail!("pool.heartbeat_interval_secs must be positive");
        }
        if self.pool.max_reconnect_attempts == 0 {
            anyhow::bail!("pool.max_reconnect_attempts must be positive");
        }
        if self.pool.base_backoff_ms > self.pool.max_backoff_ms {
            anyhow::bail!("pool.base_backoff_ms must not exceed pool.max_backoff_ms");
        }
        if self.pool.connect_timeout_ms == 0 || self.pool.request_timeout_ms == 0 {
            anyhow::bail!("pool timeouts must be positive");
        }
        if self.hub.trade_buffer_capacity == 0 {
            anyhow::bail!("hub.trade_buffer_capacity must be positive");
        }
        if self.hub.event_buffer == 0 || self.hub.broadcast_buffer == 0 {
            anyhow::bail!("hub channel buffers must be positive");
        }

        if !self.venues.values().any(|v| v.enabled) {
            anyhow::bail!("at least one venue must be enabled");
        }

        for (venue, venue_config) in self.venues.iter().filter(|(_, v)| v.enabled) {
            if venue_config.symbols.is_empty() {
                anyhow::bail!("venue {venue} is enabled but has no symbols");
            }
            if venue_config.requests_per_minute == 0 {
                anyhow::bail!("venue {venue} requests_per_minute must be positive");
            }
            let rest = Url::parse(&venue_config.rest_url)
                .map_err(|e| anyhow::anyhow!("venue {venue} rest_url is invalid: {e}"))?;
            if rest.scheme() != "http" && rest.scheme() != "https" {
                anyhow::bail!("venue {venue} rest_url must be http(s), got {}", rest.scheme());
            }
            // Streaming venues need a stream endpoint; Gemini polls REST instead.
            match venue {
                VenueId::Gemini => {}
                _ => {
                    let ws_url = venue_config.ws_url.as_deref().ok_or_else(|| {
                        anyhow::anyhow!("venue {venue} is a streaming venue and needs ws_url")
                    })?;
                    let ws = Url::parse(ws_url)
                        .map_err(|e| anyhow::anyhow!("venue {venue} ws_url is invalid: {e}"))?;
                    if ws.scheme() != "ws" && ws.scheme() != "wss" {
                        anyhow::bail!("venue {venue} ws_url must be ws(s), got {}", ws.scheme());
                    }
                }
            }
        }

        Ok(())
    }

    /// Resolve the effective connection policy for one venue.
    pub fn policy_for(&self, venue: VenueId) -> ConnectionPolicy {
        let overrides = self.venues.get(&venue);
        let pick_u64 = |f: fn(&VenueConfig) -> Option<u64>, default: u64| {
            overrides.and_then(f).unwrap_or(default)
        };
        ConnectionPolicy {
            connect_timeout: Duration::from_millis(self.pool.connect_timeout_ms),
            heartbeat_interval: Duration::from_secs(pick_u64(
                |v| v.heartbeat_interval_secs,
                self.pool.heartbeat_interval_secs,
            )),
            base_backoff: Duration::from_millis(pick_u64(
                |v| v.base_backoff_ms,
                self.pool.base_backoff_ms,
            )),
            max_backoff: Duration::from_millis(pick_u64(
                |v| v.max_backoff_ms,
                self.pool.max_backoff_ms,
            )),
            max_reconnect_attempts: overrides
                .and_then(|v| v.max_reconnect_attempts)
                .unwrap_or(self.pool.max_reconnect_attempts),
            outbound_queue_cap: self.pool.outbound_queue_cap,
            command_buffer: self.pool.command_buffer,
            poll_interval: Duration::from_secs(pick_u64(
                |v| v.poll_interval_secs,
                self.pool.poll_interval_secs,
            )),
        }
    }

    /// Config section for one venue.
    pub fn venue(&self, venue: VenueId) -> Option<&VenueConfig> {
        self.venues.get(&venue)
    }
}
