//! Engine configuration: aggregation, scanning and stream parameters layered
//! over the market data configuration.
//!
//! Same loading pattern as the adapter service: production defaults, a
//! `MERIDIAN_*` environment override pass, JSON file loading and a
//! `validate()` gate before anything connects.

use adapter_service::MarketDataConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use types::{Timeframe, VenueId};

/// Complete configuration for the liquidity engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Adapters, pool and hub configuration
    pub market_data: MarketDataConfig,
    /// Liquidity aggregation parameters
    pub aggregator: AggregatorConfig,
    /// Arbitrage scanner parameters
    pub scanner: ScannerConfig,
    /// Timeframe the engine subscribes at for live candle building
    pub stream_timeframe: Timeframe,
}

/// Tuning for the cross-venue aggregation fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// How long an aggregated snapshot stays servable from cache
    pub cache_ttl_ms: u64,
    /// Per-venue budget for one book-top fetch; stragglers are excluded
    pub venue_timeout_ms: u64,
    /// Concurrent venue fetches per aggregation round
    pub max_concurrent_fetches: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5_000,
            venue_timeout_ms: 10_000,
            max_concurrent_fetches: 8,
        }
    }
}

/// Tuning for the arbitrage scanner's fee and spread model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Minimum gross spread, percent of the buy price, to report at all
    pub min_spread_pct: Decimal,
    /// Taker fee percent assumed for venues without an explicit entry
    pub default_fee_pct: Decimal,
    /// Per-venue taker fee percent overrides
    pub venue_fees: BTreeMap<VenueId, Decimal>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_spread_pct: dec!(0.5),
            default_fee_pct: dec!(0.1),
            venue_fees: BTreeMap::new(),
        }
    }
}

impl ScannerConfig {
    /// Taker fee percent for one venue.
    pub fn fee_for(&self, venue: VenueId) -> Decimal {
        self.venue_fees
            .get(&venue)
            .copied()
            .unwrap_or(self.default_fee_pct)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            market_data: MarketDataConfig::default(),
            aggregator: AggregatorConfig::default(),
            scanner: ScannerConfig::default(),
            stream_timeframe: Timeframe::M1,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.market_data = MarketDataConfig::from_env();

        config.aggregator.cache_ttl_ms =
            env_parse("MERIDIAN_CACHE_TTL_MS", config.aggregator.cache_ttl_ms);
        config.aggregator.venue_timeout_ms = env_parse(
            "MERIDIAN_VENUE_TIMEOUT_MS",
            config.aggregator.venue_timeout_ms,
        );
        config.aggregator.max_concurrent_fetches = env_parse(
            "MERIDIAN_MAX_CONCURRENT_FETCHES",
            config.aggregator.max_concurrent_fetches,
        );
        config.scanner.min_spread_pct =
            env_parse("MERIDIAN_MIN_SPREAD_PCT", config.scanner.min_spread_pct);
        config.scanner.default_fee_pct =
            env_parse("MERIDIAN_DEFAULT_FEE_PCT", config.scanner.default_fee_pct);
        config.stream_timeframe = env_parse("MERIDIAN_STREAM_TIMEFRAME", config.stream_timeframe);

        config
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.market_data.validate()?;

        if self.aggregator.cache_ttl_ms == 0 {
            anyhow::bail!("cache_ttl_ms must be positive");
        }
        if self.aggregator.venue_timeout_ms == 0 {
            anyhow::bail!("venue_timeout_ms must be positive");
        }
        if self.aggregator.max_concurrent_fetches == 0 {
            anyhow::bail!("max_concurrent_fetches must be at least 1");
        }
        if self.scanner.min_spread_pct < dec!(0) {
            anyhow::bail!("min_spread_pct must be non-negative");
        }
        if self.scanner.default_fee_pct < dec!(0) {
            anyhow::bail!("default_fee_pct must be non-negative");
        }
        for (venue, fee) in &self.scanner.venue_fees {
            if *fee < dec!(0) {
                anyhow::bail!("venue fee for {venue} must be non-negative");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_fee_lookup_prefers_override() {
        let mut config = ScannerConfig::default();
        config.venue_fees.insert(VenueId::Kraken, dec!(0.26));
        assert_eq!(config.fee_for(VenueId::Kraken), dec!(0.26));
        assert_eq!(config.fee_for(VenueId::Binance), dec!(0.1));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut config = EngineConfig::default();
        config.aggregator.cache_ttl_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_fee() {
        let mut config = EngineConfig::default();
        config.scanner.venue_fees.insert(VenueId::Gemini, dec!(-1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("MERIDIAN_MIN_SPREAD_PCT", "0.75");
        std::env::set_var("MERIDIAN_CACHE_TTL_MS", "2500");
        std::env::set_var("MERIDIAN_STREAM_TIMEFRAME", "5m");

        let config = EngineConfig::from_env();
        assert_eq!(config.scanner.min_spread_pct, dec!(0.75));
        assert_eq!(config.aggregator.cache_ttl_ms, 2_500);
        assert_eq!(config.stream_timeframe, Timeframe::M5);

        std::env::remove_var("MERIDIAN_MIN_SPREAD_PCT");
        std::env::remove_var("MERIDIAN_CACHE_TTL_MS");
        std::env::remove_var("MERIDIAN_STREAM_TIMEFRAME");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = EngineConfig::default();
        config.scanner.venue_fees.insert(VenueId::Coinbase, dec!(0.4));
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scanner.venue_fees[&VenueId::Coinbase], dec!(0.4));
        assert_eq!(back.stream_timeframe, config.stream_timeframe);
    }
}
