//! Venue adapters, one module per venue.
//!
//! Every quirk a venue has stays inside its module: symbol spelling,
//! timeframe vocabulary, heartbeat style, tuple layouts, handshake steps.
//! The rest of the service only ever sees canonical types.

pub mod binance;
pub mod coinbase;
pub mod gemini;
pub mod kraken;

pub use binance::BinanceAdapter;
pub use coinbase::CoinbaseAdapter;
pub use gemini::GeminiAdapter;
pub use kraken::KrakenAdapter;

use crate::config::MarketDataConfig;
use crate::error::{AdapterError, Result};
use crate::input::VenueAdapter;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use types::VenueId;

/// Build the adapter for `venue` from its config section.
pub fn build_adapter(venue: VenueId, config: &MarketDataConfig) -> Result<Arc<dyn VenueAdapter>> {
    let venue_config = config
        .venue(venue)
        .ok_or_else(|| AdapterError::Configuration(format!("no config section for venue {venue}")))?;
    let request_timeout_ms = config.pool.request_timeout_ms;
    let adapter: Arc<dyn VenueAdapter> = match venue {
        VenueId::Binance => Arc::new(BinanceAdapter::new(venue_config, request_timeout_ms)?),
        VenueId::Coinbase => Arc::new(CoinbaseAdapter::new(venue_config, request_timeout_ms)?),
        VenueId::Kraken => Arc::new(KrakenAdapter::new(venue_config, request_timeout_ms)?),
        VenueId::Gemini => Arc::new(GeminiAdapter::new(venue_config, request_timeout_ms)?),
    };
    Ok(adapter)
}

/// Parse a venue-formatted decimal string.
pub(crate) fn parse_decimal(venue: VenueId, value: &str) -> Result<Decimal> {
    value.parse().map_err(|_| AdapterError::InvalidNumeric {
        venue,
        value: value.to_string(),
    })
}

/// Decimal from a JSON float, for venues that send numbers instead of
/// strings.
pub(crate) fn decimal_from_f64(venue: VenueId, value: f64) -> Result<Decimal> {
    Decimal::try_from(value).map_err(|_| AdapterError::InvalidNumeric {
        venue,
        value: value.to_string(),
    })
}

/// Required object field.
pub(crate) fn field<'a>(venue: VenueId, value: &'a Value, name: &'static str) -> Result<&'a Value> {
    value
        .get(name)
        .ok_or(AdapterError::MissingField { venue, field: name })
}

/// Required string field.
pub(crate) fn str_field<'a>(venue: VenueId, value: &'a Value, name: &'static str) -> Result<&'a str> {
    field(venue, value, name)?
        .as_str()
        .ok_or(AdapterError::MissingField { venue, field: name })
}

/// Map a REST transport error, keeping timeouts distinct from other
/// connection failures.
pub(crate) fn http_error(venue: VenueId, error: reqwest::Error, timeout_ms: u64) -> AdapterError {
    if error.is_timeout() {
        AdapterError::RequestTimeout { venue, timeout_ms }
    } else {
        AdapterError::ConnectionFailed {
            venue,
            reason: error.to_string(),
        }
    }
}

/// Map a non-success HTTP status.
pub(crate) fn status_error(venue: VenueId, status: reqwest::StatusCode) -> AdapterError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AdapterError::RateLimitExceeded { venue }
    } else {
        AdapterError::ConnectionFailed {
            venue,
            reason: format!("http status {status}"),
        }
    }
}

/// REST client with the pool-level request timeout baked in.
pub(crate) fn rest_client(timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| AdapterError::Configuration(format!("http client: {e}")))
}
