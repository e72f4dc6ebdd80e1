//! Venue identifiers for all supported trading platforms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported trading venue.
///
/// The variant order is the canonical venue-list order used for deterministic
/// tie-breaking in aggregation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    /// Binance spot market
    Binance,
    /// Coinbase Exchange
    Coinbase,
    /// Kraken spot market
    Kraken,
    /// Gemini (REST polling only)
    Gemini,
}

impl VenueId {
    /// All venues in canonical order.
    pub const ALL: [VenueId; 4] = [
        VenueId::Binance,
        VenueId::Coinbase,
        VenueId::Kraken,
        VenueId::Gemini,
    ];

    /// Lowercase identifier used in logs, config sections and env prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::Binance => "binance",
            VenueId::Coinbase => "coinbase",
            VenueId::Kraken => "kraken",
            VenueId::Gemini => "gemini",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a venue name cannot be recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown venue: {0}")]
pub struct VenueParseError(pub String);

impl FromStr for VenueId {
    type Err = VenueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(VenueId::Binance),
            "coinbase" => Ok(VenueId::Coinbase),
            "kraken" => Ok(VenueId::Kraken),
            "gemini" => Ok(VenueId::Gemini),
            other => Err(VenueParseError(other.to_string())),
        }
    }
}
