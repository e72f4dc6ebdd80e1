//! Canonical trading pair representation.
//!
//! Every venue spells pairs differently (`BTCUSDT`, `BTC-USD`, `XBT/USD`,
//! `btcusd`); internally a pair is always a base/quote `Symbol` rendered as
//! `BASE/QUOTE`. Venue adapters own the bidirectional mapping between their
//! wire spelling and this type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A canonical base/quote trading pair, e.g. `BTC/USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Build a symbol from base and quote assets. Assets are uppercased.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_ascii_uppercase(),
            quote: quote.into().to_ascii_uppercase(),
        }
    }

    /// Base asset, e.g. `BTC` in `BTC/USD`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote asset, e.g. `USD` in `BTC/USD`.
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Error returned when a canonical symbol string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid symbol {input:?}: expected BASE/QUOTE")]
pub struct SymbolParseError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for Symbol {
    type Err = SymbolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Symbol::new(base, quote))
            }
            _ => Err(SymbolParseError {
                input: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
