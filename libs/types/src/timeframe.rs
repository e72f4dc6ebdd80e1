//! Canonical candle timeframes.
//!
//! Venues disagree on timeframe vocabulary: Binance speaks `"1m"`/`"1h"`,
//! Coinbase wants granularity in seconds, Kraken intervals in minutes and
//! Gemini strings like `"1hr"`. This enum is the single internal vocabulary;
//! each adapter converts to its venue's spelling and back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A canonical candle period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// One minute
    #[serde(rename = "1m")]
    M1,
    /// Five minutes
    #[serde(rename = "5m")]
    M5,
    /// Fifteen minutes
    #[serde(rename = "15m")]
    M15,
    /// Thirty minutes
    #[serde(rename = "30m")]
    M30,
    /// One hour
    #[serde(rename = "1h")]
    H1,
    /// Four hours
    #[serde(rename = "4h")]
    H4,
    /// One day
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All timeframes, shortest first.
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Period length in milliseconds.
    pub fn period_ms(&self) -> i64 {
        match self {
            Timeframe::M1 => 60_000,
            Timeframe::M5 => 300_000,
            Timeframe::M15 => 900_000,
            Timeframe::M30 => 1_800_000,
            Timeframe::H1 => 3_600_000,
            Timeframe::H4 => 14_400_000,
            Timeframe::D1 => 86_400_000,
        }
    }

    /// Period length in whole seconds.
    pub fn period_secs(&self) -> i64 {
        self.period_ms() / 1000
    }

    /// Canonical label, e.g. `"5m"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Floor a timestamp to the open time of the period containing it.
    pub fn align(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period_ms();
        let aligned = ts.timestamp_millis().div_euclid(period) * period;
        DateTime::from_timestamp_millis(aligned).unwrap_or(ts)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognized timeframe label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timeframe: {0}")]
pub struct TimeframeParseError(pub String);

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(TimeframeParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_label_round_trip() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.as_str().parse().unwrap();
            assert_eq!(parsed, tf);
        }
    }

    #[test]
    fn test_align_floors_to_period_open() {
        // 2024-03-01 14:37:42.500 UTC
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 14, 37, 42).unwrap()
            + chrono::Duration::milliseconds(500);

        let m1 = Timeframe::M1.align(ts);
        assert_eq!(m1, Utc.with_ymd_and_hms(2024, 3, 1, 14, 37, 0).unwrap());

        let m15 = Timeframe::M15.align(ts);
        assert_eq!(m15, Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap());

        let h1 = Timeframe::H1.align(ts);
        assert_eq!(h1, Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap());

        let d1 = Timeframe::D1.align(ts);
        assert_eq!(d1, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_align_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 14, 37, 42).unwrap();
        for tf in Timeframe::ALL {
            let once = tf.align(ts);
            assert_eq!(tf.align(once), once);
        }
    }

    #[test]
    fn test_period_lengths_ascend() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0].period_ms() < pair[1].period_ms());
        }
    }
}
