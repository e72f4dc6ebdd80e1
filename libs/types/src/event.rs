//! Typed events flowing between tasks.
//!
//! Connections emit [`VenueEvent`]s onto the pool's fan-in channel; the hub
//! consumes them, updates its shards and re-emits consumer-facing
//! [`MarketEvent`]s on per-key broadcast channels. No component hands
//! another a callback.

use crate::{Candle, Symbol, Timeframe, Trade, VenueId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness of one venue's market data feed, as seen by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    /// Connected and flowing
    Live,
    /// Temporarily disconnected; reconnection in progress
    Stale,
    /// Reconnection budget exhausted; feed is down until re-subscribed
    Down,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Live => f.write_str("live"),
            FeedStatus::Stale => f.write_str("stale"),
            FeedStatus::Down => f.write_str("down"),
        }
    }
}

/// Event emitted by a pool connection task toward the hub.
#[derive(Debug, Clone)]
pub enum VenueEvent {
    /// A normalized trade print arrived on a stream or poll round.
    Trade {
        /// Originating venue
        venue: VenueId,
        /// Canonical symbol
        symbol: Symbol,
        /// The print
        trade: Trade,
    },
    /// The connection is open and all subscriptions are re-established.
    Connected {
        /// Venue that came up
        venue: VenueId,
    },
    /// The connection dropped; the pool is scheduling a reconnect.
    Disconnected {
        /// Venue that went away
        venue: VenueId,
        /// Human-readable cause, for logs
        reason: String,
    },
    /// The reconnect budget is exhausted; the feed is terminally down.
    Failed {
        /// Venue that gave up
        venue: VenueId,
        /// Human-readable cause, for logs
        reason: String,
    },
}

impl VenueEvent {
    /// Venue this event concerns.
    pub fn venue(&self) -> VenueId {
        match self {
            VenueEvent::Trade { venue, .. }
            | VenueEvent::Connected { venue }
            | VenueEvent::Disconnected { venue, .. }
            | VenueEvent::Failed { venue, .. } => *venue,
        }
    }
}

/// Event delivered to hub subscribers for one (venue, symbol).
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// A trade print was applied to the shard.
    Trade {
        /// Originating venue
        venue: VenueId,
        /// Canonical symbol
        symbol: Symbol,
        /// The print
        trade: Trade,
    },
    /// A candle period closed; the candle is now immutable.
    Candle {
        /// Originating venue
        venue: VenueId,
        /// Canonical symbol
        symbol: Symbol,
        /// Period of the closed candle
        timeframe: Timeframe,
        /// The closed candle
        candle: Candle,
    },
    /// The feed status for this venue changed.
    Status {
        /// Venue whose status changed
        venue: VenueId,
        /// New status
        status: FeedStatus,
    },
}
