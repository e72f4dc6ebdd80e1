//! Error types for the adapter service.
//!
//! Every failure a consumer can observe is an [`AdapterError`] variant tagged
//! with enough context (venue, symbol, operation) to act on. Raw transport
//! errors are wrapped at the boundary where they occur; they never reach a
//! consumer untagged.

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use types::{Symbol, VenueId};

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// The failure taxonomy consumers branch on.
///
/// Variants of [`AdapterError`] are granular for diagnostics; `kind()`
/// collapses them into the six categories that matter for handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network blip or single fetch/parse failure; retrying is reasonable
    Transient,
    /// A feed degraded past its liveness threshold
    Stale,
    /// The venue (or deployment) does not offer the capability; permanent
    Unsupported,
    /// Connection limit reached; shed load or raise the limit
    PoolExhausted,
    /// An aggregation round found zero usable sources
    NoLiquidity,
    /// A bounded wait elapsed
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Stale => "stale",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::NoLiquidity => "no_liquidity",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Errors that can occur anywhere in the adapter service
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Connection to a venue failed
    #[error("connection to {venue} failed: {reason}")]
    ConnectionFailed {
        /// The venue that failed
        venue: VenueId,
        /// Failure reason
        reason: String,
    },

    /// Opening a connection exceeded the configured bound
    #[error("connection to {venue} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// The venue that timed out
        venue: VenueId,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// A REST request exceeded the configured bound
    #[error("request to {venue} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The venue that timed out
        venue: VenueId,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// A feed has gone silent past its heartbeat threshold
    #[error("{venue} feed is stale: no inbound traffic for {silent_ms}ms")]
    FeedStale {
        /// The venue whose feed stalled
        venue: VenueId,
        /// Observed silence
        silent_ms: u64,
    },

    /// A venue does not offer the requested capability
    #[error("{venue} does not support {operation}")]
    Unsupported {
        /// The venue lacking the capability
        venue: VenueId,
        /// The requested operation
        operation: String,
    },

    /// The capability is not available in this deployment (no venue involved)
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// The pool's connection bound was hit
    #[error("connection pool exhausted ({active}/{max} connections in use)")]
    PoolExhausted {
        /// Connections currently held
        active: usize,
        /// Configured bound
        max: usize,
    },

    /// No venue produced a usable snapshot for an aggregation round
    #[error("no liquidity for {symbol}: every venue failed or was excluded")]
    NoLiquidity {
        /// Symbol that could not be aggregated
        symbol: Symbol,
    },

    /// The reconnect budget is exhausted; the connection is terminally failed
    #[error("max reconnect attempts ({max_attempts}) exceeded for {venue}")]
    MaxReconnectAttemptsExceeded {
        /// The venue that gave up
        venue: VenueId,
        /// The exhausted budget
        max_attempts: u32,
    },

    /// A session/token handshake was rejected
    #[error("authentication with {venue} failed: {reason}")]
    AuthenticationFailed {
        /// The venue that rejected us
        venue: VenueId,
        /// Rejection detail
        reason: String,
    },

    /// The local rate limit for a venue denied a request
    #[error("rate limit exceeded for {venue}")]
    RateLimitExceeded {
        /// The venue being protected
        venue: VenueId,
    },

    /// A venue message could not be interpreted
    #[error("failed to parse {venue} message: {reason}")]
    Parse {
        /// The venue whose message was malformed
        venue: VenueId,
        /// What went wrong
        reason: String,
    },

    /// A required field was absent from a venue message
    #[error("missing field {field:?} in {venue} message")]
    MissingField {
        /// The venue whose message was incomplete
        venue: VenueId,
        /// The absent field
        field: &'static str,
    },

    /// A numeric field failed to parse
    #[error("invalid numeric value {value:?} from {venue}")]
    InvalidNumeric {
        /// The venue that sent the value
        venue: VenueId,
        /// The offending text
        value: String,
    },

    /// An operation referenced a connection the pool does not hold
    #[error("unknown connection: {id}")]
    UnknownConnection {
        /// The unrecognized connection id
        id: String,
    },

    /// Configuration was rejected
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// WebSocket protocol error (internal; tagged before it leaves the pool)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization error (internal; payload construction)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal channel closed while the component was still running
    #[error("internal channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl AdapterError {
    /// Collapse this error into the handling-policy taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Unsupported { .. } | AdapterError::NotSupported(_) => {
                ErrorKind::Unsupported
            }
            AdapterError::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            AdapterError::NoLiquidity { .. } => ErrorKind::NoLiquidity,
            AdapterError::ConnectTimeout { .. } | AdapterError::RequestTimeout { .. } => {
                ErrorKind::Timeout
            }
            AdapterError::FeedStale { .. } | AdapterError::MaxReconnectAttemptsExceeded { .. } => {
                ErrorKind::Stale
            }
            _ => ErrorKind::Transient,
        }
    }

    /// Whether retrying the operation could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Timeout)
    }

    /// Whether the failure is permanent for this venue/deployment.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AdapterError::Unsupported { .. }
                | AdapterError::NotSupported(_)
                | AdapterError::Configuration(_)
                | AdapterError::MaxReconnectAttemptsExceeded { .. }
        )
    }

    /// Venue-tagged `Unsupported` constructor.
    pub fn unsupported(venue: VenueId, operation: impl Into<String>) -> Self {
        AdapterError::Unsupported {
            venue,
            operation: operation.into(),
        }
    }

    /// Venue-tagged parse failure constructor.
    pub fn parse(venue: VenueId, reason: impl Into<String>) -> Self {
        AdapterError::Parse {
            venue,
            reason: reason.into(),
        }
    }
}
