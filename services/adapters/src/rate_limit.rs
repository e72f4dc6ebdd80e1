//! Local REST rate limiting, one limiter per venue.

use crate::error::{AdapterError, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use types::VenueId;

/// Token-bucket limiter guarding a venue's REST endpoints.
pub struct VenueRateLimiter {
    venue: VenueId,
    limiter: DefaultDirectRateLimiter,
}

impl VenueRateLimiter {
    /// Limiter admitting `requests_per_minute` slots; zero clamps to one.
    pub fn new(venue: VenueId, requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(nonzero!(1u32));
        Self {
            venue,
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        }
    }

    /// Wait until a request slot is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a slot if one is available right now.
    pub fn try_acquire(&self) -> Result<()> {
        self.limiter
            .check()
            .map_err(|_| AdapterError::RateLimitExceeded { venue: self.venue })
    }
}

impl std::fmt::Debug for VenueRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueRateLimiter")
            .field("venue", &self.venue)
            .finish()
    }
}
