//! Rate limiting utilities

use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Inbound position messages allowed per player per second at the relay
pub const POSITION_RATE_LIMIT: u32 = 30;

/// Quota allowing one cell per `interval` with no burst.
fn spaced_quota(interval: Duration) -> Quota {
    Quota::with_period(interval)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
}

/// Per-player rate limiter state on the relay side.
///
/// Only `position_update` traffic goes through here; lap, ready and quit
/// messages are never rate limited.
#[derive(Clone)]
pub struct PlayerRateLimiter {
    position_limiter: Arc<Limiter>,
}

impl PlayerRateLimiter {
    pub fn new(positions_per_second: u32) -> Self {
        Self {
            position_limiter: create_limiter(positions_per_second),
        }
    }

    /// Check if a position message is allowed (returns true if allowed)
    pub fn check_position(&self) -> bool {
        self.position_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new(POSITION_RATE_LIMIT)
    }
}

/// Client-side gate for outbound `position_update` messages.
///
/// Time based: at most one update per `interval`, no burst, so the
/// sender never exceeds `1 / interval` updates per second.
pub struct PositionThrottle<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
}

impl PositionThrottle<DefaultClock> {
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: RateLimiter::direct(spaced_quota(interval)),
        }
    }
}

impl<C: Clock> PositionThrottle<C> {
    pub fn with_clock(interval: Duration, clock: &C) -> Self {
        Self {
            limiter: RateLimiter::direct_with_clock(spaced_quota(interval), clock),
        }
    }

    /// Returns true when an update may be sent now, consuming the slot
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
