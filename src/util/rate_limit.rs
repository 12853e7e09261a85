//! Per-connection inbound throttling

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Max inbound text frames per second per connection
pub const FRAME_RATE_LIMIT: u32 = 30;

/// Max join requests per second per connection; every join may create a session
pub const JOIN_RATE_LIMIT: u32 = 5;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn per_second(limit: u32) -> DirectLimiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN),
    ))
}

/// Budgets owned by a single connection's reader loop
pub struct ConnectionRateLimiter {
    frames: DirectLimiter,
    joins: DirectLimiter,
    dropped: u64,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(FRAME_RATE_LIMIT, JOIN_RATE_LIMIT)
    }

    pub fn with_limits(frames_per_second: u32, joins_per_second: u32) -> Self {
        Self {
            frames: per_second(frames_per_second),
            joins: per_second(joins_per_second),
            dropped: 0,
        }
    }

    /// Any text frame, checked before parsing
    pub fn admit_frame(&mut self) -> bool {
        let admitted = self.frames.check().is_ok();
        if !admitted {
            self.dropped += 1;
        }
        admitted
    }

    /// A parsed join request; draws from the join budget on top of the frame one
    pub fn admit_join(&mut self) -> bool {
        let admitted = self.joins.check().is_ok();
        if !admitted {
            self.dropped += 1;
        }
        admitted
    }

    /// Frames refused so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
