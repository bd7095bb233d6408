//! Process-wide limit on job starts.

use std::num::NonZeroU32;
use std::thread;

use governor::{
    clock::{Clock, QuantaClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

pub type StartRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Token bucket shared by all workers; one token per job start.
pub struct StartLimiter {
    limiter: StartRateLimiter,
    clock: QuantaClock,
}

impl StartLimiter {
    /// `per_second` starts per second, bursting to the same amount.
    /// Zero is treated as one.
    pub fn per_second(per_second: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let clock = QuantaClock::default();
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            clock,
        }
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Blocks the calling thread until a token is available.
    pub fn acquire(&self) {
        while let Err(not_until) = self.limiter.check() {
            thread::sleep(not_until.wait_time_from(self.clock.now()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_burst_then_limited() {
        let limiter = StartLimiter::per_second(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_acquire_waits_for_replenish() {
        let limiter = StartLimiter::per_second(10);
        for _ in 0..10 {
            limiter.acquire();
        }
        let started = Instant::now();
        limiter.acquire();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let limiter = StartLimiter::per_second(0);
        assert!(limiter.try_acquire());
    }
}
