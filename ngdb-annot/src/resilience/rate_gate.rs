//! Per-source rate limiting
//!
//! Each source client owns its own gate built from its configured
//! requests-per-second ceiling. Gates are fully independent: a strict 2
//! req/s provider never throttles a 10 req/s neighbor in the same process.

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct RateGate {
    limiter: DirectLimiter,
    requests_per_second: u32,
}

impl RateGate {
    /// Build a gate for `requests_per_second` (clamped to at least 1;
    /// config validation rejects zero before this is reached).
    ///
    /// Burst is capped at one cell: a provider with a 2 req/s ceiling gets
    /// evenly spaced requests, not an opening volley of 2.
    pub fn per_second(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second.max(1)).expect("clamped to nonzero");
        let one = NonZeroU32::new(1).expect("literal is nonzero");
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rps).allow_burst(one)),
            requests_per_second: rps.get(),
        }
    }

    /// Wait until the next request is allowed under this source's ceiling
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_gate_spaces_out_requests() {
        let gate = RateGate::per_second(10); // 100ms spacing

        let start = Instant::now();
        gate.acquire().await; // first passes immediately
        gate.acquire().await;
        gate.acquire().await;
        let elapsed = start.elapsed();

        // Three acquisitions at 10/s need roughly 200ms beyond the first
        assert!(elapsed >= Duration::from_millis(150), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_gates_are_independent() {
        let slow = RateGate::per_second(2);
        let fast = RateGate::per_second(50);

        // Exhaust the slow gate's first slot
        slow.acquire().await;

        // The fast gate must not be delayed by the slow one
        let start = Instant::now();
        for _ in 0..5 {
            fast.acquire().await;
        }
        let fast_elapsed = start.elapsed();
        assert!(
            fast_elapsed < Duration::from_millis(250),
            "fast gate throttled by slow gate: {fast_elapsed:?}"
        );
    }
}
