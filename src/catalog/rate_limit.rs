//! Request pacing for the catalog service
//!
//! Batch fan-out fires every lookup in a batch at once; the pacer smooths
//! them to a configured requests-per-second budget so the service's implicit
//! limits are respected even inside one batch.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;

/// Global pacer shared by all in-flight catalog requests
pub struct RequestPacer {
    limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl RequestPacer {
    /// Create a pacer allowing `requests_per_second` requests
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        // Burst of one: spacing matters more than raw throughput here
        let quota = Quota::per_second(rps).allow_burst(nonzero!(1u32));
        let limiter = RateLimiter::direct(quota);

        Self { limiter }
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}
