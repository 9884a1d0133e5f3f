use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Builds the shared pacing source: one permit every `1e6 / qps`
/// microseconds with no burst, so the aggregate rate across all workers is
/// `qps`. Returns `None` when unthrottled.
pub(crate) fn rate_limiter(qps: f64) -> Option<DefaultDirectRateLimiter> {
    if qps <= 0.0 {
        return None;
    }
    let period = Duration::from_micros((1e6 / qps) as u64);
    let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::new(1).unwrap());
    Some(RateLimiter::direct(quota))
}
