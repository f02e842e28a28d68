//! Exponential backoff delays for fetch retries
//!
//! A task that fails attempt `n` waits `base_delay * 2^n` before re-entering
//! the queue, capped at `max_delay`, with optional jitter to spread
//! simultaneous retries.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay before re-enqueueing a task that just failed attempt `attempt`
///
/// With the default configuration (5s base) the schedule is 5s, 10s, 20s
/// for attempts 0, 1, 2. The delay never exceeds `max_delay`.
pub fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    // Saturate the shift so a pathological attempt count cannot overflow
    let multiplier = 2u64.saturating_pow(attempt);
    let delay = config
        .base_delay
        .saturating_mul(multiplier.min(u32::MAX as u64) as u32)
        .min(config.max_delay);

    if config.jitter { add_jitter(delay) } else { delay }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
