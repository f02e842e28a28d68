//! Rate limiting using token bucket algorithm
//!
//! The RateLimiter smooths remote API calls across all workers in a pool
//! using an efficient lock-free token bucket implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Internal resolution: one token is stored as 1000 milli-tokens, so
/// fractional refill amounts are not lost between attempts.
const MILLIS_PER_TOKEN: u64 = 1_000;

/// Shared token bucket limiting remote API calls across all workers
///
/// A bucket holds up to `capacity` tokens and refills at `refill_rate`
/// tokens per second. Each remote call spends one token; when the bucket is
/// empty, callers wait for the refill. Idle time is banked up to the cap,
/// so a burst after a quiet period proceeds immediately while sustained
/// throughput smooths to the refill rate.
///
/// # Implementation
///
/// Uses AtomicU64 for lock-free token tracking:
/// - `tokens`: available milli-tokens (1 token = 1000 milli-tokens)
/// - `last_refill`: timestamp of last refill (nanoseconds since an
///   arbitrary per-process epoch)
///
/// Arrival order among blocked callers is not FIFO, but every caller
/// eventually succeeds as tokens keep refilling.
#[derive(Clone)]
pub struct RateLimiter {
    /// Maximum burst size in milli-tokens
    capacity_millis: u64,
    /// Tokens added per second
    refill_rate: f64,
    /// Available milli-tokens
    tokens: Arc<AtomicU64>,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a new RateLimiter with a full bucket
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum burst size in tokens
    /// * `refill_rate` - Tokens added per second
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_export::rate_limiter::RateLimiter;
    ///
    /// // 60 requests per minute with bursts of up to 60
    /// let limiter = RateLimiter::new(60, 1.0);
    /// ```
    #[must_use]
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        let now = Self::now_nanos();

        Self {
            capacity_millis: capacity * MILLIS_PER_TOKEN,
            refill_rate,
            tokens: Arc::new(AtomicU64::new(capacity * MILLIS_PER_TOKEN)),
            last_refill: Arc::new(AtomicU64::new(now)),
        }
    }

    /// Acquire permission for `tokens` remote calls
    ///
    /// Blocks until the bucket holds enough tokens, then atomically spends
    /// them and returns `true`. If `cancel` fires while waiting, returns
    /// `false` within one refill-check interval (≤ ~100 ms) without spending
    /// anything. Acquisition never fails for any other reason; it only
    /// delays.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Number of tokens to spend (one per remote call)
    /// * `cancel` - Cancellation signal observed while blocked
    pub async fn acquire(&self, tokens: u64, cancel: &CancellationToken) -> bool {
        // Fast path: nothing to acquire
        if tokens == 0 {
            return true;
        }

        let needed = tokens * MILLIS_PER_TOKEN;

        loop {
            if cancel.is_cancelled() {
                return false;
            }

            // Refill tokens based on elapsed time
            self.refill_tokens();

            let current = self.tokens.load(Ordering::SeqCst);

            if current >= needed {
                if self
                    .tokens
                    .compare_exchange(
                        current,
                        current - needed,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    return true;
                }
                // CAS lost to a concurrent caller — retry immediately
                continue;
            }

            // Not enough tokens — wait for refill.
            // Cap sleep at 100ms so cancellation is observed promptly.
            let deficit = needed - current;
            let wait_ms = (deficit as f64 / self.refill_rate) as u64;
            let wait = Duration::from_millis(wait_ms.clamp(10, 100));

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Current number of available tokens
    ///
    /// A snapshot for stats and tests; the value may change concurrently.
    pub fn available(&self) -> f64 {
        self.tokens.load(Ordering::SeqCst) as f64 / MILLIS_PER_TOKEN as f64
    }

    /// Maximum burst size in tokens
    pub fn capacity(&self) -> u64 {
        self.capacity_millis / MILLIS_PER_TOKEN
    }

    /// Refill tokens based on elapsed time since last refill
    fn refill_tokens(&self) {
        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_nanos = now.saturating_sub(last);
        let elapsed_secs = elapsed_nanos as f64 / 1_000_000_000.0;

        let tokens_to_add = (elapsed_secs * self.refill_rate * MILLIS_PER_TOKEN as f64) as u64;

        if tokens_to_add > 0 {
            // Only the caller that wins the timestamp CAS adds tokens,
            // so an idle period is banked exactly once.
            if self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let current = self.tokens.load(Ordering::SeqCst);
                let new_tokens = (current + tokens_to_add).min(self.capacity_millis);
                self.tokens.store(new_tokens, Ordering::SeqCst);
            }
        }
    }

    /// Get current monotonic time in nanoseconds
    ///
    /// Uses a monotonic clock that is not affected by system time changes.
    /// The epoch is arbitrary but consistent within a process lifetime.
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_bucket_burst_does_not_block() {
        let limiter = RateLimiter::new(60, 1.0);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..60 {
            assert!(limiter.acquire(1, &cancel).await);
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed < Duration::from_millis(100),
            "a full bucket must serve its capacity without blocking, took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn drained_bucket_blocks_for_about_one_refill() {
        let limiter = RateLimiter::new(60, 1.0);
        let cancel = CancellationToken::new();

        // Drain the full burst
        for _ in 0..60 {
            assert!(limiter.acquire(1, &cancel).await);
        }

        // The 61st call must wait for ~1 token at 1 token/sec
        let start = Instant::now();
        assert!(limiter.acquire(1, &cancel).await);
        let elapsed = start.elapsed();

        // Expected ~1s; generous tolerance: 500ms - 3000ms
        assert!(
            elapsed >= Duration::from_millis(500),
            "acquire on an empty bucket should wait ~1s, only took {:?}",
            elapsed
        );
        assert!(
            elapsed <= Duration::from_millis(3000),
            "acquire took too long: {:?} (expected ~1s)",
            elapsed
        );
    }

    #[tokio::test]
    async fn available_never_exceeds_capacity() {
        let limiter = RateLimiter::new(10, 1000.0);

        // Let far more than the cap accrue, then force a refill
        tokio::time::sleep(Duration::from_millis(100)).await;
        limiter.refill_tokens();

        let available = limiter.available();
        assert!(
            available <= 10.0,
            "refill must cap at capacity, got {}",
            available
        );
    }

    #[tokio::test]
    async fn tokens_are_spent_exactly_once_under_contention() {
        let limiter = RateLimiter::new(10, 0.001);
        let cancel = CancellationToken::new();

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(
                async move { limiter.acquire(1, &cancel).await },
            ));
        }

        for handle in handles {
            assert!(handle.await.unwrap(), "each caller must get a token");
        }

        // 10 tokens spent from a 10-token bucket with negligible refill
        let available = limiter.available();
        assert!(
            available < 1.0,
            "all tokens should be spent, {} remaining",
            available
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_unblocks_waiting_acquire() {
        // Nearly no refill, so acquire would otherwise wait a very long time
        let limiter = RateLimiter::new(1, 0.001);
        let cancel = CancellationToken::new();

        // Drain the single token
        assert!(limiter.acquire(1, &cancel).await);

        let limiter_for_task = limiter.clone();
        let cancel_for_task = cancel.clone();
        let handle =
            tokio::spawn(async move { limiter_for_task.acquire(1, &cancel_for_task).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled acquire must return promptly")
            .unwrap();

        assert!(!result, "a cancelled acquire must report failure");
    }

    #[tokio::test]
    async fn acquire_zero_tokens_returns_immediately() {
        let limiter = RateLimiter::new(1, 0.001);
        let cancel = CancellationToken::new();

        // Empty the bucket so a real acquire would block
        assert!(limiter.acquire(1, &cancel).await);

        let start = Instant::now();
        assert!(limiter.acquire(0, &cancel).await);
        assert!(
            start.elapsed() < Duration::from_millis(50),
            "acquire(0) must not wait"
        );
    }

    #[tokio::test]
    async fn idle_time_is_banked_up_to_the_cap() {
        let limiter = RateLimiter::new(5, 100.0);
        let cancel = CancellationToken::new();

        // Drain, then idle long enough to refill the whole bucket
        for _ in 0..5 {
            assert!(limiter.acquire(1, &cancel).await);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The banked burst must be served without blocking
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.acquire(1, &cancel).await);
        }
        assert!(
            start.elapsed() < Duration::from_millis(100),
            "banked tokens must serve a burst immediately"
        );
    }

    #[test]
    fn clone_shares_state() {
        let original = RateLimiter::new(10, 1.0);
        let clone = original.clone();

        // Spend through the clone; the original must see the change
        clone.tokens.fetch_sub(5 * MILLIS_PER_TOKEN, Ordering::SeqCst);

        assert_eq!(
            original.available(),
            5.0,
            "original should reflect tokens spent via clone"
        );
    }
}
