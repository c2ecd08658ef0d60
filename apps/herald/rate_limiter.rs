use std::time::Duration;

use tokio::{
    sync::Mutex,
    time::{Instant, sleep},
};
use tracing::debug;

/// Minimum spacing between Tally API requests. The API allows roughly one
/// request per second; the extra 100ms keeps bursts safely under the limit.
pub const TALLY_MIN_INTERVAL: Duration = Duration::from_millis(1100);

/// Enforces a minimum interval between calls. Concurrent callers queue on the
/// internal lock and are released one at a time, each inheriting the previous
/// caller's release time as its baseline.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Sleeps until at least `min_interval` has passed since the previous
    /// call was released, then records the new release time.
    pub async fn wait_if_needed(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting before next request");
                sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_passes_immediately() {
        let limiter = RateLimiter::new(Duration::from_millis(1100));
        let start = Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced_out() {
        let limiter = RateLimiter::new(Duration::from_millis(1100));
        let start = Instant::now();
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;
        assert!(start.elapsed() >= Duration::from_millis(2200));
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_once_interval_has_elapsed() {
        let limiter = RateLimiter::new(Duration::from_millis(1100));
        limiter.wait_if_needed().await;
        sleep(Duration::from_millis(1200)).await;
        let start = Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_serialize() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1100)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait_if_needed().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Three callers cannot complete in fewer than two full intervals.
        assert!(start.elapsed() >= Duration::from_millis(2200));
    }
}
