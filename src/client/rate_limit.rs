//! Sliding-window request rate limiting
//!
//! Allows up to `rate` acquisitions per rolling 1-second window. The
//! window must hold exactly even under concurrent callers, so the whole
//! acquire path (including the age-out sleep) runs under one async lock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Admission control on request issuance rate. `rate = 0` disables
/// limiting entirely.
pub struct RateLimiter {
    rate: usize,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(rate: u32) -> Self {
        Self {
            rate: rate as usize,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one acquisition, sleeping until the oldest timestamp ages
    /// out of the window when the rate is saturated.
    pub async fn acquire(&self) {
        if self.rate == 0 {
            return;
        }

        let mut window = self.window.lock().await;
        let now = Instant::now();
        Self::prune(&mut window, now);

        if window.len() < self.rate {
            window.push_back(now);
            return;
        }

        let oldest = window[0];
        let wait_for = WINDOW.saturating_sub(now.duration_since(oldest));
        if !wait_for.is_zero() {
            // lock stays held: acquisitions are strictly serialized
            tokio::time::sleep(wait_for).await;
        }

        let now = Instant::now();
        Self::prune(&mut window, now);
        window.push_back(now);
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_rate_is_noop() {
        let limiter = RateLimiter::new(0);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_below_rate_is_immediate() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_rate_waits_for_window() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        // acquisitions 3 and 4 must wait for the first two to age out
        assert!(start.elapsed() >= WINDOW);
        assert!(start.elapsed() < WINDOW * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_window_exceeds_rate_under_concurrency() {
        const RATE: usize = 3;
        const CALLS: usize = 10;

        let limiter = Arc::new(RateLimiter::new(RATE as u32));
        let mut handles = Vec::new();
        for _ in 0..CALLS {
            let l = limiter.clone();
            handles.push(tokio::spawn(async move {
                l.acquire().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();

        // every sliding window of RATE+1 completions spans more than 1s
        for pair in stamps.windows(RATE + 1) {
            let span = pair[RATE].duration_since(pair[0]);
            assert!(
                span >= WINDOW,
                "window of {} acquisitions completed within {:?}",
                RATE + 1,
                span
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_refills_after_idle() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
