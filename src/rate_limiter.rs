use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// A single-knob minimum-interval gate: the k-th `acquire` call returns no
/// earlier than `last_acquire_time + min_interval`. The first call returns
/// immediately. Safe for concurrent callers — the wait itself happens with
/// no lock held, so two acquirers never block each other's lock
/// acquisition, only the interval they're racing to claim.
pub struct RateLimiter {
    min_interval: Duration,
    last_acquire: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_acquire: Mutex::new(None),
        }
    }

    /// Block until `min_interval` has elapsed since the last successful
    /// acquire (globally, across all callers), then record this acquire's
    /// timestamp. Loops to re-check after waking, since another acquirer may
    /// have claimed the slot first.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut last = self.last_acquire.lock().await;
                let now = Instant::now();
                match *last {
                    None => {
                        *last = Some(now);
                        return;
                    }
                    Some(prev) => {
                        let earliest = prev + self.min_interval;
                        if now >= earliest {
                            *last = Some(now);
                            return;
                        }
                        earliest - now
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Sets the stored timestamp far enough in the past that the next
    /// `acquire` call returns immediately.
    pub async fn reset(&self) {
        let mut last = self.last_acquire.lock().await;
        *last = Some(Instant::now() - self.min_interval - Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn five_acquires_take_at_least_four_intervals() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(800), "elapsed={elapsed:?}");
        assert!(elapsed < Duration::from_millis(1200), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn reset_makes_next_acquire_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        limiter.acquire().await;
        limiter.reset().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn concurrent_acquirers_never_violate_the_interval() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(95));
        }
        let _ = start;
    }
}
