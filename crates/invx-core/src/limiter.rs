//! Minimum-interval rate limiting for outbound service calls.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

/// Enforces a minimum wall-clock gap between calls to the remote service.
///
/// One limiter is shared (behind an `Arc`) by every component that talks to
/// the service. The check-sleep-update sequence runs under a single lock, so
/// concurrent callers are serialized and each one is granted its slot at
/// least `min_interval` after the previous grant.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Mutex::new(None),
        }
    }

    /// A limiter that never blocks.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Configured minimum interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the next call may proceed.
    ///
    /// Returns the instant the slot was granted.
    pub fn wait(&self) -> Instant {
        let mut last_grant = self.last_grant.lock();

        if let Some(previous) = *last_grant {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                trace!("Rate limiter sleeping for {:?}", remaining);
                thread::sleep(remaining);
            }
        }

        let granted = Instant::now();
        *last_grant = Some(granted);
        granted
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_call_does_not_block() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sequential_calls_are_spaced() {
        let interval = Duration::from_millis(40);
        let limiter = RateLimiter::new(interval);

        let first = limiter.wait();
        let second = limiter.wait();
        let third = limiter.wait();

        assert!(second.duration_since(first) >= interval);
        assert!(third.duration_since(second) >= interval);
    }

    #[test]
    fn test_concurrent_calls_are_spaced() {
        let interval = Duration::from_millis(30);
        let limiter = Arc::new(RateLimiter::new(interval));

        let mut grants: Vec<Instant> = thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    scope.spawn(move || (0..3).map(|_| limiter.wait()).collect::<Vec<_>>())
                })
                .collect();

            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        grants.sort();
        assert_eq!(grants.len(), 12);
        for pair in grants.windows(2) {
            assert!(
                pair[1].duration_since(pair[0]) >= interval,
                "gap {:?} shorter than {:?}",
                pair[1].duration_since(pair[0]),
                interval
            );
        }
    }

    #[test]
    fn test_unlimited_never_sleeps() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
