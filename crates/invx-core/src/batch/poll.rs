//! Readiness polling policy.

use std::time::Duration;

/// How the interval between polls evolves.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same interval every round.
    Fixed,
    /// Interval multiplied by `factor` each round, capped at `max_interval`.
    Exponential { factor: f64, max_interval: Duration },
}

/// Interval, backoff and ceiling for waiting on document processing.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second poll round.
    pub interval: Duration,
    /// Backoff applied after each round.
    pub backoff: Backoff,
    /// Give up after this long; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            backoff: Backoff::Fixed,
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PollPolicy {
    /// Fixed interval with the default timeout.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Replace the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay to use after a round that waited `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential {
                factor,
                max_interval,
            } => current.mul_f64(factor.max(1.0)).min(max_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let policy = PollPolicy::default();
        assert_eq!(
            policy.next_delay(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = PollPolicy {
            interval: Duration::from_secs(1),
            backoff: Backoff::Exponential {
                factor: 2.0,
                max_interval: Duration::from_secs(5),
            },
            timeout: None,
        };

        let mut delay = policy.interval;
        let mut delays = Vec::new();
        for _ in 0..5 {
            delay = policy.next_delay(delay);
            delays.push(delay.as_secs());
        }
        assert_eq!(delays, vec![2, 4, 5, 5, 5]);
    }

    #[test]
    fn test_shrinking_factor_is_ignored() {
        let policy = PollPolicy {
            interval: Duration::from_secs(4),
            backoff: Backoff::Exponential {
                factor: 0.5,
                max_interval: Duration::from_secs(60),
            },
            timeout: None,
        };
        assert_eq!(policy.next_delay(Duration::from_secs(4)), Duration::from_secs(4));
    }
}
