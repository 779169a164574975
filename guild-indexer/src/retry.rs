//! Retry policy shared by the pipeline stages.

use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};

/// Upper bound of a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Bounded exponential backoff.
///
/// `max_attempts` counts the first try, so a policy with `max_attempts == 2` sleeps once. The
/// delay starts at `base_delay` and doubles up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }

    /// A policy that retries without sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            jitter: false,
            ..Self::new(max_attempts, Duration::ZERO)
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// The sleeps between attempts: `max_attempts - 1` of them.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base_ms = self.base_delay.as_millis() as u64;
        let with_jitter = self.jitter;

        ExponentialBackoff::from_millis(2)
            .factor(base_ms.div_ceil(2))
            .max_delay(self.max_delay)
            .map(move |d| if with_jitter { jitter(d) } else { d })
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_from_base() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).without_jitter();
        let delays: Vec<Duration> = policy.delays().collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn test_delays_are_capped() {
        let policy = RetryPolicy::new(6, Duration::from_secs(4)).without_jitter();
        let delays: Vec<Duration> = policy.delays().collect();

        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|d| *d <= DEFAULT_MAX_DELAY));
        assert_eq!(delays[4], DEFAULT_MAX_DELAY);
    }

    #[test]
    fn test_single_attempt_never_sleeps() {
        assert_eq!(RetryPolicy::new(1, Duration::from_secs(1)).delays().count(), 0);
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }

    #[test]
    fn test_immediate_policy() {
        let delays: Vec<Duration> = RetryPolicy::immediate(3).delays().collect();
        assert_eq!(delays, vec![Duration::ZERO, Duration::ZERO]);
    }
}
