//! Connect retry policy
//!
//! The default keeps dialing forever with a fixed one second pause so the
//! analyser can be started before the generator. Bounded variants exist for
//! tests and supervised deployments.

use std::time::Duration;

/// Fixed pause between refused connect attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between attempts (no backoff)
    pub delay: Duration,
    /// Give up after this many refused attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first attempt
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Retry forever with the default delay
    pub fn unbounded() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_attempts: None,
            timeout: None,
        }
    }

    /// Retry at most `max_attempts` times, `delay` apart
    pub fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether another attempt may follow `attempts` failed ones
    pub fn allows_another(&self, attempts: u32, elapsed: Duration) -> bool {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return false;
            }
        }
        match self.timeout {
            Some(timeout) => elapsed + self.delay < timeout,
            None => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_gives_up() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_another(u32::MAX - 1, Duration::from_secs(86_400)));
    }

    #[test]
    fn test_bounded_attempts() {
        let policy = RetryPolicy::bounded(3, Duration::from_millis(10));
        assert!(policy.allows_another(2, Duration::ZERO));
        assert!(!policy.allows_another(3, Duration::ZERO));
    }

    #[test]
    fn test_timeout_accounts_for_next_delay() {
        let policy = RetryPolicy::unbounded().with_timeout(Duration::from_millis(2500));
        assert!(policy.allows_another(1, Duration::from_millis(1000)));
        assert!(!policy.allows_another(2, Duration::from_millis(2000)));
    }
}
