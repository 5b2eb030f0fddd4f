use std::time::Duration;

/// Backoff schedule for retried steps.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Ceiling on the delay between retries.
    pub maximum_interval: Duration,
    /// Total attempts, the first one included.
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            backoff_coefficient: 1.5,
            maximum_interval: Duration::from_secs(5),
            maximum_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy that gives every step exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt may follow after `attempts_made` failures.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.maximum_attempts
    }

    /// Delay to sleep before the given 1-based attempt.
    ///
    /// Attempt 1 runs immediately; attempt 2 waits the initial interval;
    /// each later attempt grows by the backoff coefficient, capped at
    /// the maximum interval.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(2) as i32;
        let delay = self
            .initial_interval
            .mul_f64(self.backoff_coefficient.powi(exponent));
        delay.min(self.maximum_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_grows_from_initial_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_before_attempt(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before_attempt(3), Duration::from_millis(750));
    }

    #[test]
    fn delay_is_capped_at_maximum_interval() {
        let policy = RetryPolicy {
            maximum_attempts: 20,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_before_attempt(20), Duration::from_secs(5));
    }

    #[test]
    fn should_retry_honors_attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn no_retries_allows_a_single_attempt() {
        let policy = RetryPolicy::no_retries();
        assert!(!policy.should_retry(1));
    }
}
