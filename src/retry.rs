use std::time::Duration;

/// Retry schedule for webhook delivery.
///
/// A logical delivery makes `retries + 1` attempts in total. After failed
/// attempt `n` (zero-based) the executor waits `base_delay_ms * (n + 1)`
/// before the next attempt: linear backoff with no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay_ms: u64) -> Self {
        Self {
            retries,
            base_delay_ms,
        }
    }

    /// Number of retries after the first attempt.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Total attempts for one logical delivery.
    pub fn total_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay before the next attempt, given the zero-based index of the
    /// attempt that just failed. `None` once the retry budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.retries {
            return None;
        }
        let delay_ms = self.base_delay_ms.saturating_mul(u64::from(attempt) + 1);
        Some(Duration::from_millis(delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_attempts_is_retries_plus_one() {
        assert_eq!(RetryPolicy::new(0, 1000).total_attempts(), 1);
        assert_eq!(RetryPolicy::new(3, 1000).total_attempts(), 4);
    }

    #[test]
    fn test_linear_backoff_schedule() {
        let policy = RetryPolicy::new(3, 100);

        assert_eq!(policy.delay_after(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(300)));
        // Budget spent after the last retry
        assert_eq!(policy.delay_after(3), None);
        assert_eq!(policy.delay_after(4), None);
    }

    #[test]
    fn test_zero_retries_never_delays() {
        let policy = RetryPolicy::new(0, 1000);
        assert_eq!(policy.delay_after(0), None);
    }

    #[test]
    fn test_overflow_protection() {
        let policy = RetryPolicy::new(u32::MAX, u64::MAX);
        // Must not panic on multiplication
        assert_eq!(
            policy.delay_after(1_000_000),
            Some(Duration::from_millis(u64::MAX))
        );
    }
}
