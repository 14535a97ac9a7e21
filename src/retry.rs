use std::time::Duration;

use crate::{AnalyticsError, ClientOptions, ErrorKind};

/// Decides whether a failed attempt is retried and how long to wait first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            multiplier,
        }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(
            options.max_retries,
            options.retry_delay_ms,
            options.retry_multiplier,
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Transient failures: no response at all, or status 408, 429 or 5xx.
    pub fn is_retryable(kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::Timeout | ErrorKind::NetworkUnavailable => true,
            ErrorKind::Http(status) => status == 408 || status == 429 || status >= 500,
            ErrorKind::Parse
            | ErrorKind::UnsupportedContent
            | ErrorKind::Cancelled
            | ErrorKind::Intercepted
            | ErrorKind::InvalidRequest
            | ErrorKind::Config
            | ErrorKind::Decode => false,
        }
    }

    /// Whether attempt number `attempt` (1-based) may be followed by another.
    pub fn should_retry(&self, err: &AnalyticsError, attempt: u32) -> bool {
        Self::is_retryable(err.kind()) && attempt <= self.max_retries
    }

    /// Delay after attempt number `attempt`: `base * multiplier^(attempt - 1)`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= u64::MAX as f64 {
            return Duration::from_millis(u64::MAX);
        }
        Duration::from_millis(delay_ms.max(0.0).round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&ClientOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;
    use crate::{AnalyticsError, ErrorKind};

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::new(3, 1_000, 2.0);
        assert_eq!(policy.next_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.next_delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.next_delay(3), Duration::from_millis(4_000));
    }

    #[test]
    fn fractional_multiplier_rounds() {
        let policy = RetryPolicy::new(3, 100, 1.5);
        assert_eq!(policy.next_delay(3), Duration::from_millis(225));
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = RetryPolicy::new(u32::MAX, 1_000, 2.0);
        assert_eq!(policy.next_delay(5_000), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(RetryPolicy::is_retryable(ErrorKind::Timeout));
        assert!(RetryPolicy::is_retryable(ErrorKind::NetworkUnavailable));
        for status in [408, 429, 500, 502, 503, 504, 599] {
            assert!(RetryPolicy::is_retryable(ErrorKind::Http(status)), "{status}");
        }
    }

    #[test]
    fn client_errors_and_terminal_kinds_are_not_retryable() {
        for status in [400, 401, 403, 404, 409, 422] {
            assert!(!RetryPolicy::is_retryable(ErrorKind::Http(status)), "{status}");
        }
        assert!(!RetryPolicy::is_retryable(ErrorKind::Parse));
        assert!(!RetryPolicy::is_retryable(ErrorKind::UnsupportedContent));
        assert!(!RetryPolicy::is_retryable(ErrorKind::Cancelled));
    }

    #[test]
    fn attempts_are_bounded_by_max_retries() {
        let policy = RetryPolicy::new(2, 10, 2.0);
        let err = AnalyticsError::Timeout { timeout_ms: 1 };
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
        assert!(!RetryPolicy::new(0, 10, 2.0).should_retry(&err, 1));
    }
}
