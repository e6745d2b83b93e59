use std::time::Duration;

/// Exponential backoff between step attempts
///
/// Attempt `n` (1-based) that failed waits `base * 2^(n-1)`, never more
/// than `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    pub fn delay_for(&self, base_ms: u64, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = Duration::from_millis(base_ms.saturating_mul(factor));
        delay.min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
