use std::time::Duration;

/// Exponential backoff for commands that hit a dropped connection or a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first try.
    pub attempts: usize,
    pub base: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry `retry` (1-indexed): `base`, `2 * base`, `4 * base`, ..
    /// capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        u32::try_from(retry - 1)
            .ok()
            .and_then(|exp| 2u32.checked_pow(exp))
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// `retries` is the number of retries already made.
    pub fn should_retry(&self, retries: usize) -> bool { retries < self.attempts }
}

/// Factor for the connection manager's reconnect backoff, which waits
/// `factor * 2^n` for n = 1, 2, .. so the first wait equals `base`.
pub fn reconnect_factor_ms(base: Duration) -> u64 {
    (u64::try_from(base.as_millis()).unwrap_or(u64::MAX) / 2).max(1)
}
