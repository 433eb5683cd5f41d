use rand::Rng;
use std::time::Duration;

const MIN_BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_JITTER: Duration = Duration::from_secs(1);

/// Retry ceiling and delay bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Builds a config from float seconds; negative or non-finite values become zero.
    pub fn from_secs(max_retries: u32, base_delay_s: f64, max_delay_s: f64) -> Self {
        Self::new(max_retries, secs(base_delay_s), secs(max_delay_s))
    }

    /// Base delay raised to at least 100ms and max delay to at least the base.
    pub fn normalized(self) -> Self {
        let base_delay = self.base_delay.max(MIN_BASE_DELAY);
        Self {
            max_retries: self.max_retries,
            base_delay,
            max_delay: self.max_delay.max(base_delay),
        }
    }

    /// Exponential delay before jitter: `min(max_delay, base_delay * 2^attempt)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(i32::MAX as u32) as i32);
        let raw = self.base_delay.as_secs_f64() * factor;
        let capped = raw.min(self.max_delay.as_secs_f64());
        secs(capped)
    }

    /// Upper bound (exclusive) of the jitter added to `delay`.
    pub fn jitter_bound(delay: Duration) -> Duration {
        delay.mul_f64(0.1).min(MAX_JITTER)
    }

    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        let bound = Self::jitter_bound(delay).as_secs_f64();
        if bound <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..bound);
        delay + Duration::from_secs_f64(jitter)
    }

    /// Delay honoring a vendor "resets in N seconds" hint.
    pub fn hinted_delay(&self, reset_secs: u64) -> Duration {
        Duration::from_secs(reset_secs.saturating_add(1)).min(self.max_delay)
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
