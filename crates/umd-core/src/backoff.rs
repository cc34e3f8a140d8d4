//! Exponential backoff for rate-limited (HTTP 429) requests.
//!
//! The delay before retry `n` (0-based) is `base * 2^n`, capped at `max`,
//! plus uniform random jitter in `[0, jitter]`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use umd_core::backoff::BackoffConfig;
//!
//! let backoff = BackoffConfig::new(Duration::from_millis(100));
//! assert_eq!(backoff.base_delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.base_delay(3), Duration::from_millis(800));
//! ```

use std::time::Duration;

/// Backoff schedule used by fetchers between 429 retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,

    /// Upper bound for the exponential part of the delay.
    pub max: Duration,

    /// Maximum random jitter added on top of the delay (uniform [0, jitter]).
    ///
    /// Set to `Duration::ZERO` to disable.
    pub jitter: Duration,
}

impl BackoffConfig {
    /// Create a schedule starting at `base`, capped at 30 seconds, no jitter.
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max: Duration::from_secs(30),
            jitter: Duration::ZERO,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Add random jitter (uniform [0, jitter]) on top of the delay.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic part of the delay before retry `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Full delay before retry `attempt` (base delay + random jitter).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for BackoffConfig {
    /// 500ms base, 30s cap, 250ms jitter.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

// ---------------------------------------------------------------------------
// Jitter based on std, seeded from the clock. Uses a simple xorshift.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
