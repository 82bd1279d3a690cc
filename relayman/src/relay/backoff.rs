use std::time::Duration;

use crate::config;

/// Bounded retry schedule of one relay.
///
/// The delay before attempt `n + 1` is `backoff * multiplier^(n - 1)`, capped at
/// `max_backoff`. A multiplier of 1.0 gives the fixed delay used by default.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per run of the retry loop, the first one included
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub backoff: Duration,

    /// Growth factor of the delay between attempts
    pub multiplier: f64,

    /// Cap for the delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&config::Retry::default())
    }
}

impl From<&config::Retry> for RetryPolicy {
    fn from(cfg: &config::Retry) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.backoff),
            multiplier: cfg.backoff_multiplier.max(1.0),
            max_backoff: Duration::from_millis(cfg.max_backoff.max(cfg.backoff)),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            multiplier: 1.0,
            max_backoff: backoff,
        }
    }

    /// Delay to wait after the failed attempt `attempt` (1 based),
    /// `None` once the attempts are used up
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi(attempt as i32 - 1);
        let delay = self.backoff.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_backoff.as_secs_f64() {
            return Some(self.max_backoff);
        }
        Some(Duration::from_secs_f64(delay))
    }

    /// Upper bound of one run of the retry loop for a relay that never comes up
    pub fn worst_case(&self, grace_window: Duration) -> Duration {
        let attempts = self.max_attempts;
        let waits: Duration = (1..attempts).filter_map(|a| self.delay(a)).sum();
        grace_window * attempts + waits
    }
}
