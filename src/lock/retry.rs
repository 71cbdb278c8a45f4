//! Lock retry policy

use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::Result;

/// Doubling backoff bounded by an overall timeout
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.lock_timeout(),
            initial_backoff: Duration::from_millis(config.lock_retry_initial_ms.max(1)),
            max_backoff: Duration::from_millis(
                config.lock_retry_max_ms.max(config.lock_retry_initial_ms).max(1),
            ),
        }
    }

    /// Call `attempt` until it yields a value or the timeout passes.
    ///
    /// Always attempts at least once. `Ok(None)` means timed out; errors from
    /// `attempt` stop the loop immediately.
    pub fn run<T>(&self, mut attempt: impl FnMut() -> Result<Option<T>>) -> Result<Option<T>> {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = self.initial_backoff;

        loop {
            if let Some(value) = attempt()? {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
