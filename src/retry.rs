//! Bounded retry with a fixed backoff.

use std::{fmt::Display, future::Future, time::Duration};

use log::info;

use crate::config::ServerCfg;

/// Runs an operation up to `max_attempts` times, sleeping `backoff` between
/// failed attempts. Never retries indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Startup policy for the lighting server.
    pub fn from_cfg(cfg: &ServerCfg) -> Self {
        Self::new(
            cfg.startup_attempts,
            Duration::from_millis(cfg.startup_backoff_ms),
        )
    }

    /// Calls `op` with the 1-based attempt number until it succeeds or the
    /// attempts are used up, in which case the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{label} succeeded after {attempt} attempts");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max => return Err(e),
                Err(e) => {
                    info!("Waiting for {label} (attempt {attempt}/{max}): {e}");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_cfg(&ServerCfg::default())
    }
}
