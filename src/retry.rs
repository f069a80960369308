// src/retry.rs
use crate::types::ReconMapError;
use std::future::Future;
use std::time::Duration;

/// Attempt budget and linear backoff (`base_delay * attempt`) for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Decide whether a failed attempt is followed by another one, and after how long.
    pub fn next_delay(&self, attempt: u32, error: &ReconMapError) -> Option<Duration> {
        if error.is_transient() && attempt < self.max_attempts {
            Some(self.delay_for(attempt))
        } else {
            None
        }
    }

    /// Run `operation` until it succeeds, fails hard, or the attempt budget runs out.
    ///
    /// `on_retry` is told about every retry before the backoff sleep.
    pub async fn run<T, F, Fut, R>(&self, mut operation: F, mut on_retry: R) -> Result<T, ReconMapError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ReconMapError>>,
        R: FnMut(u32, &ReconMapError, Duration),
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => match self.next_delay(attempt, &e) {
                    Some(delay) => {
                        on_retry(attempt, &e, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}
