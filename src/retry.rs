//! Retry with exponential backoff
//!
//! Every Firestore call the repositories make goes through a [`RetryPolicy`]:
//! at most three attempts, waiting `2^attempt * 500ms` after each failed
//! attempt except the last.

use crate::error::FirebaseError;
use std::future::Future;
use std::time::Duration;

/// Which failures get another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    /// Only errors where [`FirebaseError::is_retryable`] is true
    #[default]
    RetryableOnly,
    /// Every error, including permission-denied and not-found
    All,
}

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    mode: RetryMode,
}

impl RetryPolicy {
    /// Default number of attempts
    pub const MAX_RETRIES: u32 = 3;

    /// Default backoff unit
    pub const BASE_DELAY: Duration = Duration::from_millis(500);

    /// Create a policy; `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32, base_delay: Duration, mode: RetryMode) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            mode,
        }
    }

    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, RetryMode::RetryableOnly)
    }

    /// Same policy with a different mode
    pub fn with_mode(mut self, mode: RetryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Retry mode
    pub fn mode(&self) -> RetryMode {
        self.mode
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1_u32 << attempt.min(20);
        self.base_delay.saturating_mul(multiplier)
    }

    /// Whether `err` qualifies for another attempt under this mode
    pub fn should_retry(&self, err: &FirebaseError) -> bool {
        match self.mode {
            RetryMode::All => true,
            RetryMode::RetryableOnly => err.is_retryable(),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are exhausted; the last error is returned.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, FirebaseError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FirebaseError>>,
    {
        let mut attempt = 1;
        loop {
            tracing::debug!(operation, attempt, "attempting");
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                tracing::error!(operation, attempt, code = %err.code(), "giving up: {}", err);
                return Err(err);
            }
            if !self.should_retry(&err) {
                tracing::warn!(operation, attempt, code = %err.code(), "not retrying: {}", err);
                return Err(err);
            }

            let delay = self.delay_after_attempt(attempt);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                code = %err.code(),
                "attempt failed, retrying: {}",
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::MAX_RETRIES, Self::BASE_DELAY, RetryMode::RetryableOnly)
    }
}
