//! Bounded retry loop for compare-and-swap style operations.
//!
//! Each attempt re-reads whatever it needs and either finishes or asks for
//! another round after losing a precondition race. Transient store failures
//! are retried the same way. Nothing here backs off exponentially; a short
//! fixed pause keeps contended callers from hot-looping.

use std::future::Future;
use std::time::Duration;

/// Result of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// A conditional write lost a race; re-read and try again.
    Retry,
}

/// Errors the retry loop knows how to classify.
pub trait Retryable: Sized {
    fn is_transient(&self) -> bool;

    /// Error reported once every attempt has been used up.
    fn exhausted(operation: &'static str) -> Self;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, E>>,
    {
        for n in 1..=self.max_attempts {
            match attempt().await {
                Ok(Attempt::Done(value)) => return Ok(value),
                Ok(Attempt::Retry) => {
                    tracing::debug!(operation, attempt = n, "Precondition lost, retrying");
                }
                Err(e) if e.is_transient() && n < self.max_attempts => {
                    tracing::warn!(operation, attempt = n, error = %e, "Transient store error, retrying");
                }
                Err(e) => return Err(e),
            }

            if n < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        tracing::warn!(
            operation,
            attempts = self.max_attempts,
            "Giving up after repeated conflicts"
        );
        Err(E::exhausted(operation))
    }
}
