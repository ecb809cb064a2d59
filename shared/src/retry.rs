//! Bounded retry with a per-attempt recovery step.

use std::future::Future;

use tracing::warn;

use crate::Error;

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T, I> {
    Succeeded { value: T, input: I, attempts: u32 },
    /// Every attempt failed; callers substitute their fallback
    Exhausted { input: I, last_error: Error, attempts: u32 },
    Aborted { input: I, error: Error, attempts: u32 },
}

/// Retry budget: one initial attempt plus `max_retries` more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// budget runs out.
    ///
    /// `recover` runs only when another attempt will follow and produces the
    /// input for it (e.g. a fresh identity after a collision).
    pub async fn run<I, T, Op, Fut, Retryable, Rec>(
        &self,
        mut input: I,
        mut op: Op,
        is_retryable: Retryable,
        mut recover: Rec,
    ) -> RetryOutcome<T, I>
    where
        I: Clone,
        Op: FnMut(I) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
        Retryable: Fn(&Error) -> bool,
        Rec: FnMut(&Error, I) -> I,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match op(input.clone()).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        input,
                        attempts: attempt,
                    }
                }
                Err(e) => e,
            };

            warn!("Attempt {} of {} failed: {}", attempt, self.max_attempts(), error);

            if !is_retryable(&error) {
                return RetryOutcome::Aborted {
                    input,
                    error,
                    attempts: attempt,
                };
            }
            if attempt >= self.max_attempts() {
                return RetryOutcome::Exhausted {
                    input,
                    last_error: error,
                    attempts: attempt,
                };
            }
            input = recover(&error, input);
        }
    }
}
