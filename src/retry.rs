//! Retry logic with exponential backoff
//!
//! Every HTTP call made by the pipeline goes through [`with_retry`]. Failures
//! classified as retryable (non-success status, transport error, timeout, empty
//! body) are retried with exponentially growing delays until the configured
//! attempt ceiling is reached; the last error is then returned once.
//!
//! # Example
//!
//! ```no_run
//! use sidra_fetch::config::RetryConfig;
//! use sidra_fetch::error::Error;
//! use sidra_fetch::retry::with_retry;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let body = with_retry(&config, || async {
//!     Ok::<_, Error>(b"[]".to_vec())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Any transport failure except a malformed request
            Error::Network(e) => !e.is_builder(),
            // Every non-success status is retried, including 4xx: the values
            // service answers overload with a variety of codes
            Error::HttpStatus { .. } => true,
            Error::EmptyBody { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Write { .. } => false,
            Error::Serialization(_) => false,
            Error::Config { .. } => false,
            Error::InvalidMetadata(_) => false,
            Error::NotFound(_) => false,
            Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs at most `config.max_attempts` times (a value of 0 is
/// treated as 1). Between attempts the task sleeps for the current delay, which
/// starts at `initial_delay` and is multiplied by `backoff_multiplier` after
/// every failure, capped at `max_delay`. With `jitter` on, each wait is the
/// delay stretched by up to 100%, still capped at `max_delay` and never shorter
/// than the previous wait.
///
/// Returns the first success, the first non-retryable error, or the last
/// retryable error once attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay;
    let mut last_wait = Duration::ZERO;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let wait = if config.jitter {
                    add_jitter(delay).min(config.max_delay).max(last_wait)
                } else {
                    delay
                };
                last_wait = wait;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
