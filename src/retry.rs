//! Retry logic with exponential backoff
//!
//! [`BackoffSequence`] is an explicit iterator over retry delays that stops
//! once a cumulative delay budget would be exceeded. [`download_with_retry`]
//! drives an async operation with it, retrying only errors that classify as
//! transient through [`IsRetryable`].
//!
//! # Example
//!
//! ```no_run
//! use channel_dl::retry::{IsRetryable, download_with_retry};
//! use channel_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! download_with_retry(&config, &cancel, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ProviderError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (transfer errors, connection resets, local file races) should return `true`.
/// Permanent failures (authentication, cancellation, disk full, bad input) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Any failure while deleting a stale file or writing a fresh one
            Error::Io(_) => true,
            Error::Provider(e) => e.is_retryable(),
            // Need user action to free space
            Error::InsufficientSpace { .. } => false,
            // statvfs may fail transiently on network filesystems
            Error::DiskSpaceCheckFailed(_) => true,
            Error::Config { .. } => false,
            Error::Auth(_) => false,
            Error::SessionExpired { .. } => false,
            Error::InvalidAttachment(_) => false,
            Error::Cancelled => false,
            Error::Serialization(_) => false,
            Error::Other(_) => false,
        }
    }
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transfer(_) | ProviderError::Network(_) | ProviderError::Other(_) => {
                true
            }
            // Recovered by re-authentication at the pipeline level
            ProviderError::SessionExpired
            | ProviderError::PasswordRequired
            | ProviderError::Unauthorized
            | ProviderError::SignIn(_) => false,
        }
    }
}

/// Unbounded exponential delays: `initial`, `initial * m`, `initial * m^2`, ...
///
/// Pure and deterministic; the caller decides when to stop pulling values.
#[derive(Clone, Debug)]
pub struct ExponentialDelays {
    next: Duration,
    multiplier: f64,
}

impl ExponentialDelays {
    /// Start a new sequence at `initial`, growing by `multiplier` each step
    pub fn new(initial: Duration, multiplier: f64) -> Self {
        Self {
            next: initial,
            multiplier,
        }
    }
}

impl Iterator for ExponentialDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(Duration::MAX);
        Some(current)
    }
}

/// Retry delays bounded by a cumulative budget
///
/// Yields delays from [`ExponentialDelays`] until the next delay would push the
/// sum of all yielded delays past `max_total`, then returns `None` forever.
/// With the defaults (1 s doubling, 64 s budget) this yields
/// 1, 2, 4, 8, 16 and 32 seconds.
#[derive(Clone, Debug)]
pub struct BackoffSequence {
    initial: Duration,
    multiplier: f64,
    max_total: Duration,
    delays: ExponentialDelays,
    elapsed: Duration,
    attempts: u32,
}

impl BackoffSequence {
    /// Create a sequence with an explicit start, growth factor and budget
    pub fn new(initial: Duration, multiplier: f64, max_total: Duration) -> Self {
        Self {
            initial,
            multiplier,
            max_total,
            delays: ExponentialDelays::new(initial, multiplier),
            elapsed: Duration::ZERO,
            attempts: 0,
        }
    }

    /// Create a sequence from retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.initial_delay,
            config.backoff_multiplier,
            config.max_total_delay,
        )
    }

    /// Number of delays yielded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sum of the delays yielded so far
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Rewind to the first delay
    pub fn reset(&mut self) {
        *self = Self::new(self.initial, self.multiplier, self.max_total);
    }
}

impl Iterator for BackoffSequence {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let mut peek = self.delays.clone();
        let delay = peek.next()?;
        let total = self.elapsed.checked_add(delay)?;
        if total > self.max_total {
            return None;
        }
        self.delays = peek;
        self.elapsed = total;
        self.attempts += 1;
        Some(delay)
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (initial delay, multiplier, cumulative budget)
/// * `cancel` - Cancels the wait between attempts
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result, or the last error once the error is permanent,
/// the backoff budget is exhausted, or `cancel` fires during a wait.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = BackoffSequence::from_config(config);

    loop {
        match operation().await {
            Ok(result) => {
                if backoff.attempts() > 0 {
                    tracing::info!(
                        attempts = backoff.attempts() + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => {
                let Some(delay) = backoff.next() else {
                    tracing::error!(
                        error = %e,
                        attempts = backoff.attempts() + 1,
                        waited_ms = backoff.elapsed().as_millis(),
                        "Operation failed after retry budget exhausted"
                    );
                    return Err(e);
                };

                tracing::warn!(
                    error = %e,
                    attempt = backoff.attempts(),
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!("Retry wait interrupted by shutdown");
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Operation failed with non-retryable error"
                );
                return Err(e);
            }
        }
    }
}
