//! # channel-dl
//!
//! Archives file attachments from messaging channels into a local directory.
//!
//! ## Design Philosophy
//!
//! channel-dl is designed to be:
//! - **Idempotent** - A file whose size matches the remote attachment is never fetched again
//! - **Bounded** - At most `num_threads` transfers run at once
//! - **Resilient** - Transient failures back off exponentially; expired sessions are
//!   re-authenticated a bounded number of times
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use channel_dl::{ChannelDownloader, Config, DirectoryProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(std::path::Path::new("config/config.toml"))?;
//!     let provider = Arc::new(DirectoryProvider::new("/srv/mirror"));
//!     let downloader = ChannelDownloader::new(config, provider).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = downloader.run().await?;
//!     println!("{} downloaded, {} skipped", summary.succeeded(), summary.skipped());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Interactive sign-in
pub mod auth;
/// Configuration types
pub mod config;
/// Size-based deduplication
pub mod dedup;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Channel and attachment selection
pub mod filter;
/// Remote content providers
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use auth::{AuthPrompt, StdinPrompt};
pub use config::{Config, Credentials, DiskSpaceConfig, RetryConfig, TargetSpec};
pub use dedup::DedupDecision;
pub use downloader::{ChannelDownloader, DownloadScheduler};
pub use error::{Error, ProviderError, Result, ToExitCode, TransferFailure};
pub use filter::ChannelFilter;
pub use provider::{DirectoryProvider, RemoteProvider, RemoteSession};
pub use retry::{BackoffSequence, IsRetryable};
pub use types::{
    ChannelSummary, Event, RemoteAttachment, RemoteChannel, RemoteMessage, RunSummary,
    TaskOutcome,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Runs [`ChannelDownloader::run`] and, if a termination signal arrives first,
/// calls the downloader's `shutdown()` method and waits for the run to drain.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use channel_dl::{ChannelDownloader, Config, DirectoryProvider, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::load(std::path::Path::new("config/config.toml"))?;
///     let downloader =
///         ChannelDownloader::new(config, Arc::new(DirectoryProvider::new("/srv/mirror"))).await?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(&downloader).await?;
///     println!("{} cancelled", summary.cancelled());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: &ChannelDownloader) -> Result<RunSummary> {
    let run = downloader.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = wait_for_signal() => {
            downloader.shutdown();
            run.await
        }
    }
}

/// Resolve on the first SIGTERM or SIGINT
///
/// A signal whose handler cannot be registered (restricted containers) is
/// ignored; with neither available, Ctrl+C is tried instead.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn register(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .map_err(|e| tracing::warn!(signal = name, error = %e, "Could not register handler"))
            .ok()
    }

    async fn received(signal: Option<Signal>) {
        match signal {
            Some(mut signal) => {
                signal.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let terminate = register(SignalKind::terminate(), "SIGTERM");
    let interrupt = register(SignalKind::interrupt(), "SIGINT");
    if terminate.is_none() && interrupt.is_none() {
        return ctrl_c_or_never().await;
    }

    tokio::select! {
        _ = received(terminate) => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
        _ = received(interrupt) => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
}

/// Resolve on Ctrl+C; never resolve when the handler cannot be installed
async fn ctrl_c_or_never() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl-c", "Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal, shutdown only on completion");
            std::future::pending::<()>().await;
        }
    }
}
