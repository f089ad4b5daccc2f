//! Core downloader implementation split into focused submodules.
//!
//! The [`ChannelDownloader`] struct and its methods are organized by domain:
//! - [`lifecycle`] - Sign-in, channel enumeration, re-authentication and shutdown
//! - [`scheduler`] - Bounded admission of download tasks per channel
//! - [`download_task`] - Dedup, transfer and retry of a single attachment
//! - [`path_locks`] - Mutual exclusion per local path

mod download_task;
mod lifecycle;
mod path_locks;
mod scheduler;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use scheduler::DownloadScheduler;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthPrompt, StdinPrompt};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::ChannelFilter;
use crate::provider::RemoteProvider;
use crate::types::Event;

use path_locks::PathLocks;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChannelDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Opens a fresh session for every pipeline pass
    pub(crate) provider: Arc<dyn RemoteProvider>,
    /// Source of login codes when a session is not yet signed in
    pub(crate) prompt: Arc<dyn AuthPrompt>,
    /// Channel and attachment selection built from the configured targets
    pub(crate) filter: ChannelFilter,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Cancelled once shutdown is requested
    pub(crate) cancel: CancellationToken,
    /// Serializes tasks writing the same local file
    pub(crate) path_locks: PathLocks,
}

impl ChannelDownloader {
    /// Create a new ChannelDownloader instance
    ///
    /// Creates the download directory if it does not exist yet. Login codes
    /// are read from stdin unless another prompt is installed with
    /// [`with_prompt`](Self::with_prompt).
    pub async fn new(config: Config, provider: Arc<dyn RemoteProvider>) -> Result<Self> {
        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        Ok(Self {
            filter: ChannelFilter::new(&config.targets),
            config: Arc::new(config),
            provider,
            prompt: Arc::new(StdinPrompt),
            event_tx,
            cancel: CancellationToken::new(),
            path_locks: PathLocks::default(),
        })
    }

    /// Replace the prompt used for interactive sign-in
    pub fn with_prompt(mut self, prompt: Arc<dyn AuthPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Token that is cancelled when shutdown is requested
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
