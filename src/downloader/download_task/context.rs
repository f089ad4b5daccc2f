//! Download task context -- state shared by every task of one channel.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::config::{DiskSpaceConfig, RetryConfig};
use crate::downloader::path_locks::PathLocks;
use crate::provider::RemoteSession;
use crate::types::Event;

/// Shared context for the download tasks of a channel, reducing parameter passing between helpers.
pub(crate) struct DownloadTaskContext {
    pub(crate) session: Arc<dyn RemoteSession>,
    /// Channel display name, for events
    pub(crate) channel: String,
    pub(crate) download_dir: PathBuf,
    pub(crate) retry: RetryConfig,
    pub(crate) disk_space: DiskSpaceConfig,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
    pub(crate) path_locks: PathLocks,
    /// Set by the first task that sees the session expire
    pub(crate) session_expired: AtomicBool,
}

impl DownloadTaskContext {
    /// Emit an event, ignoring the absence of subscribers
    pub(super) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn mark_session_expired(&self) {
        self.session_expired.store(true, Ordering::SeqCst);
    }

    /// Whether any task of this channel saw the session expire
    pub(crate) fn session_expired(&self) -> bool {
        self.session_expired.load(Ordering::SeqCst)
    }
}
