//! Bounded admission of download tasks.
//!
//! A channel's message stream is consumed lazily. Every admitted task runs as
//! its own tokio task, and at most `concurrency_limit` are pending at once.
//! When the pending set is full, the scheduler waits for the first completion
//! and then reaps every other task that has already finished before admitting
//! the next one.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures::TryStreamExt;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::error::{ProviderError, Result, TransferFailure};
use crate::provider::RemoteSession;
use crate::types::{ChannelSummary, Event, RemoteChannel, TaskOutcome};

use super::ChannelDownloader;
use super::download_task::{DownloadTask, DownloadTaskContext};

/// Pending set of download tasks for one channel
pub struct DownloadScheduler {
    limit: usize,
    pending: JoinSet<TaskOutcome>,
    summary: ChannelSummary,
}

impl DownloadScheduler {
    /// Create a scheduler admitting at most `limit` concurrent tasks (at least one)
    pub fn new(channel: impl Into<String>, limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            pending: JoinSet::new(),
            summary: ChannelSummary::new(channel),
        }
    }

    /// Number of admitted tasks that have not been reaped yet
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Wait until fewer than `limit` tasks are pending
    ///
    /// Waits for the first completion, then reaps every other task that has
    /// already finished.
    pub async fn make_room(&mut self) {
        if self.pending.len() < self.limit {
            return;
        }
        if let Some(joined) = self.pending.join_next().await {
            self.record(joined);
        }
        while let Some(joined) = self.pending.try_join_next() {
            self.record(joined);
        }
    }

    /// Spawn `task`, first waiting for room in the pending set
    pub async fn admit<F>(&mut self, task: F)
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        self.make_room().await;
        self.pending.spawn(task);
    }

    /// Count an attachment that was not admitted
    pub fn filtered_out(&mut self) {
        self.summary.filtered_out += 1;
    }

    /// Wait for every pending task and return the channel's counts
    pub async fn finish(mut self) -> ChannelSummary {
        while let Some(joined) = self.pending.join_next().await {
            self.record(joined);
        }
        self.summary
    }

    fn record(&mut self, joined: std::result::Result<TaskOutcome, JoinError>) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => {
                tracing::error!(error = %e, "Download task failed to complete");
                TaskOutcome::GaveUp(TransferFailure {
                    filename: String::new(),
                    path: PathBuf::new(),
                    reason: e.to_string(),
                })
            }
        };
        self.summary.record(outcome);
    }
}

impl ChannelDownloader {
    /// Download every matching attachment of `channel`
    ///
    /// Returns the channel's counts once all admitted tasks finished. Fails
    /// after draining when the message stream fails or a task saw the session
    /// expire.
    pub(crate) async fn download_channel(
        &self,
        session: &Arc<dyn RemoteSession>,
        channel: &RemoteChannel,
    ) -> Result<ChannelSummary> {
        let ctx = Arc::new(DownloadTaskContext {
            session: Arc::clone(session),
            channel: channel.name.clone(),
            download_dir: self.config.download_dir().clone(),
            retry: self.config.retry.clone(),
            disk_space: self.config.disk_space.clone(),
            event_tx: self.event_tx.clone(),
            cancel: self.cancel.clone(),
            path_locks: self.path_locks.clone(),
            session_expired: AtomicBool::new(false),
        });
        let mut scheduler =
            DownloadScheduler::new(&channel.name, self.config.concurrency_limit());
        let mut messages = session.messages(channel);

        let scan: std::result::Result<(), ProviderError> = loop {
            scheduler.make_room().await;
            if ctx.session_expired() {
                tracing::warn!(
                    channel = %channel.name,
                    "Session expired, no longer admitting tasks"
                );
                break Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(
                        channel = %channel.name,
                        "Shutdown requested, no longer admitting tasks"
                    );
                    break Ok(());
                }
                next = messages.try_next() => next,
            };
            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            let Some(attachment) = message.into_document() else {
                continue;
            };
            let Some(filename) = attachment.filename.as_deref() else {
                tracing::debug!(
                    message_id = attachment.message_id,
                    "Document without filename"
                );
                scheduler.filtered_out();
                continue;
            };
            if !self.filter.matches_attachment(filename) {
                tracing::debug!(filename, "Attachment does not match extension filter");
                scheduler.filtered_out();
                continue;
            }

            let task = match DownloadTask::new(attachment, self.config.download_dir()) {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!(channel = %channel.name, error = %e, "Skipping attachment");
                    scheduler.filtered_out();
                    continue;
                }
            };

            let span = tracing::info_span!(
                "download",
                channel = %channel.name,
                filename = %task.filename()
            );
            scheduler
                .admit(task.run(Arc::clone(&ctx)).instrument(span))
                .await;
        };
        drop(messages);

        let summary = scheduler.finish().await;
        tracing::info!(
            channel = %channel.name,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            gave_up = summary.gave_up,
            cancelled = summary.cancelled,
            filtered_out = summary.filtered_out,
            "Channel complete"
        );
        self.emit_event(Event::ChannelComplete {
            summary: summary.clone(),
        });

        if let Err(e) = scan {
            tracing::error!(channel = %channel.name, error = %e, "Failed to list messages");
            return Err(e.into());
        }
        if ctx.session_expired() {
            return Err(ProviderError::SessionExpired.into());
        }
        Ok(summary)
    }
}
