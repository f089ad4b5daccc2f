//! Download task orchestration -- top-level lifecycle for a single attachment.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::dedup::{self, DedupDecision};
use crate::error::{Error, ProviderError, Result};
use crate::retry::download_with_retry;
use crate::types::{Event, TaskOutcome};
use crate::utils::ensure_disk_space;

use super::DownloadTask;
use super::context::DownloadTaskContext;

impl DownloadTask {
    /// Drive the task to its terminal outcome
    ///
    /// Phases:
    /// 1. Take the lock for the local path
    /// 2. Run attempts under the backoff budget (dedup, disk space, transfer)
    /// 3. Map the result to an outcome, removing a mismatched leftover file
    ///    when the task did not succeed
    ///
    /// Never fails: errors are logged and reported through the outcome.
    pub(crate) async fn run(self, ctx: Arc<DownloadTaskContext>) -> TaskOutcome {
        match AssertUnwindSafe(self.execute(&ctx)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!("Download task panicked");
                self.give_up(&ctx, "download task panicked".to_string())
            }
        }
    }

    async fn execute(&self, ctx: &DownloadTaskContext) -> TaskOutcome {
        let _guard = ctx.path_locks.lock(&self.local_path).await;

        let mut attempt = 0u32;
        let result = download_with_retry(&ctx.retry, &ctx.cancel, move || {
            attempt += 1;
            self.attempt(ctx, attempt)
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) if matches!(e, Error::Cancelled) || ctx.cancel.is_cancelled() => {
                self.remove_partial().await;
                tracing::info!(error = %e, "Download cancelled");
                TaskOutcome::Cancelled
            }
            Err(e) => {
                if e.is_session_expired() {
                    ctx.mark_session_expired();
                }
                self.remove_partial().await;
                self.give_up(ctx, e.to_string())
            }
        }
    }

    /// One pass over dedup, disk space and transfer
    async fn attempt(&self, ctx: &DownloadTaskContext, attempt: u32) -> Result<TaskOutcome> {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if ctx.session_expired() {
            return Err(ProviderError::SessionExpired.into());
        }

        let expected = self.attachment.size;
        match dedup::decide(&self.local_path, expected).await? {
            DedupDecision::Skip => {
                tracing::info!(
                    size = expected,
                    "File already exists with matching size, skipping"
                );
                ctx.emit(Event::Skipped {
                    channel: ctx.channel.clone(),
                    filename: self.filename.clone(),
                });
                return Ok(TaskOutcome::SkippedExisting);
            }
            DedupDecision::Replace { local_size } => {
                tracing::warn!(
                    local_size,
                    expected_size = expected,
                    "File exists with a different size, deleting for redownload"
                );
                match tokio::fs::remove_file(&self.local_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            DedupDecision::Fresh => {}
        }

        ensure_disk_space(&ctx.download_dir, expected, &ctx.disk_space)?;

        tracing::info!(attempt, size = expected, "Starting download");
        ctx.emit(Event::Downloading {
            channel: ctx.channel.clone(),
            filename: self.filename.clone(),
            attempt,
        });

        let path = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            result = ctx.session.transfer(&self.attachment, &ctx.download_dir) => {
                result.map_err(transfer_error)?
            }
        };

        tracing::info!(path = %path.display(), "Downloaded");
        ctx.emit(Event::Downloaded {
            channel: ctx.channel.clone(),
            filename: self.filename.clone(),
            path: path.clone(),
        });
        Ok(TaskOutcome::Succeeded { path })
    }

    fn give_up(&self, ctx: &DownloadTaskContext, reason: String) -> TaskOutcome {
        tracing::error!(error = %reason, "Giving up on attachment");
        ctx.emit(Event::GaveUp {
            channel: ctx.channel.clone(),
            filename: self.filename.clone(),
            error: reason.clone(),
        });
        TaskOutcome::GaveUp(self.failure(reason))
    }

    /// Best-effort removal of a file left behind with the wrong size
    async fn remove_partial(&self) {
        match dedup::decide(&self.local_path, self.attachment.size).await {
            Ok(DedupDecision::Replace { local_size }) => {
                if let Err(e) = tokio::fs::remove_file(&self.local_path).await {
                    tracing::warn!(
                        path = %self.local_path.display(),
                        error = %e,
                        "Failed to remove incomplete file"
                    );
                } else {
                    tracing::debug!(local_size, "Removed incomplete file");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.local_path.display(),
                    error = %e,
                    "Failed to inspect file after unsuccessful download"
                );
            }
        }
    }
}

/// Every transfer failure is retried under the backoff budget, except session
/// expiry which is handled by re-authenticating the whole pass
fn transfer_error(e: ProviderError) -> Error {
    match e {
        ProviderError::SessionExpired
        | ProviderError::Transfer(_)
        | ProviderError::Network(_)
        | ProviderError::Other(_) => e.into(),
        ProviderError::Unauthorized
        | ProviderError::PasswordRequired
        | ProviderError::SignIn(_) => ProviderError::Transfer(e.to_string()).into(),
    }
}
