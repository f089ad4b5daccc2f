//! Startup, re-authentication and shutdown coordination.

use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;

use crate::auth;
use crate::error::{Error, Result};
use crate::provider::RemoteSession;
use crate::types::{ChannelSummary, Event, RunSummary};

use super::ChannelDownloader;

impl ChannelDownloader {
    /// Download every matching attachment of every matching channel
    ///
    /// Each pass opens a fresh session, signs in and walks the channels from
    /// the top. When the session expires mid-pass the pass is abandoned and
    /// restarted, at most `max_reauth_attempts` times; files finished by an
    /// earlier pass are skipped by the size check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] once the re-authentication budget is
    /// spent, and any connection, sign-in or listing error as is. Failures of
    /// individual attachments are reported in the summary instead.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let max_reauth = self.config.session.max_reauth_attempts;
        let mut reauthentications = 0u32;

        loop {
            match self.run_pass().await {
                Ok(channels) => {
                    let summary = RunSummary {
                        channels,
                        reauthentications,
                        started_at,
                        finished_at: Utc::now(),
                    };
                    tracing::info!(
                        succeeded = summary.succeeded(),
                        skipped = summary.skipped(),
                        gave_up = summary.gave_up(),
                        cancelled = summary.cancelled(),
                        reauthentications,
                        "All channels processed"
                    );
                    self.emit_event(Event::Complete);
                    return Ok(summary);
                }
                Err(e) if e.is_session_expired() => {
                    if reauthentications >= max_reauth {
                        tracing::error!(
                            attempts = reauthentications,
                            "Session expired and re-authentication budget is exhausted"
                        );
                        return Err(Error::SessionExpired {
                            attempts: reauthentications,
                        });
                    }
                    if self.cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    reauthentications += 1;
                    tracing::warn!(
                        attempt = reauthentications,
                        max = max_reauth,
                        "Session expired, re-authenticating"
                    );
                    self.emit_event(Event::SessionExpired {
                        attempt: reauthentications,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One connect, sign-in and scan cycle; the session is always released
    async fn run_pass(&self) -> Result<Vec<ChannelSummary>> {
        let session = self.provider.connect(&self.config.credentials).await?;

        let result = async {
            auth::authenticate(
                session.as_ref(),
                &self.config.credentials.phone,
                self.prompt.as_ref(),
            )
            .await?;
            self.emit_event(Event::Authenticated);
            self.process_channels(&session).await
        }
        .await;

        session.disconnect().await;
        result
    }

    /// Walk the conversations and download from every matching channel
    async fn process_channels(
        &self,
        session: &Arc<dyn RemoteSession>,
    ) -> Result<Vec<ChannelSummary>> {
        let mut summaries = Vec::new();
        let mut conversations = session.conversations();

        while let Some(channel) = conversations.try_next().await? {
            if self.cancel.is_cancelled() {
                tracing::info!("Shutdown requested, not scanning further channels");
                break;
            }
            if !self.filter.matches_channel(&channel.name) {
                tracing::debug!(channel = %channel.name, "Channel does not match");
                continue;
            }

            tracing::info!(channel = %channel.name, "Found channel");
            self.emit_event(Event::ChannelMatched {
                channel: channel.name.clone(),
            });
            summaries.push(self.download_channel(session, &channel).await?);
        }

        Ok(summaries)
    }

    /// Request a graceful shutdown
    ///
    /// Stops admitting new tasks, interrupts in-flight transfers and backoff
    /// waits, and lets [`run`](Self::run) return with the interrupted tasks
    /// counted as cancelled.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!("Initiating graceful shutdown");
        self.cancel.cancel();
        self.emit_event(Event::Shutdown);
    }
}
