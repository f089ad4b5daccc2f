//! Core types for channel-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TransferFailure;

/// Provider-assigned identifier of a conversation
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A conversation visible to the signed-in account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChannel {
    /// Opaque identifier used to list the channel's messages
    pub id: ChannelId,
    /// Display name, matched against the configured fragments
    pub name: String,
}

impl RemoteChannel {
    /// Create a channel descriptor
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ChannelId(id.into()),
            name: name.into(),
        }
    }
}

/// Opaque provider handle used to transfer an attachment's bytes
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentHandle(pub String);

/// A document attached to a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    /// Message carrying the attachment
    pub message_id: i64,
    /// Remote filename, if the sender supplied one
    pub filename: Option<String>,
    /// Expected size in bytes
    pub size: u64,
    /// Provider handle for the transfer
    pub handle: AttachmentHandle,
}

/// Media carried by a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageMedia {
    /// A document (file) attachment
    Document(RemoteAttachment),
    /// Photos, stickers, polls and everything else that is not a document
    Other,
}

/// A message within a channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// Message id
    pub id: i64,
    /// Attached media, if any
    pub media: Option<MessageMedia>,
}

impl RemoteMessage {
    /// The document attachment, if this message carries one
    pub fn document(&self) -> Option<&RemoteAttachment> {
        match &self.media {
            Some(MessageMedia::Document(attachment)) => Some(attachment),
            _ => None,
        }
    }

    /// Consume the message, keeping only its document attachment
    pub fn into_document(self) -> Option<RemoteAttachment> {
        match self.media {
            Some(MessageMedia::Document(attachment)) => Some(attachment),
            _ => None,
        }
    }
}

/// Terminal outcome of one download task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The attachment was transferred
    Succeeded {
        /// Local path of the downloaded file
        path: PathBuf,
    },
    /// A complete copy was already present; nothing was transferred
    SkippedExisting,
    /// Retries were exhausted or the error was permanent
    GaveUp(TransferFailure),
    /// Shutdown was requested before the task finished
    Cancelled,
}

/// Per-channel counts of task outcomes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Channel display name
    pub channel: String,
    /// Attachments transferred
    pub succeeded: usize,
    /// Attachments already present and complete
    pub skipped: usize,
    /// Attachments abandoned after retries
    pub gave_up: usize,
    /// Attachments interrupted by shutdown
    pub cancelled: usize,
    /// Document attachments rejected by the extension filter or lacking a filename
    pub filtered_out: usize,
    /// Details for every abandoned attachment
    pub failures: Vec<TransferFailure>,
}

impl ChannelSummary {
    /// Empty summary for a channel
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Default::default()
        }
    }

    /// Count one terminal outcome
    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded { .. } => self.succeeded += 1,
            TaskOutcome::SkippedExisting => self.skipped += 1,
            TaskOutcome::GaveUp(failure) => {
                self.gave_up += 1;
                self.failures.push(failure);
            }
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Number of tasks that reached a terminal outcome
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.gave_up + self.cancelled
    }
}

/// Result of a whole run across all matching channels
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Per-channel results of the final (successful) pass
    pub channels: Vec<ChannelSummary>,
    /// Re-authentications performed after session expiry
    pub reauthentications: u32,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Attachments transferred across all channels
    pub fn succeeded(&self) -> usize {
        self.channels.iter().map(|c| c.succeeded).sum()
    }

    /// Attachments skipped across all channels
    pub fn skipped(&self) -> usize {
        self.channels.iter().map(|c| c.skipped).sum()
    }

    /// Attachments abandoned across all channels
    pub fn gave_up(&self) -> usize {
        self.channels.iter().map(|c| c.gave_up).sum()
    }

    /// Attachments interrupted by shutdown across all channels
    pub fn cancelled(&self) -> usize {
        self.channels.iter().map(|c| c.cancelled).sum()
    }
}

/// Event emitted by the downloader
///
/// Consumers subscribe via [`ChannelDownloader::subscribe`](crate::ChannelDownloader::subscribe).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Signed in and about to enumerate conversations
    Authenticated,

    /// A conversation matched the configured fragments
    ChannelMatched {
        /// Channel display name
        channel: String,
    },

    /// A transfer attempt is starting
    Downloading {
        /// Channel display name
        channel: String,
        /// Remote filename
        filename: String,
        /// 1-based attempt number
        attempt: u32,
    },

    /// A transfer finished
    Downloaded {
        /// Channel display name
        channel: String,
        /// Remote filename
        filename: String,
        /// Local path written
        path: PathBuf,
    },

    /// A complete local copy already existed
    Skipped {
        /// Channel display name
        channel: String,
        /// Remote filename
        filename: String,
    },

    /// The task stopped retrying
    GaveUp {
        /// Channel display name
        channel: String,
        /// Remote filename
        filename: String,
        /// Last error observed
        error: String,
    },

    /// Every admitted task for the channel reached a terminal outcome
    ChannelComplete {
        /// Counts for the channel
        summary: ChannelSummary,
    },

    /// The session expired and the pipeline restarts after signing in again
    SessionExpired {
        /// 1-based re-authentication attempt
        attempt: u32,
    },

    /// All matching channels were processed
    Complete,

    /// Shutdown was requested
    Shutdown,
}
