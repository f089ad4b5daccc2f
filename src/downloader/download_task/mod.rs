//! Download task execution -- one attachment to one local file.
//!
//! Split into focused submodules:
//! - [`context`] - State shared by every task of a channel
//! - [`orchestration`] - Dedup, transfer, retry and the terminal outcome

mod context;
mod orchestration;


pub(crate) use context::DownloadTaskContext;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result, TransferFailure};
use crate::types::RemoteAttachment;
use crate::utils::local_path_for;

/// A retryable unit of work: fetch one remote attachment into one local path
#[derive(Clone, Debug)]
pub(crate) struct DownloadTask {
    attachment: RemoteAttachment,
    filename: String,
    local_path: PathBuf,
}

impl DownloadTask {
    /// Bind `attachment` to its file inside `download_dir`
    ///
    /// Fails with [`Error::InvalidAttachment`] when the attachment has no
    /// filename or the filename has no usable final component.
    pub(crate) fn new(attachment: RemoteAttachment, download_dir: &Path) -> Result<Self> {
        let filename = attachment.filename.clone().ok_or_else(|| {
            Error::InvalidAttachment(format!(
                "message {} has no filename",
                attachment.message_id
            ))
        })?;
        let local_path = local_path_for(download_dir, &filename)?;

        Ok(Self {
            attachment,
            filename,
            local_path,
        })
    }

    /// Remote filename
    pub(crate) fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn failure(&self, reason: impl Into<String>) -> TransferFailure {
        TransferFailure {
            filename: self.filename.clone(),
            path: self.local_path.clone(),
            reason: reason.into(),
        }
    }
}
