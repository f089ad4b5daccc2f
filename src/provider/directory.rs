//! Provider backed by a local mirror directory
//!
//! Layout: every sub-directory of the root is a channel named after the
//! directory, every regular file inside it is a message with a document
//! attachment. Entries are listed in name order. Nested directories show up as
//! messages without a document. Useful for archiving from an exported or
//! synced copy of a service, and for exercising the pipeline end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use super::{ProviderResult, RemoteProvider, RemoteSession};
use crate::config::Credentials;
use crate::error::ProviderError;
use crate::types::{
    AttachmentHandle, MessageMedia, RemoteAttachment, RemoteChannel, RemoteMessage,
};

/// [`RemoteProvider`] over a directory tree
#[derive(Clone, Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Serve channels from the sub-directories of `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl RemoteProvider for DirectoryProvider {
    async fn connect(&self, _credentials: &Credentials) -> ProviderResult<Arc<dyn RemoteSession>> {
        let meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| ProviderError::Network(format!("{}: {}", self.root.display(), e)))?;
        if !meta.is_dir() {
            return Err(ProviderError::Network(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(Arc::new(DirectorySession {
            root: self.root.clone(),
        }))
    }
}

/// Session over a mirror directory; always signed in
#[derive(Debug)]
pub struct DirectorySession {
    root: PathBuf,
}

/// Name-sorted entries of `dir`, with their file type
async fn sorted_entries(dir: &Path) -> std::io::Result<Vec<(String, std::fs::Metadata)>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 entry");
            continue;
        };
        entries.push((name, entry.metadata().await?));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Turn a one-shot listing into a stream of its items
fn listing_stream<'a, T, F>(listing: F) -> BoxStream<'a, ProviderResult<T>>
where
    T: Send + 'a,
    F: std::future::Future<Output = ProviderResult<Vec<T>>> + Send + 'a,
{
    stream::once(listing)
        .flat_map(|result| match result {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::iter(std::iter::once(Err(e))).right_stream(),
        })
        .boxed()
}

#[async_trait::async_trait]
impl RemoteSession for DirectorySession {
    async fn is_authorized(&self) -> ProviderResult<bool> {
        Ok(true)
    }

    async fn request_login_code(&self, _phone: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn sign_in_with_code(&self, _phone: &str, _code: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn sign_in_with_password(&self, _password: &str) -> ProviderResult<()> {
        Ok(())
    }

    fn conversations(&self) -> BoxStream<'_, ProviderResult<RemoteChannel>> {
        listing_stream(async move {
            let entries = sorted_entries(&self.root)
                .await
                .map_err(|e| ProviderError::Other(format!("{}: {}", self.root.display(), e)))?;
            Ok(entries
                .into_iter()
                .filter(|(_, meta)| meta.is_dir())
                .map(|(name, _)| RemoteChannel::new(name.clone(), name))
                .collect())
        })
    }

    fn messages<'a>(
        &'a self,
        channel: &'a RemoteChannel,
    ) -> BoxStream<'a, ProviderResult<RemoteMessage>> {
        listing_stream(async move {
            let dir = self.root.join(&channel.id.0);
            let entries = sorted_entries(&dir)
                .await
                .map_err(|e| ProviderError::Other(format!("{}: {}", dir.display(), e)))?;
            Ok(entries
                .into_iter()
                .enumerate()
                .map(|(index, (name, meta))| {
                    let id = index as i64 + 1;
                    let media = if meta.is_file() {
                        MessageMedia::Document(RemoteAttachment {
                            message_id: id,
                            handle: AttachmentHandle(dir.join(&name).to_string_lossy().into_owned()),
                            filename: Some(name),
                            size: meta.len(),
                        })
                    } else {
                        MessageMedia::Other
                    };
                    RemoteMessage {
                        id,
                        media: Some(media),
                    }
                })
                .collect())
        })
    }

    async fn transfer(
        &self,
        attachment: &RemoteAttachment,
        dir: &Path,
    ) -> ProviderResult<PathBuf> {
        let filename = attachment
            .filename
            .as_deref()
            .ok_or_else(|| ProviderError::Transfer("attachment has no filename".into()))?;
        let target = crate::utils::local_path_for(dir, filename)
            .map_err(|e| ProviderError::Transfer(e.to_string()))?;
        let source = PathBuf::from(&attachment.handle.0);

        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| ProviderError::Transfer(format!("{}: {}", source.display(), e)))?;
        Ok(target)
    }
}
