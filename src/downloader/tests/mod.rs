//! Channel and run level tests for [`ChannelDownloader`].

use super::*;

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::Credentials;
use crate::downloader::test_helpers::{
    MockSession, StaticPrompt, create_test_downloader, create_test_downloader_with, document,
    wait_until,
};
use crate::error::ProviderError;
use crate::error::ToExitCode;
use crate::provider::RemoteSession;
use crate::types::{MessageMedia, RemoteChannel, RemoteMessage};


fn alpha() -> RemoteChannel {
    RemoteChannel::new("Team Alpha Chat", "Team Alpha Chat")
}

/// Owned `(filename, size)` pairs for `count` zip files
fn zip_files(count: usize, size: u64) -> Vec<(String, u64)> {
    (0..count).map(|i| (format!("file{i:02}.zip"), size)).collect()
}

fn borrowed(files: &[(String, u64)]) -> Vec<(&str, u64)> {
    files.iter().map(|(name, size)| (name.as_str(), *size)).collect()
}

async fn connect(provider: &dyn RemoteProvider) -> Arc<dyn RemoteSession> {
    provider.connect(&Credentials::default()).await.unwrap()
}

fn file_len(dir: &std::path::Path, name: &str) -> Option<u64> {
    std::fs::metadata(dir.join(name)).ok().map(|m| m.len())
}
