//! Common test utilities for channel-dl integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use channel_dl::config::{DownloadConfig, SessionConfig};
use channel_dl::{
    ChannelDownloader, Config, Credentials, DirectoryProvider, DiskSpaceConfig, RetryConfig,
    TargetSpec,
};
use tempfile::TempDir;

/// A mirror directory plus a download directory, both temporary
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::create_dir_all(root.path().join("mirror")).expect("Failed to create mirror");
        Self { root }
    }

    pub fn mirror(&self) -> PathBuf {
        self.root.path().join("mirror")
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.path().join("downloads")
    }

    /// Add a channel directory holding `files` (name, byte length)
    pub fn channel(&self, name: &str, files: &[(&str, usize)]) -> &Self {
        let dir = self.mirror().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create channel dir");
        for (filename, len) in files {
            std::fs::write(dir.join(filename), content(filename, *len))
                .expect("Failed to write mirror file");
        }
        self
    }

    pub fn config(&self) -> Config {
        Config {
            credentials: Credentials {
                phone: "+15550100".into(),
                api_id: 1,
                api_hash: "hash".into(),
            },
            targets: TargetSpec {
                target_channel_names: vec!["alpha".into()],
                filter_extensions: vec![".zip".into(), ".pdf".into()],
            },
            download: DownloadConfig {
                download_directory: self.downloads(),
                num_threads: 2,
            },
            session: SessionConfig {
                log_file: self.root.path().join("app.log"),
                ..Default::default()
            },
            retry: RetryConfig {
                initial_delay: Duration::from_millis(1),
                max_total_delay: Duration::from_millis(8),
                backoff_multiplier: 2.0,
            },
            disk_space: DiskSpaceConfig {
                enabled: false,
                ..Default::default()
            },
        }
    }

    pub async fn downloader(&self) -> ChannelDownloader {
        ChannelDownloader::new(self.config(), Arc::new(DirectoryProvider::new(self.mirror())))
            .await
            .expect("Failed to create downloader")
    }

    pub fn downloaded(&self, filename: &str) -> Option<Vec<u8>> {
        std::fs::read(self.downloads().join(filename)).ok()
    }

    pub fn downloaded_names(&self) -> Vec<String> {
        list_names(&self.downloads())
    }
}

/// Deterministic file body derived from its name
pub fn content(filename: &str, len: usize) -> Vec<u8> {
    filename.bytes().cycle().take(len).collect()
}

pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
