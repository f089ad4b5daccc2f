//! Configuration types for channel-dl
//!
//! Configuration is a flat TOML document. The provider credentials, the target
//! channel/extension sets and the download directory are required; everything
//! else has a default.
//!
//! ```toml
//! phone = "+15550100"
//! api_id = 12345
//! api_hash = "0123456789abcdef"
//! target_channel_names = ["alpha", "releases"]
//! download_directory = "downloads"
//! filter_extensions = [".zip", ".pdf"]
//! num_threads = 3
//!
//! [retry]
//! initial_delay = 1
//! max_total_delay = 64
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Keys that must be present in every configuration file
pub const REQUIRED_KEYS: [&str; 6] = [
    "phone",
    "api_id",
    "api_hash",
    "target_channel_names",
    "download_directory",
    "filter_extensions",
];

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Provider credentials, opaque to the download core
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Account phone number, also used as the session name
    pub phone: String,
    /// Provider application id
    pub api_id: i64,
    /// Provider application hash
    pub api_hash: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("phone", &self.phone)
            .field("api_id", &self.api_id)
            .field("api_hash", &"********")
            .finish()
    }
}

/// Which channels and attachments to archive
///
/// Channel fragments match case-insensitively anywhere in a conversation's
/// display name. Extensions are case-sensitive filename suffixes, so they must
/// be listed in every case that should match (e.g. `".zip"` and `".ZIP"`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Channel name fragments
    pub target_channel_names: Vec<String>,
    /// Filename suffixes
    pub filter_extensions: Vec<String>,
}

/// Download behavior configuration (directory, concurrency)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Flat directory receiving one file per attachment
    pub download_directory: PathBuf,

    /// Maximum concurrent transfers per channel (default: 3)
    #[serde(default = "default_num_threads", alias = "concurrency_limit")]
    pub num_threads: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_directory: default_download_dir(),
            num_threads: default_num_threads(),
        }
    }
}

/// Retry configuration for transient transfer failures
///
/// Delays start at `initial_delay` and are multiplied by `backoff_multiplier`
/// after every failure. A task gives up once the next delay would push the sum
/// of its waits past `max_total_delay`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Cumulative delay budget per task (default: 64 seconds)
    #[serde(default = "default_max_total_delay", with = "duration_serde")]
    pub max_total_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_total_delay: default_max_total_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking before each transfer (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space to keep after the transfer (default: 1 GB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
        }
    }
}

/// Session recovery and logging settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Full re-authentications allowed after a session expires mid-run (default: 2)
    #[serde(default = "default_max_reauth_attempts")]
    pub max_reauth_attempts: u32,

    /// Log file written next to console output (default: "app.log")
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reauth_attempts: default_max_reauth_attempts(),
            log_file: default_log_file(),
        }
    }
}

/// Main configuration for the channel downloader
///
/// Credential, target, download and session fields are flattened so the TOML
/// document stays flat; `retry` and `disk_space` are optional tables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider credentials
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Channel and attachment selection
    #[serde(flatten)]
    pub targets: TargetSpec,

    /// Download directory and concurrency
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Session recovery and logging
    #[serde(flatten)]
    pub session: SessionConfig,

    /// Per-task retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Free-space guard
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,
}

impl Config {
    /// Load and validate a configuration file
    ///
    /// Fails with [`Error::Config`] when the file cannot be read, is not valid
    /// TOML, or lacks any of [`REQUIRED_KEYS`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let table: toml::Table = raw.parse().map_err(|e: toml::de::Error| Error::Config {
            message: format!("invalid TOML: {}", e.message()),
            key: None,
        })?;

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| !table.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config {
                message: format!("missing configuration keys: {}", missing.join(", ")),
                key: missing.first().map(|k| k.to_string()),
            });
        }

        let config: Config =
            toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| Error::Config {
                    message: e.message().to_string(),
                    key: None,
                })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.download.num_threads == 0 {
            return Err(Error::config("must be at least 1", "num_threads"));
        }
        if self.download.download_directory.as_os_str().is_empty() {
            return Err(Error::config("must not be empty", "download_directory"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "must be a finite number >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.retry.initial_delay.is_zero() {
            return Err(Error::config("must be greater than zero", "retry.initial_delay"));
        }
        Ok(())
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_directory
    }

    /// Maximum concurrent transfers per channel
    pub fn concurrency_limit(&self) -> usize {
        self.download.num_threads
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_num_threads() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_total_delay() -> Duration {
    Duration::from_secs(64)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_min_free_space() -> u64 {
    1024 * 1024 * 1024 // 1 GB
}

fn default_max_reauth_attempts() -> u32 {
    2
}

fn default_log_file() -> PathBuf {
    PathBuf::from("app.log")
}

// Duration serialization helper (fractional seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Secs {
            Int(u64),
            Float(f64),
        }

        match Secs::deserialize(deserializer)? {
            Secs::Int(secs) => Ok(Duration::from_secs(secs)),
            Secs::Float(secs) => Duration::try_from_secs_f64(secs).map_err(D::Error::custom),
        }
    }
}
