//! Error types for channel-dl
//!
//! This module provides error handling for the library, including:
//! - The top-level [`Error`] used by the downloader and configuration layers
//! - [`ProviderError`] for failures reported by a remote content provider
//! - Process exit code mapping for the `channel-dl` binary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for channel-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-dl
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_directory")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote provider error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Sign-in failed (wrong code, wrong password, prompt unavailable)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The session kept expiring after every allowed re-authentication
    #[error("session expired after {attempts} re-authentication attempt(s)")]
    SessionExpired {
        /// Number of re-authentications performed before giving up
        attempts: u32,
    },

    /// Attachment cannot be mapped to a local file
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the transfer (including the free-space floor)
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Shutdown was requested while the operation was in progress
    #[error("operation cancelled by shutdown")]
    Cancelled,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors reported by a [`RemoteSession`](crate::provider::RemoteSession)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The session was invalidated by the remote service
    #[error("session expired")]
    SessionExpired,

    /// Sign-in requires the account's second-factor password
    #[error("two-step verification password required")]
    PasswordRequired,

    /// The session is not signed in
    #[error("not authorized")]
    Unauthorized,

    /// Sign-in rejected (bad code, bad password)
    #[error("sign-in rejected: {0}")]
    SignIn(String),

    /// Transferring an attachment's bytes failed
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Other provider failure
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error means the remote session is no longer usable
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Provider(ProviderError::SessionExpired))
    }
}

/// Maps an error to the exit code of the `channel-dl` process
pub trait ToExitCode {
    /// Process exit code for this error
    fn exit_code(&self) -> i32;
}

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            // Startup failures, reported before any provider activity
            Error::Config { .. } => 1,
            // Sign-in and unrecoverable session failures
            Error::Auth(_) | Error::SessionExpired { .. } => 2,
            Error::Provider(ProviderError::PasswordRequired)
            | Error::Provider(ProviderError::Unauthorized)
            | Error::Provider(ProviderError::SignIn(_))
            | Error::Provider(ProviderError::SessionExpired) => 2,
            Error::Cancelled => 130,
            _ => 3,
        }
    }
}

/// Context for an attachment whose transfer could not be completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    /// Remote filename
    pub filename: String,
    /// Where the file was being written
    pub path: PathBuf,
    /// Last error observed
    pub reason: String,
}

impl std::fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.filename,
            self.path.display(),
            self.reason
        )
    }
}
