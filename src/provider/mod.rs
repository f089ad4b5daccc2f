//! Remote content provider capability
//!
//! The downloader never speaks a messaging protocol itself. A [`RemoteProvider`]
//! opens a [`RemoteSession`], and the session exposes sign-in, lazy listing of
//! conversations and messages, and the transfer of a single attachment.
//! Sessions are owned explicitly: one per pipeline pass, re-created after
//! expiry and disconnected when the run ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::BoxStream;

use crate::config::Credentials;
use crate::error::ProviderError;
use crate::types::{RemoteAttachment, RemoteChannel, RemoteMessage};

pub mod directory;

pub use directory::DirectoryProvider;

/// Result type for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Opens sessions against a remote messaging service
#[async_trait::async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Establish a new session with the given credentials
    async fn connect(&self, credentials: &Credentials) -> ProviderResult<Arc<dyn RemoteSession>>;
}

/// An established session with the remote service
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Whether the session is already signed in
    async fn is_authorized(&self) -> ProviderResult<bool>;

    /// Ask the service to send a login code to `phone`
    async fn request_login_code(&self, phone: &str) -> ProviderResult<()>;

    /// Sign in with the received login code
    ///
    /// Returns [`ProviderError::PasswordRequired`] when the account also needs
    /// its two-step verification password.
    async fn sign_in_with_code(&self, phone: &str, code: &str) -> ProviderResult<()>;

    /// Complete sign-in with the two-step verification password
    async fn sign_in_with_password(&self, password: &str) -> ProviderResult<()>;

    /// Lazily enumerate the account's conversations
    fn conversations(&self) -> BoxStream<'_, ProviderResult<RemoteChannel>>;

    /// Lazily enumerate messages of one conversation
    fn messages<'a>(
        &'a self,
        channel: &'a RemoteChannel,
    ) -> BoxStream<'a, ProviderResult<RemoteMessage>>;

    /// Write the attachment's bytes into `dir` and return the written path
    async fn transfer(&self, attachment: &RemoteAttachment, dir: &Path)
    -> ProviderResult<PathBuf>;

    /// Release the session
    async fn disconnect(&self) {}
}
