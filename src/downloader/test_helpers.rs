//! Shared test helpers: a scriptable provider and downloader fixtures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tempfile::tempdir;
use tokio::sync::Semaphore;

use crate::auth::AuthPrompt;
use crate::config::{Config, Credentials, DiskSpaceConfig, RetryConfig, TargetSpec};
use crate::downloader::ChannelDownloader;
use crate::error::ProviderError;
use crate::provider::{ProviderResult, RemoteProvider, RemoteSession};
use crate::types::{
    AttachmentHandle, ChannelId, MessageMedia, RemoteAttachment, RemoteChannel, RemoteMessage,
};

/// Counters and scripted behavior shared by every session of a provider
#[derive(Default)]
pub(crate) struct MockState {
    transfers: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    code_requests: AtomicUsize,
    disconnects: AtomicUsize,
    /// Transfers that fail with SessionExpired before any other behavior applies
    expiring_transfers: AtomicU32,
    /// Errors returned by the next transfers of a filename, in order
    failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    /// When set, each transfer consumes one permit before writing
    gate: Option<Arc<Semaphore>>,
    /// Bytes written instead of the attachment size, per filename; also
    /// written before a scripted failure is returned
    short_writes: HashMap<String, u64>,
}

impl MockState {
    /// Transfers started so far
    pub(crate) fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    /// Transfers currently running
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of transfers that ran at once
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct AuthScript {
    code: String,
    password: Option<String>,
}

/// Builder for [`MockSession`] and [`MockProvider`]
#[derive(Default)]
pub(crate) struct MockSessionBuilder {
    channels: Vec<(RemoteChannel, Vec<RemoteMessage>)>,
    failing_listings: HashSet<ChannelId>,
    auth: Option<AuthScript>,
    state: MockState,
    expiring_sessions: u32,
}

impl MockSessionBuilder {
    /// Add a channel whose messages carry the given `(filename, size)` documents
    pub(crate) fn channel(mut self, name: &str, files: &[(&str, u64)]) -> Self {
        let messages = files
            .iter()
            .enumerate()
            .map(|(index, (filename, size))| document(index as i64 + 1, Some(filename), *size))
            .collect();
        self.channels.push((RemoteChannel::new(name, name), messages));
        self
    }

    /// Add a channel with explicit messages
    pub(crate) fn channel_messages(mut self, name: &str, messages: Vec<RemoteMessage>) -> Self {
        self.channels.push((RemoteChannel::new(name, name), messages));
        self
    }

    /// Add a channel whose listing fails after yielding the given documents
    pub(crate) fn failing_channel(self, name: &str, files: &[(&str, u64)]) -> Self {
        let mut builder = self.channel(name, files);
        builder.failing_listings.insert(ChannelId::from(name));
        builder
    }

    /// Start unauthorized; sign-in accepts `code` and then `password` if given
    pub(crate) fn unauthorized(mut self, code: &str, password: Option<&str>) -> Self {
        self.auth = Some(AuthScript {
            code: code.to_string(),
            password: password.map(str::to_string),
        });
        self
    }

    /// Fail the next transfers of `filename` with `errors`, in order
    pub(crate) fn fail_transfers(mut self, filename: &str, errors: Vec<ProviderError>) -> Self {
        self.state
            .failures
            .get_mut()
            .unwrap()
            .insert(filename.to_string(), errors.into());
        self
    }

    /// Hold every transfer until a permit is added to `gate`
    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.state.gate = Some(gate);
        self
    }

    /// Write only `bytes` bytes when transferring `filename`
    pub(crate) fn short_write(mut self, filename: &str, bytes: u64) -> Self {
        self.state.short_writes.insert(filename.to_string(), bytes);
        self
    }

    /// Fail the first `count` transfers with an expired session
    pub(crate) fn expire_transfers(self, count: u32) -> Self {
        self.state.expiring_transfers.store(count, Ordering::SeqCst);
        self
    }

    /// The first `count` sessions fail conversation listing with an expired session
    pub(crate) fn expire_sessions(mut self, count: u32) -> Self {
        self.expiring_sessions = count;
        self
    }

    pub(crate) fn build(self) -> MockSession {
        MockSession {
            channels: self.channels,
            failing_listings: self.failing_listings,
            authorized: Mutex::new(self.auth.is_none()),
            auth: self.auth,
            code_accepted: Mutex::new(false),
            expired: self.expiring_sessions > 0,
            state: Arc::new(self.state),
        }
    }

    pub(crate) fn provider(self) -> MockProvider {
        MockProvider {
            channels: self.channels,
            failing_listings: self.failing_listings,
            auth: self.auth,
            expiring_sessions: AtomicU32::new(self.expiring_sessions),
            connects: AtomicUsize::new(0),
            state: Arc::new(self.state),
        }
    }
}

/// A message carrying a document
pub(crate) fn document(id: i64, filename: Option<&str>, size: u64) -> RemoteMessage {
    RemoteMessage {
        id,
        media: Some(MessageMedia::Document(RemoteAttachment {
            message_id: id,
            filename: filename.map(str::to_string),
            size,
            handle: AttachmentHandle(format!("doc-{id}")),
        })),
    }
}

/// Provider handing out [`MockSession`]s that share one [`MockState`]
pub(crate) struct MockProvider {
    channels: Vec<(RemoteChannel, Vec<RemoteMessage>)>,
    failing_listings: HashSet<ChannelId>,
    auth: Option<AuthScript>,
    expiring_sessions: AtomicU32,
    connects: AtomicUsize,
    state: Arc<MockState>,
}

impl MockProvider {
    pub(crate) fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }

    /// Sessions opened so far
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteProvider for MockProvider {
    async fn connect(&self, _credentials: &Credentials) -> ProviderResult<Arc<dyn RemoteSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let expired = self
            .expiring_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(Arc::new(MockSession {
            channels: self.channels.clone(),
            failing_listings: self.failing_listings.clone(),
            authorized: Mutex::new(self.auth.is_none()),
            auth: self.auth.clone(),
            code_accepted: Mutex::new(false),
            expired,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Scriptable in-memory session
pub(crate) struct MockSession {
    channels: Vec<(RemoteChannel, Vec<RemoteMessage>)>,
    failing_listings: HashSet<ChannelId>,
    authorized: Mutex<bool>,
    auth: Option<AuthScript>,
    code_accepted: Mutex<bool>,
    expired: bool,
    state: Arc<MockState>,
}

impl MockSession {
    pub(crate) fn builder() -> MockSessionBuilder {
        MockSessionBuilder::default()
    }

    pub(crate) fn code_requests(&self) -> usize {
        self.state.code_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }

    async fn write_attachment(
        &self,
        attachment: &RemoteAttachment,
        dir: &Path,
    ) -> ProviderResult<PathBuf> {
        let filename = attachment.filename.clone().unwrap_or_default();

        let expire = self
            .state
            .expiring_transfers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if expire {
            return Err(ProviderError::SessionExpired);
        }

        if let Some(gate) = &self.state.gate {
            gate.acquire()
                .await
                .map_err(|_| ProviderError::Transfer("gate closed".into()))?
                .forget();
        }

        let scripted = self
            .state
            .failures
            .lock()
            .unwrap()
            .get_mut(&filename)
            .and_then(VecDeque::pop_front);
        let short = self.state.short_writes.get(&filename).copied();
        let path = dir.join(&filename);
        if let Some(err) = scripted {
            if let Some(len) = short {
                tokio::fs::write(&path, vec![0u8; len as usize])
                    .await
                    .map_err(|e| ProviderError::Transfer(e.to_string()))?;
            }
            return Err(err);
        }

        let len = short.unwrap_or(attachment.size);
        tokio::fs::write(&path, vec![0u8; len as usize])
            .await
            .map_err(|e| ProviderError::Transfer(e.to_string()))?;
        Ok(path)
    }
}

#[async_trait::async_trait]
impl RemoteSession for MockSession {
    async fn is_authorized(&self) -> ProviderResult<bool> {
        Ok(*self.authorized.lock().unwrap())
    }

    async fn request_login_code(&self, _phone: &str) -> ProviderResult<()> {
        self.state.code_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_in_with_code(&self, _phone: &str, code: &str) -> ProviderResult<()> {
        let Some(script) = &self.auth else {
            return Ok(());
        };
        if script.code != code {
            return Err(ProviderError::SignIn("invalid code".into()));
        }
        if script.password.is_some() {
            *self.code_accepted.lock().unwrap() = true;
            return Err(ProviderError::PasswordRequired);
        }
        *self.authorized.lock().unwrap() = true;
        Ok(())
    }

    async fn sign_in_with_password(&self, password: &str) -> ProviderResult<()> {
        let accepted = *self.code_accepted.lock().unwrap();
        match self.auth.as_ref().and_then(|s| s.password.as_deref()) {
            Some(expected) if accepted && expected == password => {
                *self.authorized.lock().unwrap() = true;
                Ok(())
            }
            _ => Err(ProviderError::SignIn("invalid password".into())),
        }
    }

    fn conversations(&self) -> BoxStream<'_, ProviderResult<RemoteChannel>> {
        if self.expired {
            return stream::iter(vec![Err(ProviderError::SessionExpired)]).boxed();
        }
        stream::iter(self.channels.iter().map(|(channel, _)| Ok(channel.clone()))).boxed()
    }

    fn messages<'a>(
        &'a self,
        channel: &'a RemoteChannel,
    ) -> BoxStream<'a, ProviderResult<RemoteMessage>> {
        let messages = self
            .channels
            .iter()
            .find(|(c, _)| c.id == channel.id)
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default();
        let tail = self
            .failing_listings
            .contains(&channel.id)
            .then(|| Err(ProviderError::Other("listing interrupted".into())));
        stream::iter(messages.into_iter().map(Ok).chain(tail)).boxed()
    }

    async fn transfer(
        &self,
        attachment: &RemoteAttachment,
        dir: &Path,
    ) -> ProviderResult<PathBuf> {
        self.state.transfers.fetch_add(1, Ordering::SeqCst);
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.state.in_flight);

        self.write_attachment(attachment, dir).await
    }

    async fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Prompt answering with fixed values, or failing when built with [`failing`](Self::failing)
pub(crate) struct StaticPrompt {
    code: Option<String>,
    password: Option<String>,
}

impl StaticPrompt {
    pub(crate) fn new(code: &str, password: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            password: Some(password.to_string()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            code: None,
            password: None,
        }
    }
}

fn closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no input")
}

#[async_trait::async_trait]
impl AuthPrompt for StaticPrompt {
    async fn login_code(&self) -> std::io::Result<String> {
        self.code.clone().ok_or_else(closed)
    }

    async fn password(&self) -> std::io::Result<String> {
        self.password.clone().ok_or_else(closed)
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Retry settings that exercise the full 1+2+...+32 schedule in milliseconds
pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(1),
        max_total_delay: Duration::from_millis(64),
        backoff_multiplier: 2.0,
    }
}

/// Config targeting channels containing "alpha" and `.zip`/`.pdf` files
pub(crate) fn test_config(download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.credentials.phone = "+15550000000".to_string();
    config.targets = TargetSpec {
        target_channel_names: vec!["alpha".to_string()],
        filter_extensions: vec![".zip".to_string(), ".pdf".to_string()],
    };
    config.download.download_directory = download_dir.to_path_buf();
    config.download.num_threads = 3;
    config.retry = fast_retry();
    config.disk_space = DiskSpaceConfig {
        enabled: false,
        min_free_space: 0,
    };
    config
}

/// Helper to create a test ChannelDownloader over `provider`.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    provider: Arc<MockProvider>,
) -> (ChannelDownloader, tempfile::TempDir) {
    create_test_downloader_with(provider, |_| {}).await
}

/// Like [`create_test_downloader`], adjusting the config first
pub(crate) async fn create_test_downloader_with(
    provider: Arc<MockProvider>,
    adjust: impl FnOnce(&mut Config),
) -> (ChannelDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(&temp_dir.path().join("downloads"));
    adjust(&mut config);

    let downloader = ChannelDownloader::new(config, provider)
        .await
        .unwrap()
        .with_prompt(Arc::new(StaticPrompt::failing()));
    (downloader, temp_dir)
}
