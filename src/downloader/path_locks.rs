//! Per-path mutual exclusion.
//!
//! Two attachments with the same filename map to the same local file. Their
//! tasks take the path's lock for their whole run so that one never deletes or
//! rewrites the file while the other is checking or writing it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of async locks keyed by local path
#[derive(Clone, Default)]
pub(crate) struct PathLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl PathLocks {
    /// Wait for exclusive access to `path`; released when the guard drops
    pub(crate) async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
