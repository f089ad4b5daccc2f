//! Size-based deduplication against the download directory
//!
//! A local file is a complete copy of a remote attachment when its size equals
//! the attachment's expected size. No checksums or sidecar metadata are kept.

use std::io;
use std::path::Path;

/// What a download task should do with the local path
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupDecision {
    /// A complete copy exists
    Skip,
    /// A file with the wrong size exists and must be deleted first
    Replace {
        /// Size currently on disk
        local_size: u64,
    },
    /// Nothing exists at the path
    Fresh,
}

/// Decide whether to skip, replace or freshly download `local_path`
///
/// Performs a single metadata lookup. Does not delete or write anything.
pub async fn decide(local_path: &Path, expected_size: u64) -> io::Result<DedupDecision> {
    match tokio::fs::metadata(local_path).await {
        Ok(meta) if meta.len() == expected_size => Ok(DedupDecision::Skip),
        Ok(meta) => Ok(DedupDecision::Replace {
            local_size: meta.len(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DedupDecision::Fresh),
        Err(e) => Err(e),
    }
}
