//! Channel and attachment selection
//!
//! Channel names match when any configured fragment occurs in them, ignoring
//! case. Filenames match when they end with one of the configured suffixes,
//! respecting case.

use crate::config::TargetSpec;

/// Predicates over a [`TargetSpec`]
#[derive(Clone, Debug)]
pub struct ChannelFilter {
    fragments: Vec<String>,
    suffixes: Vec<String>,
}

impl ChannelFilter {
    /// Build a filter from the configured targets
    pub fn new(targets: &TargetSpec) -> Self {
        Self {
            fragments: targets
                .target_channel_names
                .iter()
                .map(|f| f.to_lowercase())
                .collect(),
            suffixes: targets.filter_extensions.clone(),
        }
    }

    /// True iff any fragment is a case-insensitive substring of `name`
    pub fn matches_channel(&self, name: &str) -> bool {
        matches_channel(name, &self.fragments)
    }

    /// True iff `filename` is non-empty and ends with one of the suffixes
    pub fn matches_attachment(&self, filename: &str) -> bool {
        matches_attachment(filename, &self.suffixes)
    }
}

/// True iff any of `fragments` is a case-insensitive substring of `name`
pub fn matches_channel<S: AsRef<str>>(name: &str, fragments: &[S]) -> bool {
    let name = name.to_lowercase();
    fragments
        .iter()
        .any(|fragment| name.contains(&fragment.as_ref().to_lowercase()))
}

/// True iff `filename` is non-empty and ends with one of `suffixes` (case-sensitive)
pub fn matches_attachment<S: AsRef<str>>(filename: &str, suffixes: &[S]) -> bool {
    !filename.is_empty()
        && suffixes
            .iter()
            .any(|suffix| filename.ends_with(suffix.as_ref()))
}
