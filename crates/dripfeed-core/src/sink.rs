//! Contracts with the destination, the notifier and the file filter.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mode::TraversalMode;

/// Destination receiving discovered files.
///
/// Emission is best-effort: a destination that rejects a path must swallow
/// the failure rather than interrupt the traversal.
pub trait Sink {
    /// Receive one discovered file.
    fn emit(&mut self, path: &Path);

    /// Drop everything previously emitted.
    fn clear(&mut self) {}
}

/// Receiver of the per-refill summary.
pub trait NotificationSink {
    /// Called once per refill with the number of files added across all roots.
    fn notify(&mut self, total_added: u64, mode: TraversalMode);
}

impl<F> NotificationSink for F
where
    F: FnMut(u64, TraversalMode),
{
    fn notify(&mut self, total_added: u64, mode: TraversalMode) {
        self(total_added, mode)
    }
}

impl NotificationSink for Vec<Notification> {
    fn notify(&mut self, total_added: u64, mode: TraversalMode) {
        self.push(Notification::new(total_added, mode));
    }
}

/// Decides which regular files are never emitted.
pub trait ExclusionPredicate {
    /// Whether the file named `file_name` must be skipped.
    fn is_excluded(&self, file_name: &Path) -> bool;
}

/// Case-insensitive extension denylist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: HashSet<String>,
}

impl ExtensionFilter {
    /// Build a filter from extensions, with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Whether no extension is excluded.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl ExclusionPredicate for ExtensionFilter {
    fn is_excluded(&self, file_name: &Path) -> bool {
        if self.extensions.is_empty() {
            return false;
        }
        file_name
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

/// Lowercase an extension and strip its leading dots.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// In-memory ordered destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    entries: Vec<PathBuf>,
}

impl Playlist {
    /// Create an empty playlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in emission order.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the playlist is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Sink for Playlist {
    fn emit(&mut self, path: &Path) {
        self.entries.push(path.to_path_buf());
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// User-facing summary of one refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Files added across all roots.
    pub total_added: u64,
    /// Mode of the refill.
    pub mode: TraversalMode,
}

impl Notification {
    /// How long the host should keep the message on screen.
    pub const DISPLAY_DURATION: Duration = Duration::from_millis(5000);

    /// Create a notification.
    pub fn new(total_added: u64, mode: TraversalMode) -> Self {
        Self { total_added, mode }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            TraversalMode::Replace => write!(f, "Replaced playlist with {} files.", self.total_added),
            TraversalMode::Append => write!(f, "Appended {} files to playlist.", self.total_added),
        }
    }
}
