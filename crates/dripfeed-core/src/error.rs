//! Error and warning types for feeding operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a refill or a configuration step.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The process ran out of descriptors or memory while opening a directory.
    #[error("Resource exhausted while opening {path}: {source}")]
    ResourceExhausted {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A new cursor could not be allocated.
    #[error("Cannot allocate a cursor for {path}")]
    CursorAllocation { path: PathBuf },

    /// A cursor was pushed below a directory that is not the stack tip.
    #[error("Cursor for {parent} is not the active tip, cannot descend into {path}")]
    DetachedCursor { parent: PathBuf, path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("Invalid configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl FeedError {
    /// Create an I/O error with path context.
    ///
    /// Descriptor and memory exhaustion are reported as
    /// [`FeedError::ResourceExhausted`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if is_resource_exhaustion(&source) {
            Self::ResourceExhausted { path, source }
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether this error ends the current refill for every root.
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. } | Self::CursorAllocation { .. } | Self::DetachedCursor { .. }
        )
    }
}

/// Check whether an I/O error means the process is out of descriptors or memory.
pub fn is_resource_exhaustion(error: &std::io::Error) -> bool {
    if error.kind() == std::io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            error.raw_os_error(),
            Some(libc::EMFILE | libc::ENFILE | libc::ENOMEM)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Kind of feed warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Directory could not be opened.
    OpenFailed,
    /// Error reading metadata.
    MetadataError,
    /// Error reading the directory stream.
    ReadError,
    /// Directory is already being visited higher up the cursor chain.
    SymlinkLoop,
}

/// Non-fatal warning encountered during a refill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl FeedWarning {
    /// Create a new feed warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create an open failure warning.
    pub fn open_failed(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(path, format!("Cannot open directory: {error}"), WarningKind::OpenFailed)
    }

    /// Create a metadata error warning.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(path, format!("Cannot stat: {error}"), WarningKind::MetadataError)
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self::new(path, format!("Read error: {error}"), WarningKind::ReadError)
    }

    /// Create a symlink loop warning.
    pub fn symlink_loop(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Directory loop: {} is already being visited", path.display()),
            path,
            kind: WarningKind::SymlinkLoop,
        }
    }
}
