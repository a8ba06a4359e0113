//! Incremental directory enumeration engine for dripfeed.
//!
//! This crate walks directory trees a bounded number of files at a time and
//! remembers where it stopped, so that later refills continue instead of
//! starting over.
//!
//! # Overview
//!
//! - **Seekable streams** record the exact position inside each directory
//! - **Change detection** drops a saved position once the directory's
//!   modification time moves
//! - **Replace and append modes** decide whether exhausted roots wrap around
//!
//! # Example
//!
//! ```rust,no_run
//! use dripfeed_scan::{
//!     EnumerationEngine, Notification, Playlist, TraversalMode, TraversalOrchestrator,
//! };
//!
//! let mut orchestrator =
//!     TraversalOrchestrator::from_inputs(EnumerationEngine::default(), ["/srv/media"]);
//! let mut playlist = Playlist::new();
//! let mut notifications: Vec<Notification> = Vec::new();
//!
//! let report = orchestrator
//!     .refill(50, TraversalMode::Replace, &mut playlist, &mut notifications)
//!     .unwrap();
//! println!("Added {} files", report.total_added);
//!
//! // Later: the next 50 files, without repeating the first ones.
//! orchestrator
//!     .refill(50, TraversalMode::Append, &mut playlist, &mut notifications)
//!     .unwrap();
//! ```

mod engine;
mod orchestrator;
mod report;
mod stream;

pub use engine::{EnumerationEngine, Outcome, Pass};
pub use orchestrator::{RootEntry, TrackedRoot, TraversalOrchestrator};
pub use report::{RefillReport, RootReport};
pub use stream::{DirStream, DirentKind, RawEntry};

// Re-export core types for convenience
pub use dripfeed_core::{
    CursorId, CursorStack, DirCursor, ExclusionPredicate, ExtensionFilter, FeedCommand, FeedConfig,
    FeedError, FeedWarning, Notification, NotificationSink, Playlist, Sink, TraversalMode,
    WarningKind,
};
