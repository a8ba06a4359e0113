//! Core types and traits for dripfeed.
//!
//! This crate provides the data model shared by the enumeration engine and
//! its hosts: resumable directory cursors, traversal modes, configuration,
//! and the contracts with the destination that receives discovered files.

mod config;
mod cursor;
mod error;
mod mode;
mod sink;

pub use config::{DEFAULT_LIMIT, FeedConfig, FeedConfigBuilder, parse_leading_u64};
pub use cursor::{CursorId, CursorStack, DirCursor, DirIdentity, StreamPosition};
pub use error::{FeedError, FeedWarning, WarningKind, is_resource_exhaustion};
pub use mode::{FeedCommand, TraversalMode};
pub use sink::{ExclusionPredicate, ExtensionFilter, NotificationSink, Notification, Playlist, Sink};
