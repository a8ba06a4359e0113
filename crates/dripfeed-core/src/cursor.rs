//! Resumable per-directory cursors and the chain that links them.
//!
//! A [`CursorStack`] holds the path from one tracked root down to the
//! directory currently being read. Cursors are addressed by [`CursorId`],
//! which is simply their depth below the root, so the chain is always a
//! contiguous run of owned cursors: descending pushes onto the tip,
//! ascending pops it, and nothing can point at a cursor that was dropped.

use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FeedError;

/// Handle of a cursor within its [`CursorStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CursorId(usize);

impl CursorId {
    /// The root cursor of every stack.
    pub const ROOT: CursorId = CursorId(0);

    /// Depth below the root (0 for the root itself).
    pub fn depth(self) -> usize {
        self.0
    }

    /// Whether this handle designates the root cursor.
    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

/// Opaque position inside a directory stream.
///
/// Only meaningful for the directory it was taken from, and only while that
/// directory is unchanged. [`StreamPosition::START`] means "read from the
/// beginning".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition(i64);

impl StreamPosition {
    /// Beginning of the stream.
    pub const START: StreamPosition = StreamPosition(0);

    /// Wrap a raw stream position.
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw stream position.
    pub fn get(self) -> i64 {
        self.0
    }

    /// Whether this is the beginning of the stream.
    pub fn is_start(self) -> bool {
        self.0 == 0
    }
}

/// Device and inode pair identifying a directory on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirIdentity {
    /// Device ID.
    pub device: u64,
    /// Inode number.
    pub inode: u64,
}

impl DirIdentity {
    /// Create a new directory identity.
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }
}

/// Resumable traversal state of one directory.
#[derive(Debug, Clone)]
pub struct DirCursor {
    path: PathBuf,
    is_root: bool,
    resume_offset: StreamPosition,
    descent_offset: StreamPosition,
    last_seen_modified: Option<SystemTime>,
    identity: Option<DirIdentity>,
    exhausted: bool,
}

impl DirCursor {
    fn new(path: PathBuf, is_root: bool) -> Self {
        Self {
            path,
            is_root,
            resume_offset: StreamPosition::START,
            descent_offset: StreamPosition::START,
            last_seen_modified: None,
            identity: None,
            exhausted: false,
        }
    }

    /// Directory this cursor reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this cursor belongs to a tracked root.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Where the next read of this directory should continue.
    pub fn resume_offset(&self) -> StreamPosition {
        self.resume_offset
    }

    /// Position of the entry for the subdirectory most recently descended into.
    pub fn descent_offset(&self) -> StreamPosition {
        self.descent_offset
    }

    /// Modification time observed the last time the directory was visited.
    pub fn last_seen_modified(&self) -> Option<SystemTime> {
        self.last_seen_modified
    }

    /// Device and inode of the directory, once it has been opened.
    pub fn identity(&self) -> Option<DirIdentity> {
        self.identity
    }

    /// Whether the directory had nothing left to contribute in the current pass.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Remember where to continue reading.
    pub fn set_resume_offset(&mut self, offset: StreamPosition) {
        self.resume_offset = offset;
    }

    /// Remember the position of the entry being descended into.
    pub fn set_descent_offset(&mut self, offset: StreamPosition) {
        self.descent_offset = offset;
    }

    /// Record the directory's modification time.
    pub fn record_modified(&mut self, modified: Option<SystemTime>) {
        self.last_seen_modified = modified;
    }

    /// Record the directory's device and inode.
    pub fn record_identity(&mut self, identity: Option<DirIdentity>) {
        self.identity = identity;
    }

    /// Flag whether the directory is exhausted for the current pass.
    pub fn set_exhausted(&mut self, exhausted: bool) {
        self.exhausted = exhausted;
    }

    /// Forget the resume position and modification time.
    pub fn clear_resume_state(&mut self) {
        self.resume_offset = StreamPosition::START;
        self.descent_offset = StreamPosition::START;
        self.last_seen_modified = None;
        self.exhausted = false;
    }

    /// Check whether the recorded resume offset may still be used.
    ///
    /// A position is only trusted while the directory's modification time
    /// matches the one recorded alongside it.
    pub fn resume_offset_valid(&self, current_modified: Option<SystemTime>) -> bool {
        current_modified.is_some() && self.last_seen_modified == current_modified
    }
}

/// Chain of cursors from a tracked root down to the active directory.
#[derive(Debug, Clone)]
pub struct CursorStack {
    cursors: Vec<DirCursor>,
}

impl CursorStack {
    /// Create a stack holding only the root cursor for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            cursors: vec![DirCursor::new(root.into(), true)],
        }
    }

    /// The root cursor.
    pub fn root(&self) -> &DirCursor {
        &self.cursors[0]
    }

    /// Handle of the deepest cursor (the one read next).
    pub fn tip(&self) -> CursorId {
        CursorId(self.cursors.len() - 1)
    }

    /// Number of cursors in the chain, root included.
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Always false: the root cursor cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Whether a previous call paused below the root.
    pub fn has_pending(&self) -> bool {
        self.cursors.len() > 1
    }

    /// Look up a cursor.
    pub fn get(&self, id: CursorId) -> Option<&DirCursor> {
        self.cursors.get(id.0)
    }

    /// Ascend to the parent cursor.
    pub fn parent(&self, id: CursorId) -> Option<CursorId> {
        (id.0 > 0 && id.0 < self.cursors.len()).then(|| CursorId(id.0 - 1))
    }

    /// Descend to the most recently opened child cursor.
    pub fn child(&self, id: CursorId) -> Option<CursorId> {
        (id.0 + 1 < self.cursors.len()).then(|| CursorId(id.0 + 1))
    }

    /// Cursors from `id` up to the root, nearest first.
    pub fn ancestors(&self, id: CursorId) -> impl Iterator<Item = &DirCursor> {
        let end = (id.0 + 1).min(self.cursors.len());
        self.cursors[..end].iter().rev()
    }

    /// Create a non-root cursor for `path` below `parent` and make it the tip.
    ///
    /// `parent` must be the current tip; descending from anywhere else would
    /// orphan the cursors below it.
    pub fn push(&mut self, parent: CursorId, path: impl Into<PathBuf>) -> Result<CursorId, FeedError> {
        let path = path.into();
        if parent != self.tip() {
            let parent_path = self
                .get(parent)
                .map(|c| c.path.clone())
                .unwrap_or_default();
            return Err(FeedError::DetachedCursor {
                parent: parent_path,
                path,
            });
        }
        if self.cursors.try_reserve(1).is_err() {
            return Err(FeedError::CursorAllocation { path });
        }
        debug!(path = %path.display(), depth = parent.0 + 1, "Descending");
        self.cursors.push(DirCursor::new(path, false));
        Ok(self.tip())
    }

    /// Discard `id` if it is an exhausted, non-root tip.
    ///
    /// Returns `true` when the cursor was removed. Root cursors are never
    /// removed, and neither is a cursor that still has children below it.
    pub fn pop_if_exhausted(&mut self, id: CursorId) -> bool {
        if id.is_root() || id != self.tip() {
            return false;
        }
        if !self.cursors[id.0].exhausted {
            return false;
        }
        if let Some(cursor) = self.cursors.pop() {
            debug!(path = %cursor.path.display(), "Pruned exhausted directory");
        }
        true
    }

    /// Drop every descendant and clear the root's resume state.
    pub fn reset(&mut self) {
        self.cursors.truncate(1);
        self.cursors[0].clear_resume_state();
    }
}

impl Index<CursorId> for CursorStack {
    type Output = DirCursor;

    fn index(&self, id: CursorId) -> &DirCursor {
        &self.cursors[id.0]
    }
}

impl IndexMut<CursorId> for CursorStack {
    fn index_mut(&mut self, id: CursorId) -> &mut DirCursor {
        &mut self.cursors[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stack_has_root_only() {
        let stack = CursorStack::new("/media");
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.tip(), CursorId::ROOT);
        assert!(stack.root().is_root());
        assert!(stack.root().resume_offset().is_start());
        assert!(!stack.has_pending());
    }

    #[test]
    fn test_push_links_child() {
        let mut stack = CursorStack::new("/media");
        let child = stack.push(CursorId::ROOT, "/media/sub").unwrap();

        assert_eq!(child.depth(), 1);
        assert_eq!(stack.tip(), child);
        assert_eq!(stack.parent(child), Some(CursorId::ROOT));
        assert_eq!(stack.child(CursorId::ROOT), Some(child));
        assert!(!stack[child].is_root());
    }

    #[test]
    fn test_push_below_non_tip_fails() {
        let mut stack = CursorStack::new("/media");
        stack.push(CursorId::ROOT, "/media/a").unwrap();

        let err = stack.push(CursorId::ROOT, "/media/b").unwrap_err();
        assert!(matches!(err, FeedError::DetachedCursor { .. }));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_pop_requires_exhaustion() {
        let mut stack = CursorStack::new("/media");
        let child = stack.push(CursorId::ROOT, "/media/sub").unwrap();

        assert!(!stack.pop_if_exhausted(child));
        stack[child].set_exhausted(true);
        assert!(stack.pop_if_exhausted(child));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_root_is_never_popped() {
        let mut stack = CursorStack::new("/media");
        stack[CursorId::ROOT].set_exhausted(true);
        assert!(!stack.pop_if_exhausted(CursorId::ROOT));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_pop_skips_cursor_with_children() {
        let mut stack = CursorStack::new("/media");
        let a = stack.push(CursorId::ROOT, "/media/a").unwrap();
        stack.push(a, "/media/a/b").unwrap();
        stack[a].set_exhausted(true);

        assert!(!stack.pop_if_exhausted(a));
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_reset_keeps_only_root() {
        let mut stack = CursorStack::new("/media");
        stack[CursorId::ROOT].set_resume_offset(StreamPosition::new(42));
        stack[CursorId::ROOT].set_descent_offset(StreamPosition::new(17));
        stack[CursorId::ROOT].record_modified(Some(SystemTime::UNIX_EPOCH));
        let a = stack.push(CursorId::ROOT, "/media/a").unwrap();
        stack.push(a, "/media/a/b").unwrap();

        stack.reset();

        assert_eq!(stack.len(), 1);
        assert!(stack.root().resume_offset().is_start());
        assert!(stack.root().descent_offset().is_start());
        assert!(stack.root().last_seen_modified().is_none());
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let mut stack = CursorStack::new("/media");
        let a = stack.push(CursorId::ROOT, "/media/a").unwrap();
        let b = stack.push(a, "/media/a/b").unwrap();

        let paths: Vec<_> = stack.ancestors(b).map(|c| c.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/media/a/b"),
                PathBuf::from("/media/a"),
                PathBuf::from("/media"),
            ]
        );
    }

    #[test]
    fn test_resume_offset_validity() {
        let mut stack = CursorStack::new("/media");
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + std::time::Duration::from_secs(5);
        stack[CursorId::ROOT].record_modified(Some(t0));

        assert!(stack.root().resume_offset_valid(Some(t0)));
        assert!(!stack.root().resume_offset_valid(Some(t1)));
        assert!(!stack.root().resume_offset_valid(None));
    }
}
