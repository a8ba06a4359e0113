//! Bounded, resumable depth-first enumeration.

use std::fs;
use std::io;
use std::path::Path;

use dripfeed_core::{
    CursorId, CursorStack, DirIdentity, ExclusionPredicate, FeedConfig, FeedError, FeedWarning,
    Sink, StreamPosition, TraversalMode, is_resource_exhaustion,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::stream::{DirStream, DirentKind, RawEntry};

/// How an enumeration call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The directory has nothing more to give in this call.
    Exhausted,
    /// The budget ran out with entries still unread.
    BudgetReached,
}

/// State shared by every directory visited for one root during one refill.
pub struct Pass<'a> {
    budget: u64,
    mode: TraversalMode,
    added: u64,
    sink: &'a mut dyn Sink,
    warnings: Vec<FeedWarning>,
}

impl<'a> Pass<'a> {
    /// Start a pass that emits at most `budget` files into `sink`.
    pub fn new(budget: u64, mode: TraversalMode, sink: &'a mut dyn Sink) -> Self {
        Self {
            budget,
            mode,
            added: 0,
            sink,
            warnings: Vec::new(),
        }
    }

    /// Files emitted so far.
    pub fn added(&self) -> u64 {
        self.added
    }

    /// Whether no more files may be emitted.
    pub fn budget_reached(&self) -> bool {
        self.added >= self.budget
    }

    /// Non-fatal problems seen so far.
    pub fn warnings(&self) -> &[FeedWarning] {
        &self.warnings
    }

    /// Consume the pass, keeping only its warnings.
    pub fn into_warnings(self) -> Vec<FeedWarning> {
        self.warnings
    }

    fn emit(&mut self, path: &Path) {
        trace!(path = %path.display(), "Emitting");
        self.sink.emit(path);
        self.added += 1;
    }

    fn warn(&mut self, warning: FeedWarning) {
        warn!(path = %warning.path.display(), kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }
}

/// Walks cursor stacks, emitting regular files until a budget is spent.
pub struct EnumerationEngine {
    recurse: bool,
    exclusion: Box<dyn ExclusionPredicate>,
}

impl EnumerationEngine {
    /// Create an engine from a configuration.
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            recurse: config.recurse,
            exclusion: Box::new(config.exclusion_filter()),
        }
    }

    /// Replace the exclusion rule.
    pub fn with_exclusion(mut self, predicate: impl ExclusionPredicate + 'static) -> Self {
        self.exclusion = Box::new(predicate);
        self
    }

    /// Continue a root's traversal from its deepest pending directory.
    ///
    /// Each exhausted directory is discarded and its parent continues from
    /// where it paused, up to the root. The root's outcome is returned.
    pub fn resume(&self, stack: &mut CursorStack, pass: &mut Pass<'_>) -> Result<Outcome, FeedError> {
        let mut returning = false;
        loop {
            let tip = stack.tip();
            let outcome = self.enumerate_from(stack, tip, pass, returning)?;
            returning = true;
            if tip.is_root() || outcome == Outcome::BudgetReached {
                return Ok(outcome);
            }
            if !stack.pop_if_exhausted(tip) {
                return Ok(outcome);
            }
        }
    }

    /// Enumerate the directory of cursor `id`, which must be the stack tip.
    pub fn enumerate(
        &self,
        stack: &mut CursorStack,
        id: CursorId,
        pass: &mut Pass<'_>,
    ) -> Result<Outcome, FeedError> {
        self.enumerate_from(stack, id, pass, false)
    }

    /// `returning` is set when a child of `id` was finished earlier in this
    /// call. A wrapping root then stops before that child's entry instead of
    /// reading the subtree a second time.
    fn enumerate_from(
        &self,
        stack: &mut CursorStack,
        id: CursorId,
        pass: &mut Pass<'_>,
        returning: bool,
    ) -> Result<Outcome, FeedError> {
        let path = stack[id].path().to_path_buf();

        let mut stream = match DirStream::open(&path) {
            Ok(stream) => stream,
            Err(err) if is_resource_exhaustion(&err) => {
                return Err(FeedError::ResourceExhausted { path, source: err });
            }
            Err(err) => {
                pass.warn(FeedWarning::open_failed(&path, &err));
                stack[id].set_exhausted(true);
                return Ok(Outcome::Exhausted);
            }
        };

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                pass.warn(FeedWarning::metadata_error(&path, &err));
                None
            }
        };
        let modified = metadata.as_ref().and_then(|m| m.modified().ok());
        let identity = metadata.as_ref().and_then(dir_identity);

        if let Some(identity) = identity
            && stack.ancestors(id).skip(1).any(|c| c.identity() == Some(identity))
        {
            pass.warn(FeedWarning::symlink_loop(&path));
            stack[id].set_exhausted(true);
            return Ok(Outcome::Exhausted);
        }

        let cursor = &mut stack[id];
        cursor.record_identity(identity);
        cursor.set_exhausted(false);
        if cursor.last_seen_modified().is_none() {
            cursor.record_modified(modified);
        }
        let offset = cursor.resume_offset();
        let mut resumed = false;
        if !offset.is_start() {
            if cursor.resume_offset_valid(modified) {
                debug!(path = %path.display(), offset = offset.get(), "Resuming directory");
                stream.seek(offset);
                resumed = true;
            } else {
                debug!(path = %path.display(), "Directory changed since last visit, starting over");
                cursor.set_resume_offset(StreamPosition::START);
                cursor.record_modified(modified);
            }
        }

        let wraps = id.is_root() && pass.mode.wraps_roots();
        let start = if returning && resumed {
            stack[id].descent_offset()
        } else {
            stream.tell()
        };
        let mut rewound = false;

        loop {
            if rewound && stream.tell() == start {
                debug!(path = %path.display(), "Wrapped around to the starting entry");
                break;
            }

            if pass.budget_reached() {
                let position = stream.tell();
                match has_remaining(&mut stream) {
                    Ok(true) => {
                        stack[id].set_resume_offset(position);
                        debug!(path = %path.display(), added = pass.added, "Budget reached, pausing");
                        return Ok(Outcome::BudgetReached);
                    }
                    Ok(false) => break,
                    Err(err) => return Ok(abandon(stack, id, &path, &err, pass)),
                }
            }

            let before = stream.tell();
            let entry = match stream.next_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) if wraps && !rewound => {
                    debug!(path = %path.display(), "Rewinding root");
                    stream.rewind();
                    rewound = true;
                    continue;
                }
                Ok(None) => break,
                Err(err) => return Ok(abandon(stack, id, &path, &err, pass)),
            };
            if entry.is_pseudo() {
                continue;
            }

            let entry_path = path.join(&entry.name);
            match self.resolve_kind(&entry, &entry_path, pass) {
                Some(DirentKind::Directory) => {
                    if !self.recurse {
                        continue;
                    }
                    stack[id].set_descent_offset(before);
                    stack[id].set_resume_offset(stream.tell());
                    let child = stack.push(id, entry_path)?;
                    match self.enumerate_from(stack, child, pass, false)? {
                        Outcome::Exhausted => {
                            stack.pop_if_exhausted(child);
                        }
                        Outcome::BudgetReached => return Ok(Outcome::BudgetReached),
                    }
                }
                Some(DirentKind::File) => {
                    if self.exclusion.is_excluded(Path::new(&entry.name)) {
                        trace!(path = %entry_path.display(), "Excluded");
                        continue;
                    }
                    pass.emit(&entry_path);
                }
                _ => {}
            }
        }

        complete(stack, id, &path, &stream, wraps);
        Ok(Outcome::Exhausted)
    }

    /// Settle symlinks and unknown entries with a status query.
    fn resolve_kind(&self, entry: &RawEntry, entry_path: &Path, pass: &mut Pass<'_>) -> Option<DirentKind> {
        if !entry.kind.needs_stat() {
            return Some(entry.kind);
        }
        match fs::metadata(entry_path) {
            Ok(m) if m.is_dir() => Some(DirentKind::Directory),
            Ok(m) if m.is_file() => Some(DirentKind::File),
            Ok(_) => Some(DirentKind::Other),
            Err(err) => {
                pass.warn(FeedWarning::metadata_error(entry_path, &err));
                None
            }
        }
    }
}

impl Default for EnumerationEngine {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

/// Whether a real entry is left to read. The stream is left wherever the
/// lookahead stopped.
fn has_remaining(stream: &mut DirStream) -> io::Result<bool> {
    while let Some(entry) = stream.next_entry()? {
        if !entry.is_pseudo() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Mark a directory done for this call after a read error, keeping its
/// previous resume state.
fn abandon(stack: &mut CursorStack, id: CursorId, path: &Path, err: &io::Error, pass: &mut Pass<'_>) -> Outcome {
    pass.warn(FeedWarning::read_error(path, err));
    stack[id].set_exhausted(true);
    Outcome::Exhausted
}

fn complete(stack: &mut CursorStack, id: CursorId, path: &Path, stream: &DirStream, wraps: bool) {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    let cursor = &mut stack[id];
    cursor.record_modified(modified);
    cursor.set_resume_offset(if wraps { StreamPosition::START } else { stream.tell() });
    cursor.set_exhausted(true);
    debug!(path = %path.display(), "Directory exhausted");
}

#[cfg(unix)]
fn dir_identity(metadata: &fs::Metadata) -> Option<DirIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(DirIdentity::new(metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn dir_identity(_metadata: &fs::Metadata) -> Option<DirIdentity> {
    None
}
