//! Multi-root refills.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use dripfeed_core::{CursorStack, FeedCommand, FeedError, NotificationSink, Sink, TraversalMode};
use tracing::{debug, error, info};

use crate::engine::{EnumerationEngine, Pass};
use crate::report::{RefillReport, RootReport};

/// A directory input together with its traversal state.
#[derive(Debug, Clone)]
pub struct TrackedRoot {
    stack: CursorStack,
}

impl TrackedRoot {
    /// Track a directory that has not been visited yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            stack: CursorStack::new(path),
        }
    }

    /// Root directory path.
    pub fn path(&self) -> &Path {
        self.stack.root().path()
    }

    /// Cursor chain from the root to the deepest paused directory.
    pub fn stack(&self) -> &CursorStack {
        &self.stack
    }
}

/// One session input.
#[derive(Debug, Clone)]
pub enum RootEntry {
    /// A directory that is enumerated incrementally.
    Directory(TrackedRoot),
    /// Anything else, passed to the destination as is.
    File(PathBuf),
}

impl RootEntry {
    /// Classify an input path, following symlinks.
    ///
    /// Directories are made absolute so that emitted paths do not depend on
    /// the working directory. Paths that cannot be inspected are kept as
    /// plain entries.
    pub fn classify(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        match fs::metadata(&input) {
            Ok(metadata) if metadata.is_dir() => {
                let path = std::path::absolute(&input).unwrap_or(input);
                Self::Directory(TrackedRoot::new(path))
            }
            Ok(_) => Self::File(input),
            Err(err) => {
                debug!(path = %input.display(), error = %err, "Cannot inspect input, keeping it as a file");
                Self::File(input)
            }
        }
    }

    /// The input path, made absolute for directories.
    pub fn path(&self) -> &Path {
        match self {
            Self::Directory(root) => root.path(),
            Self::File(path) => path,
        }
    }

    /// Whether this input is enumerated incrementally.
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}

/// Drives refills across every session input.
pub struct TraversalOrchestrator {
    engine: EnumerationEngine,
    entries: Vec<RootEntry>,
    last_mode: TraversalMode,
}

impl TraversalOrchestrator {
    /// Build an orchestrator over already classified entries. Every root
    /// starts from the top, in Replace mode.
    pub fn new(engine: EnumerationEngine, entries: Vec<RootEntry>) -> Self {
        Self {
            engine,
            entries,
            last_mode: TraversalMode::default(),
        }
    }

    /// Classify the given inputs and build an orchestrator over them.
    pub fn from_inputs<I, P>(engine: EnumerationEngine, inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let entries: Vec<_> = inputs.into_iter().map(RootEntry::classify).collect();
        info!(
            inputs = entries.len(),
            directories = entries.iter().filter(|e| e.is_directory()).count(),
            "Session started"
        );
        Self::new(engine, entries)
    }

    /// Whether at least one input is a directory.
    pub fn is_active(&self) -> bool {
        self.entries.iter().any(RootEntry::is_directory)
    }

    /// Inputs in their original order.
    pub fn entries(&self) -> &[RootEntry] {
        &self.entries
    }

    /// Directory inputs in their original order.
    pub fn roots(&self) -> impl Iterator<Item = &TrackedRoot> {
        self.entries.iter().filter_map(|entry| match entry {
            RootEntry::Directory(root) => Some(root),
            RootEntry::File(_) => None,
        })
    }

    /// Mode of the most recent refill.
    pub fn last_mode(&self) -> TraversalMode {
        self.last_mode
    }

    /// Refill `sink` with up to `budget` files from each directory root.
    ///
    /// Replace clears the destination first and re-emits plain file inputs.
    /// Switching mode restarts every root from the top. The notifier hears
    /// about the total once, unless a hard failure ends the refill early.
    pub fn refill(
        &mut self,
        budget: u64,
        mode: TraversalMode,
        sink: &mut dyn Sink,
        notifier: &mut dyn NotificationSink,
    ) -> Result<RefillReport, FeedError> {
        let started = Instant::now();
        debug!(%mode, budget, "Refilling");

        if mode.clears_destination() {
            sink.clear();
        }
        if mode != self.last_mode {
            debug!(from = %self.last_mode, to = %mode, "Mode changed, restarting every root");
            for entry in &mut self.entries {
                if let RootEntry::Directory(root) = entry {
                    root.stack.reset();
                }
            }
        }
        self.last_mode = mode;

        let mut report = RefillReport::new(mode);
        for entry in &mut self.entries {
            let root = match entry {
                RootEntry::File(path) => {
                    if mode.clears_destination() {
                        sink.emit(path);
                    }
                    continue;
                }
                RootEntry::Directory(root) => root,
            };

            let mut pass = Pass::new(budget, mode, &mut *sink);
            let outcome = match self.engine.resume(&mut root.stack, &mut pass) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(root = %root.path().display(), error = %err, "Refill aborted");
                    return Err(err);
                }
            };
            debug!(
                root = %root.path().display(),
                added = pass.added(),
                ?outcome,
                "Root done"
            );
            report.record_root(RootReport {
                path: root.path().to_path_buf(),
                added: pass.added(),
                outcome,
                warnings: pass.into_warnings(),
            });
        }

        report.elapsed = started.elapsed();
        notifier.notify(report.total_added, mode);
        info!(%mode, total = report.total_added, "Refill complete");
        Ok(report)
    }

    /// Handle a client message of the form `<client_name> <mode> [budget]`.
    ///
    /// Returns `None` when the message is not addressed to `client_name`.
    /// Without a budget, `default_budget` is used.
    pub fn handle_message<S: AsRef<str>>(
        &mut self,
        args: &[S],
        client_name: &str,
        default_budget: u64,
        sink: &mut dyn Sink,
        notifier: &mut dyn NotificationSink,
    ) -> Option<Result<RefillReport, FeedError>> {
        let command = FeedCommand::parse(args, client_name, self.last_mode)?;
        let budget = command.budget.unwrap_or(default_budget);
        Some(self.refill(budget, command.mode, sink, notifier))
    }
}
