//! Refill reporting.

use std::path::PathBuf;
use std::time::Duration;

use dripfeed_core::{FeedWarning, Notification, TraversalMode};
use serde::{Deserialize, Serialize};

use crate::engine::Outcome;

/// What one directory root contributed to a refill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootReport {
    /// Root directory.
    pub path: PathBuf,
    /// Files emitted from this root.
    pub added: u64,
    /// How the root's traversal ended.
    pub outcome: Outcome,
    /// Non-fatal problems met under this root.
    pub warnings: Vec<FeedWarning>,
}

/// Summary of one refill across all roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefillReport {
    /// Mode of the refill.
    pub mode: TraversalMode,
    /// Files emitted across all directory roots.
    pub total_added: u64,
    /// Per-root results, in input order.
    pub roots: Vec<RootReport>,
    /// Time spent enumerating.
    pub elapsed: Duration,
}

impl RefillReport {
    /// An empty report for a refill in `mode`.
    pub fn new(mode: TraversalMode) -> Self {
        Self {
            mode,
            total_added: 0,
            roots: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Add one root's result to the totals.
    pub fn record_root(&mut self, root: RootReport) {
        self.total_added += root.added;
        self.roots.push(root);
    }

    /// Every warning, across roots.
    pub fn warnings(&self) -> impl Iterator<Item = &FeedWarning> {
        self.roots.iter().flat_map(|root| root.warnings.iter())
    }

    /// Whether any root still has unread entries.
    pub fn has_pending(&self) -> bool {
        self.roots.iter().any(|root| root.outcome == Outcome::BudgetReached)
    }

    /// The user-facing message for this refill.
    pub fn notification(&self) -> Notification {
        Notification::new(self.total_added, self.mode)
    }

    /// Files emitted per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.total_added as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}
