//! Run and feed outcome reports.

use std::time::Duration;

use feedsync_shared::{FeedId, FeedSyncError, RunId};
use serde::Serialize;

use crate::dispatcher::BatchOutcome;

/// Which kind of full-site run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Fetch every feed, reconcile products, then categories.
    Update,
    /// Recompute product keywords and re-run keyword categorization.
    Refresh,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Update => "update",
            Self::Refresh => "refresh",
        })
    }
}

/// Applied/failed counts for a group of mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub applied: usize,
    pub failed: usize,
}

impl Tally {
    pub fn add(&mut self, outcome: &BatchOutcome) {
        self.applied += outcome.applied.len();
        self.failed += outcome.failures.len();
    }
}

/// How a feed's product pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum FeedOutcome {
    /// The feed was processed; individual mutations may still have failed.
    Done(Tally),
    /// Fetching or parsing aborted the feed.
    Failed { kind: String, message: String },
}

impl FeedOutcome {
    pub fn failed(error: &FeedSyncError) -> Self {
        Self::Failed {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Outcome for one feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    pub feed_id: FeedId,
    pub feed_name: String,
    pub outcome: FeedOutcome,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub site: String,
    pub kind: RunKind,
    pub feeds: Vec<FeedReport>,
    /// Mutations from the category pass.
    pub category_pass: Tally,
    /// Categories removed because no feed declares them any more.
    pub orphans_removed: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn failed_feeds(&self) -> usize {
        self.feeds.iter().filter(|f| !f.outcome.is_done()).count()
    }
}
