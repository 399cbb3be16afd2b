//! Progress callbacks for observing a run.

use crate::report::{FeedReport, RunReport};

/// Progress callback for reporting run status.
pub trait RunProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a feed's product pass settles (done or failed).
    fn feed_settled(&self, report: &FeedReport);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn feed_settled(&self, _report: &FeedReport) {}
    fn done(&self, _report: &RunReport) {}
}
