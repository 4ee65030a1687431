//! Progress reporting for imports.
//!
//! The pipeline reports through [`ProgressCallback`] so it does not care
//! whether progress is drawn as `indicatif` bars, logged, or dropped.

/// Receives progress from a long-running import.
pub trait ProgressCallback {
    /// Sets the number of units of work expected.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the work complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress. For tests and library callers without a
/// terminal.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
