//! Progress observer seam
//!
//! The orchestration core reports through this trait instead of touching
//! the console, so it stays testable without a terminal.

/// Callbacks emitted during a probe run.
pub trait ProgressSink: Send + Sync {
    fn run_started(&self, _total_endpoints: usize) {}
    fn identity_resolved(&self, _name: &str, _ok: bool) {}
    fn endpoint_finished(&self, _index: usize) {}
    fn run_finished(&self) {}
}

/// Sink that drops every event; used by tests and dry runs.
pub struct NullSink;

impl ProgressSink for NullSink {}
