//! Indicatif-backed implementation of the probe progress sink

use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::probe::ProgressSink;

/// Terminal progress bar driven by orchestrator events.
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:32}] {pos}/{len} ({elapsed})",
            )
            .expect("static template")
            .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn run_started(&self, total_endpoints: usize) {
        self.bar.set_length(total_endpoints as u64);
        self.bar.set_message("Probing endpoints");
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn identity_resolved(&self, name: &str, ok: bool) {
        if !ok {
            warn!("identity '{}' failed to resolve; its variants will carry errors", name);
        }
    }

    fn endpoint_finished(&self, _index: usize) {
        self.bar.inc(1);
    }

    fn run_finished(&self) {
        self.bar.finish_and_clear();
    }
}
