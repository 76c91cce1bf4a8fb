//! Terminal progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use stackflow_core::ComponentId;
use stackflow_runtime::ProgressSink;

/// Progress bar advanced once per (component, flow) pair
#[derive(Clone)]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Create a bar; hidden when `visible` is false
    #[must_use]
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn start(&self, units: u64) {
        self.bar.set_length(units);
    }

    fn flow_done(&self, component: &ComponentId, flow: &str, matched: bool) {
        if matched {
            self.bar.set_message(format!("{} <- {}", component, flow));
        }
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
