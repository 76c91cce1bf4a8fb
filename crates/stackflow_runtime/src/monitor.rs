//! Build progress and metrics.
//!
//! The engine reports one unit of progress per (component, flow) pair so a
//! front end can drive a progress bar without knowing how flows work.

use stackflow_core::ComponentId;

/// Build metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Components written back to the stack
    pub components_processed: u64,
    /// Flows that matched and ran
    pub flows_applied: u64,
    /// Flows that did not match
    pub flows_skipped: u64,
    /// Transformer steps folded
    pub steps_applied: u64,
    /// `$resources` entries present after the build
    pub resources_emitted: u64,
}

impl Metrics {
    /// Create new metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a flow that ran with `steps` steps
    pub fn record_applied(&mut self, steps: usize) {
        self.flows_applied += 1;
        self.steps_applied += steps as u64;
    }

    /// Record a flow that did not match
    pub fn record_skip(&mut self) {
        self.flows_skipped += 1;
    }

    /// Record a finished component and its resources
    pub fn record_component(&mut self, resources: usize) {
        self.components_processed += 1;
        self.resources_emitted += resources as u64;
    }

    /// Share of evaluated flows that matched (0.0 - 1.0)
    #[must_use]
    pub fn match_rate(&self) -> f64 {
        let total = self.flows_applied + self.flows_skipped;
        if total == 0 {
            return 0.0;
        }
        self.flows_applied as f64 / total as f64
    }

    /// Reset metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Receives build progress
pub trait ProgressSink: Send + Sync {
    /// The build is about to process `units` (component, flow) pairs
    fn start(&self, _units: u64) {}

    /// One flow was evaluated against one component
    fn flow_done(&self, _component: &ComponentId, _flow: &str, _matched: bool) {}

    /// A component was written back
    fn component_done(&self, _component: &ComponentId) {}

    /// The build ended, successfully or not
    fn finish(&self) {}
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.flows_applied, 0);
        assert_eq!(metrics.match_rate(), 0.0);
    }

    #[test]
    fn test_metrics_record() {
        let mut metrics = Metrics::new();
        metrics.record_applied(3);
        metrics.record_skip();
        metrics.record_component(2);

        assert_eq!(metrics.flows_applied, 1);
        assert_eq!(metrics.steps_applied, 3);
        assert_eq!(metrics.resources_emitted, 2);
        assert_eq!(metrics.match_rate(), 0.5);
    }

    #[test]
    fn test_default_sink_methods_are_noops() {
        let sink: &dyn ProgressSink = &NoProgress;
        let id = ComponentId::new("web");
        sink.start(2);
        sink.flow_done(&id, "0", true);
        sink.component_done(&id);
        sink.finish();
    }

    #[test]
    fn test_metrics_reset() {
        let mut metrics = Metrics::new();
        metrics.record_applied(1);
        metrics.reset();
        assert_eq!(metrics, Metrics::default());
    }
}
