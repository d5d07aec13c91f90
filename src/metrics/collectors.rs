//! Custom metric collectors for pipeline operations.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics with consistent
//! labels. Every method is a no-op until [`super::init_metrics`] has run, so
//! library users and tests that never initialize metrics pay nothing.

use super::prometheus::{
    PIPELINES_IN_PROGRESS, PIPELINE_RUNS_TOTAL, STAGE_DURATION, STAGE_RUNS_TOTAL,
};

/// Metrics collector for recording pipeline and stage metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one stage invocation.
    ///
    /// # Arguments
    ///
    /// * `stage` - Stage name (e.g. "original", "pluto_flattening", "link")
    /// * `status` - "succeeded", "failed" or "timeout"
    /// * `duration_secs` - Stage duration in seconds
    pub fn record_stage(&self, stage: &str, status: &str, duration_secs: f64) {
        if let Some(stage_runs_total) = STAGE_RUNS_TOTAL.get() {
            stage_runs_total.with_label_values(&[stage, status]).inc();
        }

        if let Some(stage_duration) = STAGE_DURATION.get() {
            stage_duration
                .with_label_values(&[stage])
                .observe(duration_secs);
        }

        tracing::trace!(
            stage = stage,
            status = status,
            duration_secs = duration_secs,
            "Recorded stage metric"
        );
    }

    /// Record the final status of a pipeline run.
    pub fn record_pipeline(&self, status: &str) {
        if let Some(pipeline_runs_total) = PIPELINE_RUNS_TOTAL.get() {
            pipeline_runs_total.with_label_values(&[status]).inc();
        }
    }

    /// Increment the number of pipelines in progress.
    pub fn inc_in_progress(&self) {
        if let Some(in_progress) = PIPELINES_IN_PROGRESS.get() {
            in_progress.inc();
        }
    }

    /// Decrement the number of pipelines in progress.
    pub fn dec_in_progress(&self) {
        if let Some(in_progress) = PIPELINES_IN_PROGRESS.get() {
            in_progress.dec();
        }
    }
}

/// Keeps the in-progress gauge balanced across every exit path of a run.
#[derive(Debug)]
pub struct InProgressGuard {
    collector: MetricsCollector,
}

impl InProgressGuard {
    /// Increments the gauge; the matching decrement happens on drop.
    pub fn new(collector: MetricsCollector) -> Self {
        collector.inc_in_progress();
        Self { collector }
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.collector.dec_in_progress();
    }
}
