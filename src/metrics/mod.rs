//! Metrics module for Prometheus-based monitoring.
//!
//! Records pipeline runs and per-stage invocations so operators can see
//! which toolchain stages fail or run slowly.
//!
//! # Example
//!
//! ```ignore
//! use ir_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_stage("original", "succeeded", 0.42);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{InProgressGuard, MetricsCollector};
pub use prometheus::{export_metrics, init_metrics, metrics_handler};

pub use prometheus::{
    PIPELINES_IN_PROGRESS, PIPELINE_RUNS_TOTAL, REGISTRY, STAGE_DURATION, STAGE_RUNS_TOTAL,
};
