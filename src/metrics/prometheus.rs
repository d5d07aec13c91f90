//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by ir-forge and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all ir-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total pipeline runs, labeled by final status.
pub static PIPELINE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total stage invocations, labeled by stage name and status.
pub static STAGE_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage duration in seconds, labeled by stage name.
pub static STAGE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of pipelines currently running.
pub static PIPELINES_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Safe to call more than once: later calls leave the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric construction or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let pipeline_runs_total = CounterVec::new(
        Opts::new("ir_forge_pipeline_runs_total", "Total pipeline runs"),
        &["status"],
    )?;

    let stage_runs_total = CounterVec::new(
        Opts::new("ir_forge_stage_runs_total", "Total stage invocations"),
        &["stage", "status"],
    )?;

    let stage_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "ir_forge_stage_duration_seconds",
            "Stage duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["stage"],
    )?;

    let pipelines_in_progress = Gauge::new(
        "ir_forge_pipelines_in_progress",
        "Number of pipelines currently running",
    )?;

    registry.register(Box::new(pipeline_runs_total.clone()))?;
    registry.register(Box::new(stage_runs_total.clone()))?;
    registry.register(Box::new(stage_duration.clone()))?;
    registry.register(Box::new(pipelines_in_progress.clone()))?;

    // A concurrent initializer may have won the race; keep whichever landed first.
    let _ = REGISTRY.set(registry);
    let _ = PIPELINE_RUNS_TOTAL.set(pipeline_runs_total);
    let _ = STAGE_RUNS_TOTAL.set(stage_runs_total);
    let _ = STAGE_DURATION.set(stage_duration);
    let _ = PIPELINES_IN_PROGRESS.set(pipelines_in_progress);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry was never
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
