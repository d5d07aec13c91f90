//! Pipeline orchestrator for serving compilation requests.
//!
//! This module provides the `PipelineOrchestrator` that coordinates:
//! - Request validation
//! - Workspace acquisition and release
//! - Stage planning and execution
//! - Response assembly

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

use super::assembler::{self, CompileResponse};
use super::config::{ConfigError, PipelineConfig};
use super::planner::StagePlanner;
use super::request::{CompilationRequest, ObfuscationOptions};
use super::result::PipelineResult;
use super::runner::PipelineRunner;
use crate::error::{RequestError, WorkspaceError};
use crate::metrics::{InProgressGuard, MetricsCollector};
use crate::toolchain::{ProcessInvoker, ToolInvoker};
use crate::workspace::WorkspaceManager;

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Counters over every run the orchestrator has started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    /// Runs that reached a final state.
    pub total_executed: u64,
    /// Runs where every stage succeeded.
    pub succeeded: u64,
    /// Runs stopped by a failing stage.
    pub failed: u64,
}

/// Main pipeline orchestrator.
///
/// Cheap to share behind an `Arc`; every call to [`run`](Self::run) gets its
/// own workspace, so concurrent runs never observe each other's files.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    planner: StagePlanner,
    runner: PipelineRunner,
    workspaces: WorkspaceManager,
    metrics: MetricsCollector,
    total_executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator that runs the real toolchain.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_invoker(config, Arc::new(ProcessInvoker::new()))
    }

    /// Creates an orchestrator that runs tools through `invoker`.
    pub fn with_invoker(
        config: PipelineConfig,
        invoker: Arc<dyn ToolInvoker>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let planner = StagePlanner::from_config(&config)?;
        let runner = PipelineRunner::new(invoker, config.pass_plugin.clone());
        let workspaces = WorkspaceManager::new(config.workspace_root.clone());

        Ok(Self {
            config,
            planner,
            runner,
            workspaces,
            metrics: MetricsCollector::new(),
            total_executed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Validates caller input into a request.
    pub fn validate(
        &self,
        code: Option<String>,
        llvm_version: Option<String>,
        options: ObfuscationOptions,
    ) -> Result<CompilationRequest, RequestError> {
        CompilationRequest::validate(code, llvm_version, options, &self.config)
    }

    /// Runs one request in a fresh workspace.
    ///
    /// The workspace is released before this returns. If the returned future
    /// is dropped mid-run, the running tool is killed and the workspace is
    /// released on drop.
    ///
    /// # Errors
    ///
    /// Returns a `WorkspaceError` if no workspace could be created. Stage
    /// failures are not errors; they are reported in the result.
    pub async fn run(
        &self,
        request: &CompilationRequest,
    ) -> Result<PipelineResult, WorkspaceError> {
        let _in_progress = InProgressGuard::new(self.metrics);

        let mut workspace = match self.workspaces.acquire() {
            Ok(workspace) => workspace,
            Err(e) => {
                self.metrics.record_pipeline("error");
                return Err(e);
            }
        };

        let span = info_span!(
            "pipeline",
            run_id = %workspace.id(),
            workspace = %workspace.path().display(),
        );

        let result = async {
            let plan = self.planner.plan(request);
            debug!(source_bytes = request.source().len(), "Received source");
            info!(
                stages = ?plan.names(),
                llvm_version = %request.llvm_version(),
                "Starting pipeline"
            );

            let result = self.runner.execute(request, &plan, &mut workspace).await;
            let report = workspace.release();
            debug!(
                removed = report.removed,
                absent = report.absent,
                failed = report.failed,
                "Workspace released"
            );

            info!(
                state = %result.state(),
                duration_ms = (result.completed_at() - result.started_at()).num_milliseconds(),
                "Pipeline finished"
            );
            result
        }
        .instrument(span)
        .await;

        self.total_executed.fetch_add(1, Ordering::Relaxed);
        if result.is_success() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_pipeline("succeeded");
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_pipeline("failed");
        }

        Ok(result)
    }

    /// Validates, runs and assembles one request end to end.
    pub async fn compile(
        &self,
        code: Option<String>,
        llvm_version: Option<String>,
        options: ObfuscationOptions,
    ) -> CompileResponse {
        let request = match self.validate(code, llvm_version, options) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Rejected request");
                self.metrics.record_pipeline("rejected");
                return assembler::reject(&e);
            }
        };

        match self.run(&request).await {
            Ok(result) => assembler::assemble(result),
            Err(e) => assembler::internal_error(&e),
        }
    }

    /// Runs several requests concurrently, each in its own workspace.
    pub async fn run_batch(
        &self,
        requests: &[CompilationRequest],
    ) -> Vec<Result<PipelineResult, WorkspaceError>> {
        let futures: Vec<_> = requests.iter().map(|request| self.run(request)).collect();
        futures::future::join_all(futures).await
    }

    /// Gets the current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            total_executed: self.total_executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Gets the current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Gets the stage planner.
    pub fn planner(&self) -> &StagePlanner {
        &self.planner
    }
}
