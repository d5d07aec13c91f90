//! Stage runner.
//!
//! The `PipelineRunner` drives a [`StagePlan`] through a [`ToolInvoker`],
//! threading each stage's output artifact into the next stage's input and
//! stopping at the first failure. Stages run strictly one after another:
//! stage `i` starts only after stage `i-1` has succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::planner::{StageDescriptor, StageKind, StagePlan};
use super::request::CompilationRequest;
use super::result::{FailureReason, PipelineResult, PipelineState, StageFailure, StageResult};
use crate::error::ToolError;
use crate::metrics::MetricsCollector;
use crate::toolchain::{expect_artifact, read_artifact, Bindings, ToolInvoker, ToolOutput};
use crate::workspace::Workspace;

/// Workspace name of the submitted source file.
const SOURCE_ARTIFACT: &str = "source";
/// Extension of the submitted source file.
const SOURCE_EXTENSION: &str = "cpp";

/// The artifact flowing between stages.
#[derive(Debug, Clone)]
struct Artifact {
    path: PathBuf,
    content: String,
}

/// What one successful stage handed back to the run loop.
enum StageStep {
    /// A compile or pass stage produced inspectable IR.
    Transformed {
        result: StageResult,
        artifact: Artifact,
    },
    /// The link stage produced an executable.
    Linked { artifact: Artifact },
    /// The execute stage ran the program.
    Executed { output: String },
}

/// Executes stage plans.
#[derive(Clone)]
pub struct PipelineRunner {
    invoker: Arc<dyn ToolInvoker>,
    pass_plugin: String,
    metrics: MetricsCollector,
}

impl PipelineRunner {
    /// Creates a runner that invokes tools through `invoker`.
    pub fn new(invoker: Arc<dyn ToolInvoker>, pass_plugin: impl Into<String>) -> Self {
        Self {
            invoker,
            pass_plugin: pass_plugin.into(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Runs every stage of `plan` inside `workspace`.
    ///
    /// Never returns an error: every failure is captured in the returned
    /// [`PipelineResult`] along with the stages completed before it. Stages
    /// are not retried.
    pub async fn execute(
        &self,
        request: &CompilationRequest,
        plan: &StagePlan,
        workspace: &mut Workspace,
    ) -> PipelineResult {
        let run_id = workspace.id();
        let started_at = Utc::now();
        let mut state = PipelineState::Pending;
        let mut stages: Vec<StageResult> = Vec::with_capacity(plan.non_terminal_count());
        let mut execution_output = None;

        let mut current = match workspace.write_artifact(
            SOURCE_ARTIFACT,
            SOURCE_EXTENSION,
            request.source(),
        ) {
            Ok(path) => Artifact {
                path,
                content: request.source().to_string(),
            },
            Err(e) => {
                warn!(error = %e, "Failed to write source artifact");
                let failure = match plan.get(0) {
                    Some(stage) => failure(
                        0,
                        stage,
                        FailureReason::Workspace,
                        e.to_string(),
                        workspace,
                    ),
                    None => StageFailure {
                        stage_index: 0,
                        stage: SOURCE_ARTIFACT.to_string(),
                        kind: StageKind::Compile,
                        reason: FailureReason::Workspace,
                        diagnostic: workspace.redact(&e.to_string()),
                    },
                };
                return PipelineResult::failed(run_id, stages, failure, started_at);
            }
        };

        for (index, stage) in plan.stages().iter().enumerate() {
            state = PipelineState::Running { stage_index: index };
            debug!(stage = %stage.name, %state, "Starting stage");

            let start = Instant::now();
            let step = self
                .run_stage(index, stage, &current, request, workspace)
                .await;
            let elapsed = start.elapsed();

            match step {
                Ok(step) => {
                    self.metrics
                        .record_stage(&stage.name, "succeeded", elapsed.as_secs_f64());
                    info!(
                        stage = %stage.name,
                        duration_ms = elapsed.as_millis() as u64,
                        "Stage completed"
                    );
                    match step {
                        StageStep::Transformed { result, artifact } => {
                            stages.push(result);
                            current = artifact;
                        }
                        StageStep::Linked { artifact } => current = artifact,
                        StageStep::Executed { output } => execution_output = Some(output),
                    }
                }
                Err(failure) => {
                    let status = match failure.reason {
                        FailureReason::Timeout => "timeout",
                        _ => "failed",
                    };
                    self.metrics
                        .record_stage(&stage.name, status, elapsed.as_secs_f64());
                    warn!(
                        stage = %stage.name,
                        stage_index = index,
                        reason = %failure.reason,
                        "Stage failed"
                    );
                    return PipelineResult::failed(run_id, stages, failure, started_at);
                }
            }
        }

        debug!(previous = %state, "All stages succeeded");
        PipelineResult::succeeded(
            run_id,
            stages,
            execution_output.unwrap_or_default(),
            started_at,
        )
    }

    async fn run_stage(
        &self,
        index: usize,
        stage: &StageDescriptor,
        input: &Artifact,
        request: &CompilationRequest,
        workspace: &mut Workspace,
    ) -> Result<StageStep, StageFailure> {
        let output_path = match stage.kind.output_extension() {
            Some(extension) => Some(
                workspace
                    .new_artifact_path(&stage.name, extension)
                    .map_err(|e| {
                        failure(index, stage, FailureReason::Workspace, e.to_string(), workspace)
                    })?,
            ),
            None => None,
        };

        let mut bindings = Bindings::new()
            .version(request.llvm_version())
            .plugin(self.pass_plugin.as_str())
            .input(&workspace_name(
                &input.path,
                matches!(stage.kind, StageKind::Execute),
            ));
        if let Some(path) = &output_path {
            bindings = bindings.output(&workspace_name(path, false));
        }
        if let StageKind::Pass { pass } = stage.kind {
            bindings = bindings.pass(pass);
        }

        let command = stage
            .command
            .bind(&bindings)
            .map_err(|e| {
                failure(index, stage, FailureReason::ExecutionFailed, e.to_string(), workspace)
            })?
            .in_dir(workspace.path());
        debug!(stage = %stage.name, command = %command, "Invoking tool");

        let output = match self.invoker.run(&command, stage.timeout).await {
            Ok(output) => output,
            Err(ToolError::Timeout { after, .. }) => {
                return Err(failure(
                    index,
                    stage,
                    FailureReason::Timeout,
                    format!("stage '{}' timed out after {:?}", stage.name, after),
                    workspace,
                ));
            }
            Err(e) => {
                return Err(failure(
                    index,
                    stage,
                    FailureReason::ExecutionFailed,
                    e.to_string(),
                    workspace,
                ));
            }
        };

        if !output.is_success() {
            let diagnostic = match stage.kind {
                StageKind::Execute => execution_transcript(&output),
                _ => output.diagnostic().to_string(),
            };
            return Err(failure(
                index,
                stage,
                FailureReason::NonZeroExit {
                    code: output.exit_code,
                },
                diagnostic,
                workspace,
            ));
        }

        match (stage.kind, output_path) {
            (StageKind::Compile | StageKind::Pass { .. }, Some(path)) => {
                // Tools echo their input name into the IR (`; ModuleID`,
                // `source_filename`); absolute names must not reach callers.
                let content = read_artifact(&path)
                    .await
                    .map(|ir| workspace.redact(&ir))
                    .map_err(|e| {
                        failure(index, stage, FailureReason::OutputMissing, e.to_string(), workspace)
                    })?;
                let diagnostic = Some(output.stderr.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| workspace.redact(s));
                let result = StageResult {
                    name: stage.name.clone(),
                    label: stage.label.clone(),
                    input: input.content.clone(),
                    output: content.clone(),
                    diagnostic,
                    duration_ms: output.duration.as_millis() as u64,
                };
                Ok(StageStep::Transformed {
                    result,
                    artifact: Artifact { path, content },
                })
            }
            (StageKind::Link, Some(path)) => {
                expect_artifact(&path).await.map_err(|e| {
                    failure(index, stage, FailureReason::OutputMissing, e.to_string(), workspace)
                })?;
                Ok(StageStep::Linked {
                    artifact: Artifact {
                        path,
                        content: String::new(),
                    },
                })
            }
            _ => Ok(StageStep::Executed {
                output: workspace.redact(&execution_transcript(&output)),
            }),
        }
    }
}

/// Name under which a tool running inside the workspace sees `path`.
///
/// A program about to be executed gets a `./` prefix so it is not looked up
/// on `PATH`.
fn workspace_name(path: &Path, executable: bool) -> PathBuf {
    let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf());
    if executable {
        Path::new(".").join(name)
    } else {
        name
    }
}

/// Builds a failure record with workspace paths stripped from the diagnostic.
fn failure(
    index: usize,
    stage: &StageDescriptor,
    reason: FailureReason,
    diagnostic: String,
    workspace: &Workspace,
) -> StageFailure {
    StageFailure {
        stage_index: index,
        stage: stage.name.clone(),
        kind: stage.kind,
        reason,
        diagnostic: workspace.redact(&diagnostic),
    }
}

/// Program output followed by its exit code.
fn execution_transcript(output: &ToolOutput) -> String {
    let mut text = output.combined();
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&format!("Program exited with code {}", output.exit_code));
    text
}
