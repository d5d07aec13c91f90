//! Results of a pipeline run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::planner::StageKind;

/// Provenance record for one completed non-terminal stage.
///
/// Both the input and the output artifact are inlined so a caller can diff
/// any two adjacent stages without the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    /// Stage name (`original` or a pass option key).
    pub name: String,
    /// Human-readable label.
    #[serde(rename = "stageName")]
    pub label: String,
    /// Content the stage consumed.
    pub input: String,
    /// Content the stage produced.
    pub output: String,
    /// Warnings the tool printed while still succeeding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Wall-clock duration of the stage in milliseconds.
    pub duration_ms: u64,
}

/// Pipeline state machine.
///
/// `Pending → Running(i) → … → Succeeded | Failed(i)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No stage has started.
    Pending,
    /// The stage at `stage_index` is running.
    Running { stage_index: usize },
    /// Every stage succeeded.
    Succeeded,
    /// The stage at `stage_index` failed; later stages never ran.
    Failed { stage_index: usize },
}

impl PipelineState {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Pending => write!(f, "pending"),
            PipelineState::Running { stage_index } => write!(f, "running({})", stage_index),
            PipelineState::Succeeded => write!(f, "succeeded"),
            PipelineState::Failed { stage_index } => write!(f, "failed({})", stage_index),
        }
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The tool exited with a non-zero code.
    NonZeroExit { code: i32 },
    /// The tool outlived its time budget and was killed.
    Timeout,
    /// The tool exited 0 but its output artifact is missing or unreadable.
    OutputMissing,
    /// The tool could not be started.
    ExecutionFailed,
    /// The workspace could not hold the stage's artifact.
    Workspace,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NonZeroExit { code } => write!(f, "exit code {}", code),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::OutputMissing => write!(f, "output missing"),
            FailureReason::ExecutionFailed => write!(f, "execution failed"),
            FailureReason::Workspace => write!(f, "workspace error"),
        }
    }
}

/// The failing stage of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Index of the failing stage in the plan.
    pub stage_index: usize,
    /// Name of the failing stage.
    pub stage: String,
    /// Kind of the failing stage.
    pub kind: StageKind,
    /// Why it failed.
    pub reason: FailureReason,
    /// Diagnostic text, free of workspace paths.
    pub diagnostic: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    run_id: Uuid,
    state: PipelineState,
    stages: Vec<StageResult>,
    execution_output: Option<String>,
    failure: Option<StageFailure>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Creates a successful result.
    pub fn succeeded(
        run_id: Uuid,
        stages: Vec<StageResult>,
        execution_output: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            state: PipelineState::Succeeded,
            stages,
            execution_output: Some(execution_output),
            failure: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Creates a failed result carrying the stages completed before the failure.
    pub fn failed(
        run_id: Uuid,
        stages: Vec<StageResult>,
        failure: StageFailure,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            state: PipelineState::Failed {
                stage_index: failure.stage_index,
            },
            stages,
            execution_output: None,
            failure: Some(failure),
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Returns the run identifier (the workspace id).
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the final state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns true if every stage succeeded.
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    /// Returns completed stage results in provenance order.
    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    /// Returns stage names in provenance order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the program output, present only on success.
    pub fn execution_output(&self) -> Option<&str> {
        self.execution_output.as_deref()
    }

    /// Returns the failure, present only on failure.
    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Returns when the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run finished.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Consumes the result, returning its stage log.
    pub fn into_stages(self) -> Vec<StageResult> {
        self.stages
    }
}
