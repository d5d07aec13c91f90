//! Maps pipeline outcomes onto response bodies.
//!
//! The assembler is transport-agnostic: it yields a status code and a
//! serializable body, and the HTTP layer only copies them onto the wire.
//! Nothing assembled here carries a workspace path.

use serde::Serialize;
use tracing::error;

use super::planner::StageKind;
use super::result::{FailureReason, PipelineResult, StageFailure, StageResult};
use crate::error::{RequestError, WorkspaceError};

/// Status code of a successful run.
pub const STATUS_OK: u16 = 200;
/// Status code of a rejected request.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Status code of a failed run.
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Body of a successful run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody {
    /// One entry per non-terminal stage, in provenance order.
    pub obfuscation_results: Vec<StageResult>,
    /// Program output followed by its exit-code trailer.
    pub execution_output: String,
}

/// Body of a rejected request or a failed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Short description of what failed.
    pub error: String,
    /// Diagnostic text from the failing tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Name of the failing stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    /// Stages completed before the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obfuscation_results: Option<Vec<StageResult>>,
}

impl ErrorBody {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            failed_stage: None,
            obfuscation_results: None,
        }
    }
}

/// Body of a response, either shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Every stage succeeded.
    Success(SuccessBody),
    /// The request was rejected or a stage failed.
    Error(ErrorBody),
}

/// A response ready to be written out.
#[derive(Debug, Clone)]
pub struct CompileResponse {
    status: u16,
    body: ResponseBody,
}

impl CompileResponse {
    fn error(status: u16, body: ErrorBody) -> Self {
        Self {
            status,
            body: ResponseBody::Error(body),
        }
    }

    /// Returns the status code for this response.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the body.
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Returns true for a successful run.
    pub fn is_success(&self) -> bool {
        matches!(self.body, ResponseBody::Success(_))
    }

    /// Consumes the response, returning its body.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// Builds the response for a finished run.
///
/// On failure only the stages strictly before the failing stage are
/// reported, so the caller can inspect every artifact that was produced.
pub fn assemble(result: PipelineResult) -> CompileResponse {
    let failure = result.failure().cloned();
    let execution_output = result.execution_output().map(str::to_string);
    let mut stages = result.into_stages();

    match failure {
        None => CompileResponse {
            status: STATUS_OK,
            body: ResponseBody::Success(SuccessBody {
                obfuscation_results: stages,
                execution_output: execution_output.unwrap_or_default(),
            }),
        },
        Some(failure) => {
            stages.truncate(failure.stage_index);
            CompileResponse::error(
                STATUS_INTERNAL_ERROR,
                ErrorBody {
                    error: failure_message(&failure),
                    details: Some(failure.diagnostic),
                    failed_stage: Some(failure.stage),
                    obfuscation_results: Some(stages),
                },
            )
        }
    }
}

/// Builds the response for a request that failed validation.
pub fn reject(err: &RequestError) -> CompileResponse {
    CompileResponse::error(STATUS_BAD_REQUEST, ErrorBody::message(err.to_string()))
}

/// Builds the response for a run that could not get a workspace.
///
/// The full error (with its path) is logged; the caller sees only its kind.
pub fn internal_error(err: &WorkspaceError) -> CompileResponse {
    error!(error = %err, "Failed to prepare workspace");
    let details = match err {
        WorkspaceError::Create { .. } => "Failed to create workspace",
        WorkspaceError::Write { .. } => "Failed to write workspace artifact",
        WorkspaceError::Released => "Workspace already released",
    };
    CompileResponse::error(
        STATUS_INTERNAL_ERROR,
        ErrorBody {
            details: Some(details.to_string()),
            ..ErrorBody::message("Internal server error")
        },
    )
}

fn failure_message(failure: &StageFailure) -> String {
    if failure.reason == FailureReason::Workspace {
        return "Internal server error".to_string();
    }
    match failure.kind {
        StageKind::Compile => "Compilation failed".to_string(),
        StageKind::Pass { .. } => format!("Obfuscation pass '{}' failed", failure.stage),
        StageKind::Link => "Linking failed".to_string(),
        StageKind::Execute => "Execution failed".to_string(),
    }
}
