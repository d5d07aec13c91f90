//! Error types for ir-forge operations.
//!
//! Defines error types for the subsystems below the HTTP boundary:
//! - Workspace allocation and artifact I/O
//! - External tool invocation
//! - Request validation
//! - Server startup

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while allocating or writing into a per-run workspace.
///
/// Cleanup failures never appear here; they are logged and swallowed by
/// [`crate::workspace::Workspace::release`].
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace directory '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace already released")]
    Released,
}

/// Errors that can occur while invoking an external tool.
///
/// A non-zero exit code is not an error: it is returned as data in
/// [`crate::toolchain::ToolOutput`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to execute '{program}': {reason}")]
    ExecutionFailed { program: String, reason: String },

    #[error("'{program}' timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("Tool reported success but output '{path}' is missing")]
    OutputMissing { path: PathBuf },

    #[error("Invalid command template: {0}")]
    InvalidTemplate(String),

    #[error("Unknown placeholder '{{{name}}}' in template '{template}'")]
    UnknownPlaceholder { template: String, name: String },

    #[error("Placeholder '{{{name}}}' has no value bound")]
    UnboundPlaceholder { name: String },
}

/// Errors in the caller-supplied compilation request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("No code provided")]
    MissingCode,

    #[error("Invalid LLVM version '{0}'")]
    InvalidVersion(String),

    #[error("Unsupported LLVM version '{version}' (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("Unknown obfuscation option: {0}")]
    UnknownOption(String),
}

/// Errors that stop the HTTP server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to initialize metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
