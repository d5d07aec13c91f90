//! ir-forge: LLVM IR obfuscation pipeline.
//!
//! Compiles a C/C++ snippet to LLVM IR, applies an ordered chain of
//! obfuscation passes, links and runs the result, and reports the IR after
//! every stage so callers can diff what each pass did.

// Core modules
pub mod cli;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod toolchain;
pub mod workspace;

// Re-export commonly used error types
pub use error::{RequestError, ServerError, ToolError, WorkspaceError};
