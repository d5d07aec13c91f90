//! Command-line interface for ir-forge.
//!
//! Provides commands for serving the HTTP API, running a single pipeline
//! locally, and listing the obfuscation passes.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
