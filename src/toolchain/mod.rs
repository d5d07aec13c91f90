//! Toolchain boundary: command templates and the tool invoker.
//!
//! The toolchain (compiler front end, optimizer with the pass plugin, linker)
//! is an opaque set of binaries. This module only knows how to turn a
//! configured template into an argv vector and how to run it:
//!
//! ```text
//! CommandTemplate --bind(Bindings)--> BoundCommand --ToolInvoker::run--> ToolOutput
//! ```

pub mod invoker;
pub mod template;

pub use invoker::{expect_artifact, read_artifact, ProcessInvoker, ToolInvoker, ToolOutput};
pub use template::{Bindings, BoundCommand, CommandTemplate, PLACEHOLDERS};
