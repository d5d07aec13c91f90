//! Compilation pipeline.
//!
//! This module turns a source snippet into LLVM IR, pushes the IR through
//! an ordered chain of obfuscation passes, links the result and runs it,
//! recording every intermediate IR artifact along the way.
//!
//! # Architecture
//!
//! - **Registry**: The fixed, ordered list of obfuscation passes
//! - **Request**: Validated caller input
//! - **Planner**: Pure request-to-plan mapping
//! - **Runner**: Executes a plan stage by stage through a tool invoker
//! - **Assembler**: Maps results onto response bodies
//! - **Orchestrator**: Ties the above to a scoped workspace per run
//!
//! # Pipeline Flow
//!
//! 1. **Validation**: Code, version and option keys are checked
//! 2. **Workspace**: A uniquely named directory is allocated
//! 3. **Planning**: `original → [passes in registry order] → link → execute`
//! 4. **Execution**: Each stage consumes the previous stage's artifact
//! 5. **Release**: Every artifact is deleted, whatever the outcome
//! 6. **Assembly**: Completed stages and the program output (or the failing
//!    stage and its diagnostic) are returned
//!
//! # Example
//!
//! ```rust,ignore
//! use ir_forge::pipeline::{ObfuscationOptions, PipelineConfig, PipelineOrchestrator};
//!
//! let orchestrator = PipelineOrchestrator::new(PipelineConfig::from_env()?)?;
//!
//! let options = ObfuscationOptions::new()
//!     .with_enabled(true)
//!     .with_flag("pluto_flattening", true);
//!
//! let response = orchestrator
//!     .compile(Some("int main() { return 0; }".to_string()), None, options)
//!     .await;
//!
//! println!("{} {}", response.status(), serde_json::to_string(response.body())?);
//! ```

pub mod assembler;
pub mod config;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod request;
pub mod result;
pub mod runner;

pub use assembler::{assemble, reject, CompileResponse, ErrorBody, ResponseBody, SuccessBody};
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{PipelineError, PipelineOrchestrator, PipelineStats};
pub use planner::{StageDescriptor, StageKind, StagePlan, StagePlanner};
pub use registry::{PassSpec, PASS_REGISTRY};
pub use request::{CompilationRequest, ObfuscationOptions};
pub use result::{FailureReason, PipelineResult, PipelineState, StageFailure, StageResult};
pub use runner::PipelineRunner;
