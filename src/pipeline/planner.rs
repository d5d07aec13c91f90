//! Stage planning.
//!
//! [`StagePlanner::plan`] is a pure function of the request: it performs no
//! I/O and consults only the configured templates and the pass registry.
//! Every plan has the shape
//!
//! ```text
//! original → [enabled passes in registry order] → link → execute
//! ```

use std::time::Duration;

use super::config::{ConfigError, PipelineConfig};
use super::registry::PASS_REGISTRY;
use super::request::CompilationRequest;
use crate::toolchain::CommandTemplate;

/// Name of the initial compilation stage.
pub const ORIGINAL_STAGE: &str = "original";
/// Name of the link stage.
pub const LINK_STAGE: &str = "link";
/// Name of the execute stage.
pub const EXECUTE_STAGE: &str = "execute";

/// What a stage does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Source text to IR.
    Compile,
    /// IR to IR through one named pass.
    Pass {
        /// Pass name bound to `{pass}`.
        pass: &'static str,
    },
    /// IR to executable.
    Link,
    /// Run the executable.
    Execute,
}

impl StageKind {
    /// Terminal stages produce no inspectable IR artifact.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageKind::Link | StageKind::Execute)
    }

    /// Extension of the artifact this stage writes, if any.
    pub fn output_extension(&self) -> Option<&'static str> {
        match self {
            StageKind::Compile | StageKind::Pass { .. } => Some("ll"),
            StageKind::Link => Some("out"),
            StageKind::Execute => None,
        }
    }
}

/// One planned stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Stage name, unique within a plan.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// What the stage does.
    pub kind: StageKind,
    /// Command template the stage expands to.
    pub command: CommandTemplate,
    /// Time budget for the stage's tool invocation.
    pub timeout: Duration,
}

impl StageDescriptor {
    /// Returns true for link and execute stages.
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

/// An ordered, read-only list of stages.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<StageDescriptor>,
}

impl StagePlan {
    /// Returns the stages in execution order.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    /// Returns the number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the plan has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage at `index`.
    pub fn get(&self, index: usize) -> Option<&StageDescriptor> {
        self.stages.get(index)
    }

    /// Returns stage names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the number of stages that produce an IR artifact.
    pub fn non_terminal_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.is_terminal()).count()
    }
}

/// Builds stage plans from requests.
#[derive(Debug, Clone)]
pub struct StagePlanner {
    compile: CommandTemplate,
    pass: CommandTemplate,
    link: CommandTemplate,
    execute: CommandTemplate,
    stage_timeout: Duration,
    execute_timeout: Duration,
}

impl StagePlanner {
    /// Creates a planner from the configured templates and timeouts.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            compile: config.compile_template()?,
            pass: config.pass_template()?,
            link: config.link_template()?,
            execute: config.execute_template()?,
            stage_timeout: config.stage_timeout,
            execute_timeout: config.execute_timeout,
        })
    }

    /// Plans the stages for `request`.
    pub fn plan(&self, request: &CompilationRequest) -> StagePlan {
        let mut stages = vec![StageDescriptor {
            name: ORIGINAL_STAGE.to_string(),
            label: "Original".to_string(),
            kind: StageKind::Compile,
            command: self.compile.clone(),
            timeout: self.stage_timeout,
        }];

        let options = request.options();
        if options.enabled {
            stages.extend(
                PASS_REGISTRY
                    .iter()
                    .filter(|spec| options.is_set(spec.name))
                    .map(|spec| StageDescriptor {
                        name: spec.name.to_string(),
                        label: spec.label.to_string(),
                        kind: StageKind::Pass { pass: spec.pass },
                        command: self.pass.clone(),
                        timeout: self.stage_timeout,
                    }),
            );
        }

        stages.push(StageDescriptor {
            name: LINK_STAGE.to_string(),
            label: "Link".to_string(),
            kind: StageKind::Link,
            command: self.link.clone(),
            timeout: self.stage_timeout,
        });

        stages.push(StageDescriptor {
            name: EXECUTE_STAGE.to_string(),
            label: "Execute".to_string(),
            kind: StageKind::Execute,
            command: self.execute.clone(),
            timeout: self.execute_timeout,
        });

        StagePlan { stages }
    }
}
