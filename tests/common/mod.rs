//! Shared fixtures: a fake toolchain made of tiny `/bin/sh` scripts.
//!
//! - `cc.sh VERSION IN OUT` prefixes the source with a module header naming
//!   its input and working directory the way clang does, or fails like a
//!   compiler when the source contains `SYNTAX_ERROR`.
//! - `opt.sh PLUGIN PASS IN OUT` appends `; pass PASS` to the IR.
//! - `ld.sh IN OUT` drops a scratch file in its working directory and
//!   writes a shell script that prints a greeting and logs to `run.log`.
//! - The execute template is `/bin/sh {input}`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ir_forge::pipeline::{PipelineConfig, PipelineOrchestrator};
use tempfile::TempDir;

/// Source that the fake compiler accepts.
pub const VALID_SOURCE: &str = "int main(){return 0;}";

/// Source that the fake compiler rejects.
pub const INVALID_SOURCE: &str = "int main(){ SYNTAX_ERROR }";

/// How a fake pass misbehaves.
#[derive(Debug, Clone, Copy)]
pub enum PassBehavior {
    /// Exit 1 with a diagnostic.
    Fail,
    /// Exit 0 without writing the output.
    SkipOutput,
    /// Sleep far past any test timeout.
    Hang,
}

/// Builder for a fake toolchain and the orchestrator that drives it.
pub struct FakeToolchain {
    tools: TempDir,
    workspaces: TempDir,
    pass_behavior: Vec<(String, PassBehavior)>,
    program_exit: i32,
    program_hangs: bool,
    stage_timeout: Duration,
    execute_timeout: Duration,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            tools: TempDir::new().unwrap(),
            workspaces: TempDir::new().unwrap(),
            pass_behavior: Vec::new(),
            program_exit: 0,
            program_hangs: false,
            stage_timeout: Duration::from_secs(20),
            execute_timeout: Duration::from_secs(10),
        }
    }

    /// Makes the pass named `pass` (e.g. `sub`) misbehave.
    pub fn with_pass(mut self, pass: &str, behavior: PassBehavior) -> Self {
        self.pass_behavior.push((pass.to_string(), behavior));
        self
    }

    /// Makes the linked program exit with `code`.
    pub fn with_program_exit(mut self, code: i32) -> Self {
        self.program_exit = code;
        self
    }

    /// Makes the linked program loop forever after its greeting.
    pub fn with_hanging_program(mut self) -> Self {
        self.program_hangs = true;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// Directory holding the fake tools.
    pub fn tools_dir(&self) -> &Path {
        self.tools.path()
    }

    /// Directory under which workspaces are allocated.
    pub fn workspace_root(&self) -> &Path {
        self.workspaces.path()
    }

    /// File a hanging pass writes before it sleeps.
    pub fn hang_marker(&self) -> PathBuf {
        self.tools.path().join("hanging")
    }

    /// Number of entries left under the workspace root.
    pub fn leftover_entries(&self) -> usize {
        std::fs::read_dir(self.workspaces.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Writes the scripts and returns the matching configuration.
    pub fn config(&self) -> PipelineConfig {
        let dir = self.tools.path();

        write_script(
            &dir.join("cc.sh"),
            r#"if grep -q SYNTAX_ERROR "$2"; then
  echo "$2:1:13: error: use of undeclared identifier 'SYNTAX_ERROR'" >&2
  exit 1
fi
{
  echo "; ModuleID = '$2' (clang $1)"
  echo "; directory = \"$(pwd)\""
  cat "$2"
  echo
} > "$3"
"#,
        );

        let mut opt = String::new();
        for (pass, behavior) in &self.pass_behavior {
            let action = match behavior {
                PassBehavior::Fail => {
                    format!("echo \"opt: pass '{}' crashed on $3\" >&2\n  exit 1", pass)
                }
                PassBehavior::SkipOutput => "exit 0".to_string(),
                PassBehavior::Hang => format!(
                    "echo $$ > {}\n  exec sleep 30",
                    self.hang_marker().display()
                ),
            };
            opt.push_str(&format!("if [ \"$2\" = \"{}\" ]; then\n  {}\nfi\n", pass, action));
        }
        opt.push_str("{ cat \"$3\"; echo \"; pass $2 via $1\"; } > \"$4\"\n");
        write_script(&dir.join("opt.sh"), &opt);

        let program_tail = if self.program_hangs {
            "exec sleep 30".to_string()
        } else {
            format!("exit {}", self.program_exit)
        };
        write_script(
            &dir.join("ld.sh"),
            &format!(
                "test -f \"$1\" || exit 1\necho scratch > ld-scratch.tmp\nprintf 'echo \"Hello, World!\"\\necho ran > run.log\\n{}\\n' > \"$2\"\n",
                program_tail
            ),
        );

        PipelineConfig::default()
            .with_compile_command(format!(
                "/bin/sh {} {{version}} {{input}} {{output}}",
                dir.join("cc.sh").display()
            ))
            .with_pass_command(format!(
                "/bin/sh {} {{plugin}} {{pass}} {{input}} {{output}}",
                dir.join("opt.sh").display()
            ))
            .with_link_command(format!(
                "/bin/sh {} {{input}} {{output}}",
                dir.join("ld.sh").display()
            ))
            .with_execute_command("/bin/sh {input}")
            .with_pass_plugin("/opt/passes/libpasses.so")
            .with_workspace_root(self.workspaces.path())
            .with_stage_timeout(self.stage_timeout)
            .with_execute_timeout(self.execute_timeout)
    }

    pub fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        Arc::new(PipelineOrchestrator::new(self.config()).unwrap())
    }
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
}
