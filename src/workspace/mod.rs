//! Per-run workspaces for ephemeral pipeline artifacts.
//!
//! Every pipeline run owns exactly one [`Workspace`]: a directory named
//! `ir-forge-<uuid>` under the configured root. All artifact paths handed
//! out by the workspace live inside that directory and are never reused
//! within a run.
//!
//! # Lifecycle
//!
//! ```text
//! WorkspaceManager::acquire() → Workspace → new_artifact_path()* → release()
//! ```
//!
//! `release()` runs at most once. If the owner never calls it (early return,
//! panic, or the run future being dropped on cancellation) the `Drop` impl
//! performs the same cleanup, so no exit path leaves files behind.
//!
//! # Example
//!
//! ```ignore
//! use ir_forge::workspace::WorkspaceManager;
//!
//! let manager = WorkspaceManager::new(std::env::temp_dir());
//! let mut workspace = manager.acquire()?;
//! let source = workspace.write_artifact("original", "cpp", "int main(){}")?;
//! // ... run tools against `source` ...
//! let report = workspace.release();
//! assert_eq!(report.failed, 0);
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::WorkspaceError;

/// Directory name prefix for every workspace.
pub const WORKSPACE_PREFIX: &str = "ir-forge-";

/// Allocates uniquely named workspaces under a shared root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager that allocates workspaces under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory workspaces are allocated under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a fresh workspace.
    ///
    /// The directory name comes from a random v4 UUID and is created with
    /// `create_dir` (not `create_dir_all`), so an existing directory is an
    /// error rather than a silently shared namespace.
    pub fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        std::fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::Create {
            path: self.root.clone(),
            source,
        })?;

        let id = Uuid::new_v4();
        let path = self.root.join(format!("{}{}", WORKSPACE_PREFIX, id));
        std::fs::create_dir(&path).map_err(|source| WorkspaceError::Create {
            path: path.clone(),
            source,
        })?;

        debug!(workspace = %id, path = %path.display(), "Acquired workspace");

        Ok(Workspace {
            id,
            path,
            issued: Vec::new(),
            released: false,
        })
    }
}

/// Outcome of releasing a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Issued paths that existed and were deleted.
    pub removed: usize,
    /// Issued paths that were never created by a tool.
    pub absent: usize,
    /// Deletions that failed (logged, never propagated).
    pub failed: usize,
}

/// A scoped, per-run namespace of artifact files.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    issued: Vec<PathBuf>,
    released: bool,
}

impl Workspace {
    /// Returns the unique identifier of this workspace.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every path issued so far, in issue order.
    pub fn issued(&self) -> &[PathBuf] {
        &self.issued
    }

    /// Returns true once the workspace has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Issues a new artifact path for `stage` with the given extension.
    ///
    /// Names are prefixed with the issue sequence number, so two calls for
    /// the same stage never return the same path.
    pub fn new_artifact_path(
        &mut self,
        stage: &str,
        extension: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        if self.released {
            return Err(WorkspaceError::Released);
        }

        let file_name = format!(
            "{:02}-{}.{}",
            self.issued.len(),
            sanitize_component(stage),
            sanitize_component(extension)
        );
        let path = self.path.join(file_name);
        self.issued.push(path.clone());
        Ok(path)
    }

    /// Issues a new artifact path and writes `contents` to it.
    pub fn write_artifact(
        &mut self,
        stage: &str,
        extension: &str,
        contents: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.new_artifact_path(stage, extension)?;
        std::fs::write(&path, contents).map_err(|source| WorkspaceError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Strips the workspace directory from `text`.
    ///
    /// Tool diagnostics quote the artifact paths they were given; callers
    /// only ever see the bare artifact file names.
    pub fn redact(&self, text: &str) -> String {
        let prefix = format!("{}{}", self.path.display(), std::path::MAIN_SEPARATOR);
        text.replace(&prefix, "")
            .replace(&self.path.display().to_string(), ".")
    }

    /// Deletes every issued path and then the workspace directory itself.
    ///
    /// Best effort: individual failures are logged and counted, never
    /// returned. Calling this more than once is a no-op.
    pub fn release(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        for path in &self.issued {
            match std::fs::remove_file(path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => report.absent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        workspace = %self.id,
                        path = %path.display(),
                        error = %e,
                        "Failed to delete artifact"
                    );
                }
            }
        }

        // Tools may leave files we never issued (e.g. a linker's temporaries).
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                report.failed += 1;
                warn!(
                    workspace = %self.id,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove workspace directory"
                );
            }
        }

        debug!(
            workspace = %self.id,
            removed = report.removed,
            absent = report.absent,
            failed = report.failed,
            "Released workspace"
        );

        report
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            debug!(workspace = %self.id, "Workspace dropped before release, cleaning up");
            self.release();
        }
    }
}

/// Restricts a file name component to `[A-Za-z0-9_-]`.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}
