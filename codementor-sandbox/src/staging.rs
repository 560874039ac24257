//! Per-execution staging directory

use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Freshly created, uniquely named temporary directory owning every file
/// written for one execution: the source file, an optional project
/// manifest, and any compiled artifact.
///
/// The directory and all of its contents are removed recursively when the
/// staging area is dropped, which covers every exit path of the engine,
/// early returns and panics included.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("codementor-exec-")
            .tempdir()
            .context("failed to create staging directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write source text verbatim (UTF-8) under the staging root and return
    /// its absolute path
    pub fn write_source(&self, file_name: &str, code: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, code)
            .with_context(|| format!("failed to write source file {}", path.display()))?;
        Ok(path)
    }

    /// Create a project subdirectory with a generated manifest and the
    /// source rewritten as the toolchain's fixed entry-point filename.
    /// Returns the project directory path.
    pub fn scaffold_project(
        &self,
        manifest_name: &str,
        manifest: &str,
        entry_name: &str,
        code: &str,
    ) -> Result<PathBuf> {
        let project_dir = self.dir.path().join("Project");
        std::fs::create_dir(&project_dir)
            .with_context(|| format!("failed to create project dir {}", project_dir.display()))?;
        std::fs::write(project_dir.join(manifest_name), manifest)
            .context("failed to write project manifest")?;
        std::fs::write(project_dir.join(entry_name), code)
            .context("failed to write project entry point")?;
        Ok(project_dir)
    }
}
