//! Step execution
//!
//! Dispatches one [`Step`] against the artifacts resolved for the current run.
//! The set of step kinds is closed: adding one is a new [`Step`] variant and
//! the `match` in [`StepExecutor::execute`] will not compile until it is
//! handled.
//!
//! Steps have no undo. When a step fails, the side effects of earlier steps
//! in the same run stay in place.

pub mod copy;
pub mod exec;
pub mod extract;
pub mod package;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::recipe::{ExecLocation, Step};

pub use package::{CommandPackageInstaller, PackageInstaller, PackageTools};

/// Look up a resolved artifact path by id.
pub fn resolve_artifact<'a>(artifact_paths: &'a BTreeMap<String, PathBuf>, id: &str) -> Result<&'a Path> {
    artifact_paths
        .get(id)
        .map(PathBuf::as_path)
        .ok_or_else(|| Error::ArtifactNotFound(id.to_string()))
}

/// Executes steps; package installs are delegated to the injected installer.
#[derive(Clone)]
pub struct StepExecutor {
    packages: Arc<dyn PackageInstaller>,
}

impl StepExecutor {
    pub fn new(packages: Arc<dyn PackageInstaller>) -> Self {
        Self { packages }
    }

    /// Run `step` with `work_dir` as its private working directory.
    ///
    /// `env` holds `KEY=VALUE` entries added to every subprocess. Artifact
    /// references are resolved before anything touches the filesystem.
    pub fn execute(
        &self,
        step: &Step,
        artifact_paths: &BTreeMap<String, PathBuf>,
        env: &[String],
        work_dir: &Path,
    ) -> Result<()> {
        if let Some(id) = step.artifact_id() {
            resolve_artifact(artifact_paths, id)?;
        }

        match step {
            Step::FileCopy {
                artifact_id,
                destination,
                overwrite,
                permissions,
            } => {
                let src = resolve_artifact(artifact_paths, artifact_id)?;
                copy::copy_file(src, Path::new(destination), *overwrite, permissions)
            }
            Step::ArchiveExtraction {
                artifact_id,
                destination,
                archive_type,
            } => {
                let archive = resolve_artifact(artifact_paths, artifact_id)?;
                extract::extract(archive, Path::new(destination), *archive_type)
            }
            Step::PackageFileInstallation { artifact_id, kind } => {
                let package = resolve_artifact(artifact_paths, artifact_id)?;
                self.packages.install(*kind, package)
            }
            Step::FileExec { location, args } => {
                let program = match location {
                    ExecLocation::LocalPath(path) => PathBuf::from(path),
                    ExecLocation::ArtifactId(id) => {
                        let path = resolve_artifact(artifact_paths, id)?;
                        exec::mark_executable(path)?;
                        path.to_path_buf()
                    }
                };
                std::fs::create_dir_all(work_dir)?;
                exec::run_file(&program, args, env, work_dir)
            }
            Step::ScriptRun {
                body,
                args,
                interpreter,
            } => {
                std::fs::create_dir_all(work_dir)?;
                exec::run_script(body, args, *interpreter, env, work_dir)
            }
        }
    }
}
