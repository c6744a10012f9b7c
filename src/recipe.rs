//! Recipe data model.
//!
//! A recipe is a declarative unit of desired software state: a set of remote
//! artifacts plus ordered install and update steps. Recipes are loaded from
//! TOML or JSON and are never mutated once loaded.
//!
//! ```toml
//! name = "demo"
//! version = "1.0"
//! desiredState = "INSTALLED"
//!
//! [[artifacts]]
//! id = "a1"
//! uri = "https://example.com/tool"
//! checksum = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
//!
//! [[installSteps]]
//! type = "fileExec"
//! location = { artifactId = "a1" }
//! args = ["--flag"]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesiredState {
    /// Apply once per name; later versions are ignored.
    #[default]
    Installed,
    /// Re-apply with `updateSteps` whenever a strictly newer version arrives.
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub name: String,
    /// Dotted version; empty means unversioned.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub desired_state: DesiredState,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub install_steps: Vec<Step>,
    #[serde(default)]
    pub update_steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub uri: String,
    /// Hex SHA-256 of the content; empty means unchecked.
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub allow_insecure: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.bz2")]
    TarBz2,
    #[serde(rename = "tar.lzma")]
    TarLzma,
    #[serde(rename = "tar.xz")]
    TarXz,
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArchiveType::Unspecified => "unspecified",
            ArchiveType::Zip => "zip",
            ArchiveType::Tar => "tar",
            ArchiveType::TarGz => "tar.gz",
            ArchiveType::TarBz2 => "tar.bz2",
            ArchiveType::TarLzma => "tar.lzma",
            ArchiveType::TarXz => "tar.xz",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Msi,
    Dpkg,
    Rpm,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageKind::Msi => "msi",
            PackageKind::Dpkg => "dpkg",
            PackageKind::Rpm => "rpm",
        };
        f.write_str(s)
    }
}

/// Where a `FileExec` step finds its executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecLocation {
    LocalPath(String),
    ArtifactId(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpreter {
    /// Execute the script file directly (it must carry its own shebang).
    None,
    /// `/bin/sh` on Unix, `cmd.exe` on Windows.
    #[default]
    Shell,
    Powershell,
}

/// One unit of work. Steps run strictly in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    FileCopy {
        artifact_id: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
        /// Octal mode string such as `"0755"`; empty keeps the default.
        #[serde(default)]
        permissions: String,
    },
    ArchiveExtraction {
        artifact_id: String,
        destination: String,
        #[serde(default)]
        archive_type: ArchiveType,
    },
    PackageFileInstallation {
        artifact_id: String,
        kind: PackageKind,
    },
    FileExec {
        location: ExecLocation,
        #[serde(default)]
        args: Vec<String>,
    },
    ScriptRun {
        body: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        interpreter: Interpreter,
    },
}

impl Step {
    /// Name used for the step's working directory (`step<NN>_<kind>`).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::FileCopy { .. } => "FileCopy",
            Step::ArchiveExtraction { .. } => "ArchiveExtraction",
            Step::PackageFileInstallation { .. } => "PackageFileInstallation",
            Step::FileExec { .. } => "FileExec",
            Step::ScriptRun { .. } => "ScriptRun",
        }
    }

    /// Artifact id this step depends on, if any.
    pub fn artifact_id(&self) -> Option<&str> {
        match self {
            Step::FileCopy { artifact_id, .. }
            | Step::ArchiveExtraction { artifact_id, .. }
            | Step::PackageFileInstallation { artifact_id, .. } => Some(artifact_id),
            Step::FileExec {
                location: ExecLocation::ArtifactId(id),
                ..
            } => Some(id),
            Step::FileExec { .. } | Step::ScriptRun { .. } => None,
        }
    }
}

impl Recipe {
    /// Load a recipe from a `.json` or `.toml` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let recipe: Recipe = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse recipe: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse recipe: {}", path.display()))?
        };
        Ok(recipe)
    }

    /// Directory segment for this recipe: `name` or `name_version`.
    pub fn dir_name(&self) -> String {
        if self.version.is_empty() {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, self.version)
        }
    }

    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    /// Check the recipe is self-consistent. Performs no IO.
    ///
    /// A step referencing an undeclared artifact is an `ArtifactNotFound`
    /// configuration error.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::InvalidRecipe("recipe name is empty".into()));
        }
        // Name and version become directory names.
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if value == ".." || value.contains(['/', '\\']) {
                return Err(Error::InvalidRecipe(format!(
                    "recipe {} '{}' must not contain path separators",
                    field, value
                )));
            }
        }

        let mut ids = HashSet::new();
        for artifact in &self.artifacts {
            if artifact.id.is_empty() {
                return Err(Error::InvalidRecipe("artifact with empty id".into()));
            }
            // Ids name the downloaded file and an environment variable.
            if artifact.id.contains(['/', '\\', '=']) || artifact.id == ".." || artifact.id == "." {
                return Err(Error::InvalidRecipe(format!(
                    "artifact id '{}' must not contain '/', '\\' or '='",
                    artifact.id
                )));
            }
            if !ids.insert(artifact.id.as_str()) {
                return Err(Error::InvalidRecipe(format!(
                    "duplicate artifact id '{}'",
                    artifact.id
                )));
            }
        }

        for step in self.install_steps.iter().chain(&self.update_steps) {
            if let Some(id) = step.artifact_id()
                && !ids.contains(id)
            {
                return Err(Error::ArtifactNotFound(id.to_string()));
            }
        }
        Ok(())
    }
}
