//! Engine error types.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the fetcher, step executor, ledger and version comparator.
///
/// Every variant is fatal to the recipe application that produced it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("unsupported protocol in uri: {0}")]
    UnsupportedProtocol(String),

    #[error("fetch of {uri} failed: {reason}")]
    FetchFailed { uri: String, reason: String },

    #[error("checksum mismatch for {uri}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        uri: String,
        expected: String,
        actual: String,
    },

    #[error("artifact '{0}' is not declared by the recipe")]
    ArtifactNotFound(String),

    #[error("archive member escapes destination {}: {member}", .dest.display())]
    PathTraversal { dest: PathBuf, member: String },

    #[error("unsupported archive type: {0}")]
    UnsupportedArchiveType(String),

    #[error("command failed: {cmd} (exit code: {code:?})\n{output}")]
    SubprocessFailed {
        cmd: String,
        code: Option<i32>,
        output: String,
    },

    #[error("ledger error at {}: {reason}", .path.display())]
    LedgerIo { path: PathBuf, reason: String },

    #[error("invalid permissions '{0}': expected an octal mode such as 0755")]
    InvalidPermissions(String),

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runner state in which an application failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decide,
    Fetching,
    Executing,
    Recording,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Decide => "deciding",
            Stage::Fetching => "fetching",
            Stage::Executing => "executing",
            Stage::Recording => "recording",
        };
        f.write_str(s)
    }
}

/// Error surfaced by [`crate::runner::RecipeRunner::apply`].
///
/// Wraps the first underlying [`Error`] with the recipe, the stage and, where
/// known, the artifact id or step index that failed.
#[derive(Error, Debug)]
#[error("recipe '{recipe}' failed while {stage}{}: {source}", .location.as_deref().map(|l| format!(" ({l})")).unwrap_or_default())]
pub struct ApplyError {
    pub recipe: String,
    pub stage: Stage,
    pub location: Option<String>,
    #[source]
    pub source: Error,
}

impl ApplyError {
    pub(crate) fn new(recipe: &str, stage: Stage, source: Error) -> Self {
        Self {
            recipe: recipe.to_string(),
            stage,
            location: None,
            source,
        }
    }

    pub(crate) fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
