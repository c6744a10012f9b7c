//! Package file installation via the platform package tool.
//!
//! The engine does not read package formats; it resolves the artifact and
//! hands it to `dpkg`, `rpm` or `msiexec`.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use super::exec::run_command;
use crate::error::Result;
use crate::output;
use crate::recipe::PackageKind;

/// Installs a local package file of a given kind.
pub trait PackageInstaller: Send + Sync {
    fn install(&self, kind: PackageKind, package: &Path) -> Result<()>;
}

/// Paths of the platform package tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackageTools {
    pub dpkg: PathBuf,
    pub rpm: PathBuf,
    pub msiexec: PathBuf,
}

impl Default for PackageTools {
    fn default() -> Self {
        Self {
            dpkg: PathBuf::from("dpkg"),
            rpm: PathBuf::from("rpm"),
            msiexec: PathBuf::from("msiexec.exe"),
        }
    }
}

/// Default installer: runs the configured tool as a subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandPackageInstaller {
    tools: PackageTools,
}

impl CommandPackageInstaller {
    pub fn new(tools: PackageTools) -> Self {
        Self { tools }
    }

    /// Build the tool invocation for `package`.
    pub fn command(&self, kind: PackageKind, package: &Path) -> Command {
        match kind {
            PackageKind::Dpkg => {
                let mut cmd = Command::new(&self.tools.dpkg);
                cmd.env("DEBIAN_FRONTEND", "noninteractive");
                cmd.arg("--install").arg(package);
                cmd
            }
            PackageKind::Rpm => {
                let mut cmd = Command::new(&self.tools.rpm);
                cmd.args(["--upgrade", "--replacepkgs", "--verbose"]).arg(package);
                cmd
            }
            PackageKind::Msi => {
                let mut cmd = Command::new(&self.tools.msiexec);
                cmd.arg("/i").arg(package).args(["/qn", "/norestart"]);
                cmd
            }
        }
    }
}

impl PackageInstaller for CommandPackageInstaller {
    fn install(&self, kind: PackageKind, package: &Path) -> Result<()> {
        output::detail(&format!("installing {} package {}", kind, package.display()));
        run_command(&mut self.command(kind, package))
    }
}
