//! Engine configuration
//!
//! Read from `$XDG_CONFIG_HOME/recipe/config.toml` (or an explicit path),
//! then overridden by environment variables:
//!
//! - `RECIPE_WORK_DIR` - root of per-run working directories
//! - `RECIPE_STATE_DIR` - ledger and lock files
//! - `RECIPE_HTTP_TIMEOUT` - HTTP timeout in seconds
//! - `GOOGLE_OAUTH_ACCESS_TOKEN` - bearer token for `gs://` artifacts
//!
//! ```toml
//! work_dir = "/var/lib/recipe/work"
//! state_dir = "/var/lib/recipe/state"
//! http_timeout_secs = 120
//!
//! [package_tools]
//! dpkg = "/usr/bin/dpkg"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fetch::DEFAULT_GCS_ENDPOINT;
use crate::steps::PackageTools;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const MIN_HTTP_TIMEOUT_SECS: u64 = 5;
const MAX_HTTP_TIMEOUT_SECS: u64 = 300;

/// File name of the ledger inside the state dir
const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigToml {
    work_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    http_timeout_secs: Option<u64>,
    gcs_endpoint: Option<String>,
    package_tools: Option<PackageTools>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub work_dir: PathBuf,
    pub state_dir: PathBuf,
    pub http_timeout: Duration,
    pub gcs_endpoint: String,
    pub gcs_access_token: Option<String>,
    pub package_tools: PackageTools,
}

fn xdg_home(var: &str, fallback: Option<PathBuf>, default_rel: &str) -> PathBuf {
    if let Ok(raw) = std::env::var(var) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    fallback.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(default_rel)
    })
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    xdg_home("XDG_CONFIG_HOME", dirs::config_dir(), ".config")
        .join("recipe")
        .join("config.toml")
}

fn default_work_dir() -> PathBuf {
    xdg_home("XDG_DATA_HOME", dirs::data_local_dir(), ".local/share")
        .join("recipe")
        .join("work")
}

fn default_state_dir() -> PathBuf {
    // dirs::state_dir() is Linux-only; elsewhere keep state next to the data
    xdg_home(
        "XDG_STATE_HOME",
        dirs::state_dir().or_else(dirs::data_local_dir),
        ".local/state",
    )
    .join("recipe")
}

fn read_toml(path: &Path) -> Result<ConfigToml> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid TOML in {}", path.display()))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            state_dir: default_state_dir(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            gcs_endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
            gcs_access_token: None,
            package_tools: PackageTools::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location if it
    /// exists, and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(read_toml(p)?),
            None => {
                let default = default_config_path();
                if default.is_file() {
                    Some(read_toml(&default)?)
                } else {
                    None
                }
            }
        };
        Self::resolve(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigToml = toml::from_str(text).context("Invalid config TOML")?;
        Self::resolve(file, |_| None)
    }

    fn resolve(file: ConfigToml, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Config::default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = file.work_dir {
            cfg.work_dir = dir;
        }
        if let Some(dir) = file.state_dir {
            cfg.state_dir = dir;
        }
        if let Some(endpoint) = file.gcs_endpoint {
            cfg.gcs_endpoint = endpoint;
        }
        if let Some(tools) = file.package_tools {
            cfg.package_tools = tools;
        }
        let mut timeout = file.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        if let Some(dir) = env("RECIPE_WORK_DIR") {
            cfg.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("RECIPE_STATE_DIR") {
            cfg.state_dir = PathBuf::from(dir);
        }
        if let Some(raw) = env("RECIPE_HTTP_TIMEOUT") {
            timeout = raw
                .trim()
                .parse()
                .with_context(|| format!("RECIPE_HTTP_TIMEOUT must be seconds, got '{}'", raw))?;
        }
        cfg.gcs_access_token = env("GOOGLE_OAUTH_ACCESS_TOKEN");

        cfg.http_timeout =
            Duration::from_secs(timeout.clamp(MIN_HTTP_TIMEOUT_SECS, MAX_HTTP_TIMEOUT_SECS));
        Ok(cfg)
    }

    /// Path of the ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join(LEDGER_FILE)
    }
}
