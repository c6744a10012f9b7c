//! Declarative software recipe engine
//!
//! A recipe names a piece of software, the remote artifacts it needs and the
//! ordered steps that install or update it. The engine fetches and verifies
//! artifacts, runs the steps in an isolated per-run directory and records the
//! result in a ledger so that a recipe is applied at most once per version.
//!
//! # Example Recipe
//!
//! ```toml
//! name = "demo"
//! version = "1.0"
//! desiredState = "INSTALLED"
//!
//! [[artifacts]]
//! id = "installer"
//! uri = "https://example.com/demo-installer.sh"
//! checksum = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
//!
//! [[installSteps]]
//! type = "fileExec"
//! location = { artifactId = "installer" }
//! args = ["--flag"]
//! ```
//!
//! # Step Kinds
//!
//! - `fileCopy` - copy an artifact to a destination, optionally setting its mode
//! - `archiveExtraction` - unpack a zip or tar archive, refusing unsafe members
//! - `packageFileInstallation` - hand a `.deb`, `.rpm` or `.msi` to its package tool
//! - `fileExec` - run a local program or a downloaded artifact
//! - `scriptRun` - run an inline script through sh, cmd or PowerShell
//!
//! # Variables Available to Steps
//!
//! - `RECIPE_NAME`, `RECIPE_VERSION` - from the recipe
//! - `RUNID` - id of the current run
//! - `<artifact id>` - local path of each fetched artifact
//! - `PWD` - the step's working directory

pub mod config;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod lock;
pub mod output;
pub mod paths;
pub mod recipe;
pub mod runner;
pub mod steps;
pub mod version;

pub use config::Config;
pub use error::{ApplyError, Error, Stage};
pub use fetch::Fetcher;
pub use ledger::{FileLedger, Ledger, LedgerEntry, MemoryLedger};
pub use recipe::{DesiredState, Recipe, Step};
pub use runner::{Outcome, RecipeRunner, RunContext};
pub use steps::{PackageInstaller, StepExecutor};
