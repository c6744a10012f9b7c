//! Recipe runner
//!
//! Drives one recipe application through
//! `Decide -> Fetching -> Executing -> Recorded`:
//!
//! 1. **Decide** - validate the recipe, take the per-name lock and consult
//!    the ledger. An `INSTALLED` recipe found in the ledger is done. An
//!    `UPDATED` recipe runs its update steps only when its version is
//!    strictly greater than the recorded one.
//! 2. **Fetching** - download every artifact into a fresh run directory.
//! 3. **Executing** - run the chosen steps in order, each with its own
//!    `step<NN>_<Kind>` directory. The first failure aborts the rest.
//! 4. **Recorded** - write `(name, version, success)` to the ledger.
//!
//! Any failure is returned as an [`ApplyError`] and leaves the ledger
//! untouched, so the next application starts over from the beginning.
//! Side effects of steps that already ran are not rolled back.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{ApplyError, Error, Stage};
use crate::fetch::{Fetcher, GcsBlobStore, UreqHttpClient};
use crate::ledger::{FileLedger, Ledger};
use crate::lock;
use crate::output;
use crate::recipe::{DesiredState, Recipe, Step};
use crate::steps::{CommandPackageInstaller, PackageInstaller, StepExecutor};
use crate::version;

/// Result of a successful application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not in the ledger; install steps ran.
    Installed,
    /// Newer version than the ledger; update steps ran.
    Updated,
    /// `INSTALLED` recipe already in the ledger; nothing ran.
    AlreadyInstalled,
    /// `UPDATED` recipe not newer than the ledger; nothing ran.
    UpToDate,
}

impl Outcome {
    /// Whether any steps ran.
    pub fn changed(self) -> bool {
        matches!(self, Outcome::Installed | Outcome::Updated)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Installed => "installed",
            Outcome::Updated => "updated",
            Outcome::AlreadyInstalled => "already installed",
            Outcome::UpToDate => "up to date",
        };
        f.write_str(s)
    }
}

static LAST_RUN_ID: AtomicU64 = AtomicU64::new(0);

/// Next run id: the current unix time in nanoseconds, bumped when needed so
/// ids handed out by this process strictly increase.
fn next_run_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut last = LAST_RUN_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_RUN_ID.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// State of one recipe application.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: u64,
    /// `<work_dir>/<name>[_<version>]/<run_id>`
    pub run_dir: PathBuf,
    pub artifact_paths: BTreeMap<String, PathBuf>,
    /// `KEY=VALUE` entries passed to every subprocess
    pub env: Vec<String>,
}

impl RunContext {
    pub fn new(work_dir: &Path, recipe: &Recipe) -> Self {
        let run_id = next_run_id();
        Self {
            run_id,
            run_dir: work_dir.join(recipe.dir_name()).join(run_id.to_string()),
            artifact_paths: BTreeMap::new(),
            env: vec![
                format!("RECIPE_NAME={}", recipe.name),
                format!("RECIPE_VERSION={}", recipe.version),
                format!("RUNID={}", run_id),
            ],
        }
    }

    /// Register fetched artifacts and expose each as `<id>=<path>`.
    pub fn add_artifacts(&mut self, paths: BTreeMap<String, PathBuf>) {
        for (id, path) in paths {
            self.env.push(format!("{}={}", id, path.display()));
            self.artifact_paths.insert(id, path);
        }
    }

    /// Working directory of the step at `index`.
    pub fn step_dir(&self, index: usize, step: &Step) -> PathBuf {
        self.run_dir
            .join(format!("step{:02}_{}", index, step.kind_name()))
    }
}

/// Applies recipes using injected fetch, package and ledger capabilities.
pub struct RecipeRunner {
    work_dir: PathBuf,
    state_dir: PathBuf,
    fetcher: Fetcher,
    steps: StepExecutor,
    ledger: Arc<dyn Ledger>,
}

impl RecipeRunner {
    pub fn new(
        config: &Config,
        fetcher: Fetcher,
        packages: Arc<dyn PackageInstaller>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            state_dir: config.state_dir.clone(),
            fetcher,
            steps: StepExecutor::new(packages),
            ledger,
        }
    }

    /// Runner wired to the real network, package tools and file ledger.
    pub fn from_config(config: &Config) -> Self {
        let http = UreqHttpClient::new(config.http_timeout);
        let blobs = GcsBlobStore::new(
            UreqHttpClient::new(config.http_timeout),
            config.gcs_endpoint.clone(),
            config.gcs_access_token.clone(),
        );
        Self::new(
            config,
            Fetcher::new(Arc::new(http), Arc::new(blobs)),
            Arc::new(CommandPackageInstaller::new(config.package_tools.clone())),
            Arc::new(FileLedger::new(config.ledger_path())),
        )
    }

    /// Apply `recipe`, returning what was done.
    pub fn apply(&self, recipe: &Recipe) -> Result<Outcome, ApplyError> {
        let name = recipe.name.as_str();
        let failed = |stage: Stage| move |e: Error| ApplyError::new(name, stage, e);

        // Decide
        recipe.validate().map_err(failed(Stage::Decide))?;
        version::parse(&recipe.version).map_err(failed(Stage::Decide))?;
        let _lock = lock::acquire(&self.state_dir, name).map_err(failed(Stage::Decide))?;

        let found = self.ledger.lookup(name).map_err(failed(Stage::Decide))?;
        let (steps, outcome) = match (found, recipe.desired_state) {
            (None, _) => (&recipe.install_steps, Outcome::Installed),
            (Some(entry), DesiredState::Installed) => {
                output::skip(&format!(
                    "{} already installed ({})",
                    name,
                    version::format(&entry.version)
                ));
                return Ok(Outcome::AlreadyInstalled);
            }
            (Some(entry), DesiredState::Updated) => {
                if !version::greater(&entry.version, &recipe.version).map_err(failed(Stage::Decide))? {
                    output::skip(&format!(
                        "{} is up to date ({} recorded, {} requested)",
                        name,
                        version::format(&entry.version),
                        if recipe.version.is_empty() { "<none>" } else { recipe.version.as_str() }
                    ));
                    return Ok(Outcome::UpToDate);
                }
                (&recipe.update_steps, Outcome::Updated)
            }
        };

        output::action(&format!("Applying {}", recipe.dir_name()));
        let mut ctx = RunContext::new(&self.work_dir, recipe);

        // Fetching
        output::sub_action("fetch");
        std::fs::create_dir_all(&ctx.run_dir)
            .map_err(|e| ApplyError::new(name, Stage::Fetching, e.into()))?;
        let paths = self
            .fetcher
            .fetch_all(&recipe.artifacts, &ctx.run_dir)
            .map_err(|e| {
                ApplyError::new(name, Stage::Fetching, e.source).at(format!("artifact {}", e.artifact_id))
            })?;
        ctx.add_artifacts(paths);

        // Executing
        output::sub_action("execute");
        for (index, step) in steps.iter().enumerate() {
            output::detail(&format!("step {}: {}", index, step.kind_name()));
            let work_dir = ctx.step_dir(index, step);
            self.steps
                .execute(step, &ctx.artifact_paths, &ctx.env, &work_dir)
                .map_err(|e| {
                    ApplyError::new(name, Stage::Executing, e)
                        .at(format!("step {}: {}", index, step.kind_name()))
                })?;
        }

        // Recording
        self.ledger
            .record(name, &recipe.version, true)
            .map_err(failed(Stage::Recording))?;

        output::success(&format!("{} {}", recipe.dir_name(), outcome));
        Ok(outcome)
    }
}
