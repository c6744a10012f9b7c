//! Recipe CLI - apply declarative software recipes
//!
//! Usage:
//!   recipe apply <file>...         Apply one or more recipe files
//!   recipe ledger                  List applied recipes
//!   recipe forget <name>           Drop a recipe from the ledger
//!   recipe hash <file>             Print the SHA-256 of a file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recipe_apply::fetch::hash::sha256_file;
use recipe_apply::{output, version, Config, FileLedger, Recipe, RecipeRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "recipe")]
#[command(about = "Apply declarative software recipes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $XDG_CONFIG_HOME/recipe/config.toml)
    #[arg(short, long, global = true, env = "RECIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Root of per-run working directories
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply recipe files in order
    Apply {
        /// Recipe files (.toml or .json)
        #[arg(required = true)]
        recipes: Vec<PathBuf>,

        /// Continue with the remaining recipes after a failure
        #[arg(short, long)]
        keep_going: bool,
    },

    /// List applied recipes
    Ledger,

    /// Remove a recipe from the ledger so it is applied again
    Forget {
        /// Recipe name
        name: String,
    },

    /// Print the SHA-256 checksum of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when some recipe failed but the error was already reported.
fn run() -> Result<bool> {
    let cli = Cli::parse();
    output::set_quiet(cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.work_dir {
        config.work_dir = dir;
    }

    match cli.command {
        Commands::Apply { recipes, keep_going } => apply(&config, &recipes, keep_going),

        Commands::Ledger => {
            list_ledger(&config)?;
            Ok(true)
        }

        Commands::Forget { name } => {
            let ledger = FileLedger::new(config.ledger_path());
            if ledger.forget(&name)? {
                output::success(&format!("Forgot {}", name));
            } else {
                output::info(&format!("{} is not in the ledger", name));
            }
            Ok(true)
        }

        Commands::Hash { file } => {
            let digest = sha256_file(&file)
                .with_context(|| format!("Failed to hash {}", file.display()))?;
            println!("{}  {}", digest, file.display());
            Ok(true)
        }
    }
}

fn apply(config: &Config, files: &[PathBuf], keep_going: bool) -> Result<bool> {
    let runner = RecipeRunner::from_config(config);
    let total = files.len();
    let mut failures = 0;

    for (i, file) in files.iter().enumerate() {
        let recipe = Recipe::from_path(file)?;
        if total > 1 {
            output::info(&format!("[{}/{}] {}", i + 1, total, file.display()));
        }

        if let Err(e) = runner.apply(&recipe) {
            output::error(&e.to_string());
            failures += 1;
            if !keep_going {
                break;
            }
        }
    }

    if failures > 0 && total > 1 {
        output::error(&format!("{} of {} recipe(s) failed", failures, total));
    }
    Ok(failures == 0)
}

fn list_ledger(config: &Config) -> Result<()> {
    let ledger = FileLedger::new(config.ledger_path());
    let entries = ledger.entries()?;

    if entries.is_empty() {
        output::info(&format!(
            "No recipes recorded in {}",
            ledger.path().display()
        ));
        return Ok(());
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    for entry in entries {
        let status = format!(
            "[{}, applied {}]",
            version::format(&entry.version),
            age(now.saturating_sub(entry.install_time_unix_nanos))
        );
        output::list_item(&entry.name, &status, entry.success);
    }
    Ok(())
}

fn age(nanos: u64) -> String {
    let secs = nanos / 1_000_000_000;
    match secs {
        0..60 => format!("{}s ago", secs),
        60..3600 => format!("{}m ago", secs / 60),
        3600..86400 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}
