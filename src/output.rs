//! Colored output and progress reporting
//!
//! Uses owo-colors for terminal colors and indicatif for progress bars.
//! Output is suppressed when quiet mode is enabled (`--quiet` or
//! `RECIPE_QUIET=1`); errors are always printed.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Standard spinner characters
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard tick interval for spinners
const TICK_INTERVAL_MS: u64 = 80;

static QUIET: AtomicBool = AtomicBool::new(false);

/// Enable or disable quiet mode for the whole process.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn quiet() -> bool {
    static FROM_ENV: OnceLock<bool> = OnceLock::new();
    QUIET.load(Ordering::Relaxed)
        || *FROM_ENV.get_or_init(|| {
            std::env::var("RECIPE_QUIET").is_ok_and(|v| !v.is_empty() && v != "0")
        })
}

/// Print an action header (blue, bold)
/// Example: "==> Applying demo 1.0"
pub fn action(message: &str) {
    if quiet() {
        return;
    }
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Print a sub-action (cyan arrow)
/// Example: "  -> fetching"
pub fn sub_action(phase: &str) {
    if quiet() {
        return;
    }
    println!("  {} {}", "->".cyan(), phase);
}

/// Print a detail line (dimmed)
pub fn detail(message: &str) {
    if quiet() {
        return;
    }
    println!("     {}", message.dimmed());
}

/// Print a success message (green)
pub fn success(message: &str) {
    if quiet() {
        return;
    }
    println!("{} {}", "==>".green().bold(), message.green());
}

/// Print an info message (cyan)
pub fn info(message: &str) {
    if quiet() {
        return;
    }
    println!("{} {}", "::".cyan(), message);
}

/// Print a warning message (yellow)
pub fn warning(message: &str) {
    if quiet() {
        return;
    }
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print an error message (red)
pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Print a skip message (dimmed)
/// Example: "==> demo already installed, skipping"
pub fn skip(message: &str) {
    if quiet() {
        return;
    }
    println!("{} {}", "==>".dimmed(), message.dimmed());
}

/// Print a ledger row in list output
pub fn list_item(name: &str, status: &str, ok: bool) {
    if ok {
        println!("  {} {}", name.green(), status.dimmed());
    } else {
        println!("  {} {}", name.red(), status.dimmed());
    }
}

/// Create a spinner; hidden in quiet mode.
pub fn spinner(message: &str) -> ProgressBar {
    if quiet() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("     {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(SPINNER_CHARS),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(TICK_INTERVAL_MS));
    pb
}

/// Switch a spinner to byte tracking once the content length is known.
pub fn upgrade_to_bytes(pb: &ProgressBar, total_bytes: u64) {
    pb.set_length(total_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("     {spinner:.cyan} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸━"),
    );
}
