//! Per-recipe application lock
//!
//! Serializes concurrent applications of the same recipe name, across
//! threads and processes, so the ledger decision and the record that follows
//! it cannot interleave.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::output;

/// Directory under the state dir that holds the lock files
const LOCK_DIR: &str = "locks";

/// Lock file path for a recipe name.
pub fn lock_path(state_dir: &Path, name: &str) -> PathBuf {
    state_dir.join(LOCK_DIR).join(format!("{}.lock", name))
}

fn lock_error(path: &Path, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("cannot lock {}: {}", path.display(), e),
    ))
}

/// Acquire the exclusive lock for `name`, blocking while another
/// application holds it. The lock is released when the guard is dropped.
///
/// Lock files are never removed. A file left behind by a killed process
/// holds no lock and is simply re-locked.
pub fn acquire(state_dir: &Path, name: &str) -> Result<RecipeLock> {
    let path = lock_path(state_dir, name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| lock_error(&path, e))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| lock_error(&path, e))?;

    if file.try_lock_exclusive().is_err() {
        let mut holder = String::new();
        let _ = file.read_to_string(&mut holder);
        let holder = holder.trim();
        output::info(&format!(
            "waiting for another application of '{}'{}",
            name,
            if holder.is_empty() {
                String::new()
            } else {
                format!(" (pid {})", holder)
            }
        ));
        file.lock_exclusive().map_err(|e| lock_error(&path, e))?;
    }

    write_pid(&mut file).map_err(|e| lock_error(&path, e))?;

    Ok(RecipeLock { file })
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

/// RAII guard for a recipe lock.
#[derive(Debug)]
pub struct RecipeLock {
    file: File,
}

impl Drop for RecipeLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}
