//! Recipe ledger - durable record of applied recipes
//!
//! One entry per recipe name; recording a name replaces its previous entry.
//! The file ledger stores a JSON object
//! `name -> {version, installTimeUnixNanos, success}` and is the only state
//! the engine persists.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub version: Vec<u32>,
    pub install_time_unix_nanos: u64,
    pub success: bool,
}

/// Key-value store of applied recipes, keyed by recipe name.
pub trait Ledger: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Option<LedgerEntry>>;

    /// Record `name` at `version`, replacing any previous entry.
    fn record(&self, name: &str, version: &str, success: bool) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    version: Vec<u32>,
    install_time_unix_nanos: u64,
    success: bool,
}

type Entries = BTreeMap<String, StoredEntry>;

/// Ledger persisted as a JSON file.
///
/// Writes go through a temp file and an atomic rename. Access is serialized
/// in-process by a mutex and across processes by an advisory lock on
/// `<path>.lock`.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, reason: impl std::fmt::Display) -> Error {
        Error::LedgerIo {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Run `f` with the ledger locked; `exclusive` for read-modify-write.
    fn locked<T>(&self, exclusive: bool, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let _guard = self.guard.lock().map_err(|_| self.io_error("ledger mutex poisoned"))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_file = File::create(&lock_path).map_err(|e| self.io_error(e))?;
        if exclusive {
            FileExt::lock_exclusive(&lock_file)
        } else {
            FileExt::lock_shared(&lock_file)
        }
        .map_err(|e| self.io_error(format!("cannot lock ledger: {}", e)))?;

        let result = f(self);
        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn load(&self) -> Result<Entries> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Entries::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| self.io_error(format!("corrupt ledger: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&self, entries: &Entries) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let json = serde_json::to_vec_pretty(entries).map_err(|e| self.io_error(e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(&json).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// All entries, ordered by name.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        self.locked(false, |l| l.load()).map(|entries| {
            entries
                .into_iter()
                .map(|(name, e)| LedgerEntry {
                    name,
                    version: e.version,
                    install_time_unix_nanos: e.install_time_unix_nanos,
                    success: e.success,
                })
                .collect()
        })
    }

    /// Remove the entry for `name`. Returns whether one existed.
    pub fn forget(&self, name: &str) -> Result<bool> {
        self.locked(true, |l| {
            let mut entries = l.load()?;
            let existed = entries.remove(name).is_some();
            if existed {
                l.store(&entries)?;
            }
            Ok(existed)
        })
    }
}

impl Ledger for FileLedger {
    fn lookup(&self, name: &str) -> Result<Option<LedgerEntry>> {
        let entries = self.locked(false, |l| l.load())?;
        Ok(entries.get(name).map(|e| LedgerEntry {
            name: name.to_string(),
            version: e.version.clone(),
            install_time_unix_nanos: e.install_time_unix_nanos,
            success: e.success,
        }))
    }

    fn record(&self, name: &str, version: &str, success: bool) -> Result<()> {
        let parsed = version::parse(version)?;
        self.locked(true, |l| {
            let mut entries = l.load()?;
            entries.insert(
                name.to_string(),
                StoredEntry {
                    version: parsed,
                    install_time_unix_nanos: now_unix_nanos(),
                    success,
                },
            );
            l.store(&entries)
        })
    }
}

/// Ledger held in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Entries>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn lookup(&self, name: &str) -> Result<Option<LedgerEntry>> {
        let entries = self.entries.lock().map_err(|_| Error::LedgerIo {
            path: PathBuf::from("<memory>"),
            reason: "ledger mutex poisoned".into(),
        })?;
        Ok(entries.get(name).map(|e| LedgerEntry {
            name: name.to_string(),
            version: e.version.clone(),
            install_time_unix_nanos: e.install_time_unix_nanos,
            success: e.success,
        }))
    }

    fn record(&self, name: &str, version: &str, success: bool) -> Result<()> {
        let parsed = version::parse(version)?;
        let mut entries = self.entries.lock().map_err(|_| Error::LedgerIo {
            path: PathBuf::from("<memory>"),
            reason: "ledger mutex poisoned".into(),
        })?;
        entries.insert(
            name.to_string(),
            StoredEntry {
                version: parsed,
                install_time_unix_nanos: now_unix_nanos(),
                success,
            },
        );
        Ok(())
    }
}
