//! Common test utilities for end-to-end recipe application tests.

#![allow(dead_code)]

use recipe_apply::fetch::{BlobStore, Fetcher, UreqHttpClient};
use recipe_apply::steps::{PackageInstaller, PackageTools};
use recipe_apply::{Config, Error, FileLedger, RecipeRunner};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Sandbox with work, state and output directories.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            work_dir: dir.path().join("work"),
            state_dir: dir.path().join("state"),
            http_timeout: Duration::from_secs(5),
            package_tools: PackageTools::default(),
            ..Config::default()
        };
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        Self { dir, config }
    }

    pub fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn ledger(&self) -> FileLedger {
        FileLedger::new(self.config.ledger_path())
    }

    /// Runner with real HTTP and the file ledger; packages go to `installer`.
    pub fn runner(&self, installer: Arc<dyn PackageInstaller>) -> RecipeRunner {
        let fetcher = Fetcher::new(
            Arc::new(UreqHttpClient::new(self.config.http_timeout)),
            Arc::new(NoBlobStore),
        );
        RecipeRunner::new(
            &self.config,
            fetcher,
            installer,
            Arc::new(self.ledger()),
        )
    }

    /// Write a recipe file into the sandbox and return its path
    pub fn write_recipe(&self, file_name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(file_name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// Blob store for tests that never touch `gs://`.
pub struct NoBlobStore;

impl BlobStore for NoBlobStore {
    fn open(
        &self,
        bucket: &str,
        object: &str,
        _generation: Option<i64>,
    ) -> recipe_apply::error::Result<Box<dyn Read + Send>> {
        Err(Error::FetchFailed {
            uri: format!("gs://{}/{}", bucket, object),
            reason: "blob store not available in tests".into(),
        })
    }
}

/// Package installer that records what it was asked to install.
#[derive(Default)]
pub struct RecordingInstaller {
    pub installs: Mutex<Vec<(recipe_apply::recipe::PackageKind, PathBuf)>>,
}

impl PackageInstaller for RecordingInstaller {
    fn install(
        &self,
        kind: recipe_apply::recipe::PackageKind,
        package: &Path,
    ) -> recipe_apply::error::Result<()> {
        self.installs
            .lock()
            .unwrap()
            .push((kind, package.to_path_buf()));
        Ok(())
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A gzip-compressed tar with the given regular files.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A zip archive with the given members. Member names are written verbatim.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
