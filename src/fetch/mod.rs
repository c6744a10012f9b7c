//! Artifact fetching
//!
//! Resolves artifact URIs to local files. Supported sources:
//!
//! - `gs://bucket/object[#generation]` via the injected [`BlobStore`]
//! - `http://` / `https://` via the injected [`HttpClient`], unless the URL
//!   is one of the legacy Cloud Storage shapes (see [`gcs`]), in which case
//!   it is routed to the blob store
//!
//! The body is streamed to disk and hashed in the same pass. A declared
//! checksum that does not match removes the written file.

pub mod gcs;
pub mod hash;
pub mod http;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::error::{Error, Result};
use crate::output;
use crate::paths;
use crate::recipe::Artifact;

pub use gcs::{BlobStore, DEFAULT_GCS_ENDPOINT, GcsBlobStore, GcsObject};
pub use http::{HttpClient, HttpResponse, UreqHttpClient};

/// Failure of one artifact within [`Fetcher::fetch_all`].
#[derive(Error, Debug)]
#[error("artifact '{artifact_id}': {source}")]
pub struct FetchError {
    pub artifact_id: String,
    #[source]
    pub source: Error,
}

/// Where an artifact's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Blob(GcsObject),
    Http(String),
}

/// Decide how to retrieve `uri`.
pub fn resolve_source(uri: &str) -> Result<Source> {
    let scheme = uri
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| Error::UnsupportedProtocol(uri.to_string()))?;

    match scheme.as_str() {
        "gs" => gcs::parse_gs_uri(uri).map(Source::Blob),
        "http" | "https" => {
            if let Some(object) = gcs::match_legacy_http(uri) {
                return Ok(Source::Blob(object));
            }
            url::Url::parse(uri).map_err(|e| Error::FetchFailed {
                uri: uri.to_string(),
                reason: format!("invalid url: {}", e),
            })?;
            Ok(Source::Http(uri.to_string()))
        }
        _ => Err(Error::UnsupportedProtocol(uri.to_string())),
    }
}

/// Downloads artifacts through injected storage and HTTP capabilities.
#[derive(Clone)]
pub struct Fetcher {
    http: Arc<dyn HttpClient>,
    blobs: Arc<dyn BlobStore>,
}

impl Fetcher {
    pub fn new(http: Arc<dyn HttpClient>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { http, blobs }
    }

    /// Fetch one artifact into `dest_dir`, returning the local path.
    ///
    /// The file is named after the artifact id. On any failure, including a
    /// checksum mismatch, the partially written file is removed.
    pub fn fetch(&self, artifact: &Artifact, dest_dir: &Path) -> Result<PathBuf> {
        let source = resolve_source(&artifact.uri)?;

        if !artifact.checksum.is_empty() && hex::decode(artifact.checksum.trim()).is_err() {
            return Err(Error::ChecksumMismatch {
                uri: artifact.uri.clone(),
                expected: artifact.checksum.clone(),
                actual: "<declared checksum is not hex>".into(),
            });
        }
        if matches!(&source, Source::Http(uri) if uri.starts_with("http://"))
            && artifact.checksum.is_empty()
            && !artifact.allow_insecure
        {
            output::warning(&format!(
                "artifact '{}' is fetched over plain http without a checksum",
                artifact.id
            ));
        }

        let (mut body, content_length) = self.open(&source, &artifact.uri)?;

        std::fs::create_dir_all(dest_dir)?;
        let dest = paths::normalize(&dest_dir.join(&artifact.id))?;

        let pb = output::spinner(&format!("fetching {}", artifact.id));
        if let Some(len) = content_length {
            output::upgrade_to_bytes(&pb, len);
        }

        let written = File::create(&dest).and_then(|file| {
            let mut writer = BufWriter::new(file);
            hash::copy_hashed(&mut body, &mut writer, &pb)
        });
        pb.finish_and_clear();

        let (bytes, actual) = match written {
            Ok(result) => result,
            Err(e) => {
                let _ = std::fs::remove_file(&dest);
                return Err(Error::FetchFailed {
                    uri: artifact.uri.clone(),
                    reason: format!("writing {}: {}", dest.display(), e),
                });
            }
        };

        if !artifact.checksum.is_empty() && !hash::checksum_matches(&artifact.checksum, &actual) {
            let _ = std::fs::remove_file(&dest);
            return Err(Error::ChecksumMismatch {
                uri: artifact.uri.clone(),
                expected: artifact.checksum.trim().to_lowercase(),
                actual,
            });
        }

        output::detail(&format!("fetched {} ({} bytes)", artifact.id, bytes));
        Ok(dest)
    }

    /// Fetch every artifact, stopping at the first failure.
    pub fn fetch_all(
        &self,
        artifacts: &[Artifact],
        dest_dir: &Path,
    ) -> std::result::Result<BTreeMap<String, PathBuf>, FetchError> {
        let mut paths = BTreeMap::new();
        for artifact in artifacts {
            let path = self.fetch(artifact, dest_dir).map_err(|source| FetchError {
                artifact_id: artifact.id.clone(),
                source,
            })?;
            paths.insert(artifact.id.clone(), path);
        }
        Ok(paths)
    }

    fn open(&self, source: &Source, uri: &str) -> Result<(Box<dyn Read + Send>, Option<u64>)> {
        match source {
            Source::Blob(o) => {
                let body = self
                    .blobs
                    .open(&o.bucket, &o.object, o.generation)
                    .map_err(|e| match e {
                        Error::FetchFailed { reason, .. } => Error::FetchFailed {
                            uri: uri.to_string(),
                            reason,
                        },
                        other => other,
                    })?;
                Ok((body, None))
            }
            Source::Http(url) => {
                let response = self.http.get(url)?;
                if response.status != 200 {
                    return Err(Error::FetchFailed {
                        uri: uri.to_string(),
                        reason: format!("HTTP status {}", response.status),
                    });
                }
                Ok((response.body, response.content_length))
            }
        }
    }
}
