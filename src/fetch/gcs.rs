//! Cloud Storage URI recognition and the default blob store.
//!
//! Besides `gs://bucket/object`, several HTTP URL shapes address the same
//! backend and are routed to the blob store instead of a plain GET:
//!
//! - `http[s]://<bucket>.storage.googleapis.com/<object>`
//! - `http[s]://storage.cloud.google.com/<bucket>/<object>`
//! - `http[s]://storage.googleapis.com/<bucket>/<object>`
//! - `http[s]://commondatastorage.googleapis.com/<bucket>/<object>` (deprecated)
//!
//! Each may carry a numeric object generation as a `#<generation>` fragment.

use std::io::Read;
use std::sync::LazyLock;

use regex::Regex;

use super::http::UreqHttpClient;
use crate::error::{Error, Result};

const BUCKET: &str = r"([a-z0-9][-_.a-z0-9]*)";
const OBJECT: &str = r"(.+?)";
const GENERATION: &str = r"(?:#(\d+))?";

static GS_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^gs://{BUCKET}/{OBJECT}{GENERATION}$")).expect("valid regex")
});

/// Legacy shapes, matched against `host/path` of the parsed URL.
static LEGACY_HTTP: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"^{BUCKET}\.storage\.googleapis\.com/{OBJECT}$"),
        format!(r"^storage\.cloud\.google\.com/{BUCKET}/{OBJECT}$"),
        format!(r"^(?:commondata)?storage\.googleapis\.com/{BUCKET}/{OBJECT}$"),
    ]
    .iter()
    .map(|re| Regex::new(re).expect("valid regex"))
    .collect()
});

/// A resolved Cloud Storage object reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsObject {
    pub bucket: String,
    pub object: String,
    pub generation: Option<i64>,
}

/// Parse a `gs://bucket/object[#generation]` URI.
pub fn parse_gs_uri(uri: &str) -> Result<GcsObject> {
    let malformed = || Error::FetchFailed {
        uri: uri.to_string(),
        reason: "malformed gs:// uri, expected gs://<bucket>/<object>[#<generation>]".into(),
    };
    let caps = GS_URI.captures(uri).ok_or_else(malformed)?;
    let generation = match caps.get(3) {
        Some(g) => Some(g.as_str().parse().map_err(|_| malformed())?),
        None => None,
    };
    Ok(GcsObject {
        bucket: caps[1].to_string(),
        object: caps[2].to_string(),
        generation,
    })
}

/// Match an HTTP(S) URL against the legacy Cloud Storage shapes.
///
/// Only the host and path select the object; a query string is ignored and
/// a numeric fragment is taken as the generation.
pub fn match_legacy_http(uri: &str) -> Option<GcsObject> {
    let url = url::Url::parse(uri).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let generation = match url.fragment() {
        None | Some("") => None,
        Some(g) => Some(g.parse().ok()?),
    };
    let location = format!("{}{}", url.host_str()?, url.path());
    let caps = LEGACY_HTTP.iter().find_map(|re| re.captures(&location))?;
    Some(GcsObject {
        bucket: caps[1].to_string(),
        object: caps[2].to_string(),
        generation,
    })
}

/// Object storage capability consumed by the fetcher.
pub trait BlobStore: Send + Sync {
    fn open(&self, bucket: &str, object: &str, generation: Option<i64>) -> Result<Box<dyn Read + Send>>;
}

/// Default JSON API endpoint for media downloads.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com/storage/v1";

/// Blob store backed by the Cloud Storage JSON API over HTTPS.
///
/// Requests are anonymous unless an OAuth access token is configured.
pub struct GcsBlobStore {
    client: UreqHttpClient,
    endpoint: String,
    access_token: Option<String>,
}

impl GcsBlobStore {
    pub fn new(client: UreqHttpClient, endpoint: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            access_token,
        }
    }

    fn media_url(&self, bucket: &str, object: &str, generation: Option<i64>) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint).map_err(|e| Error::FetchFailed {
            uri: self.endpoint.clone(),
            reason: format!("invalid storage endpoint: {}", e),
        })?;
        url.path_segments_mut()
            .map_err(|_| Error::FetchFailed {
                uri: self.endpoint.clone(),
                reason: "storage endpoint cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(["b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        if let Some(generation) = generation {
            url.query_pairs_mut()
                .append_pair("generation", &generation.to_string());
        }
        Ok(url)
    }
}

impl BlobStore for GcsBlobStore {
    fn open(&self, bucket: &str, object: &str, generation: Option<i64>) -> Result<Box<dyn Read + Send>> {
        let url = self.media_url(bucket, object, generation)?;
        let auth = self.access_token.as_ref().map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|a| vec![("Authorization", a)])
            .unwrap_or_default();

        let response = self.client.get_with_headers(url.as_str(), &headers)?;
        if response.status != 200 {
            return Err(Error::FetchFailed {
                uri: format!("gs://{}/{}", bucket, object),
                reason: format!("storage returned HTTP {}", response.status),
            });
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn obj(bucket: &str, object: &str, generation: Option<i64>) -> GcsObject {
        GcsObject {
            bucket: bucket.into(),
            object: object.into(),
            generation,
        }
    }

    #[test]
    fn test_parse_gs_uri() {
        assert_eq!(
            parse_gs_uri("gs://my-bucket/path/to/obj.tar.gz").unwrap(),
            obj("my-bucket", "path/to/obj.tar.gz", None)
        );
        assert_eq!(
            parse_gs_uri("gs://b/o#1234").unwrap(),
            obj("b", "o", Some(1234))
        );
        assert!(parse_gs_uri("gs://bucket").is_err());
        assert!(parse_gs_uri("gs://bucket/").is_err());
        assert!(parse_gs_uri("gs://Bucket/o").is_err());
    }

    #[test]
    fn test_legacy_bucket_subdomain() {
        assert_eq!(
            match_legacy_http("https://bkt.storage.googleapis.com/dir/file"),
            Some(obj("bkt", "dir/file", None))
        );
        assert_eq!(
            match_legacy_http("http://bkt.storage.googleapis.com/file#7"),
            Some(obj("bkt", "file", Some(7)))
        );
    }

    #[test]
    fn test_legacy_path_style() {
        assert_eq!(
            match_legacy_http("https://storage.cloud.google.com/bkt/file"),
            Some(obj("bkt", "file", None))
        );
        assert_eq!(
            match_legacy_http("https://storage.googleapis.com/bkt/a/b#99"),
            Some(obj("bkt", "a/b", Some(99)))
        );
        assert_eq!(
            match_legacy_http("http://commondatastorage.googleapis.com/bkt/file"),
            Some(obj("bkt", "file", None))
        );
    }

    #[test]
    fn test_plain_http_does_not_match() {
        assert_eq!(match_legacy_http("https://example.com/bkt/file"), None);
        assert_eq!(match_legacy_http("https://storage.googleapis.com/bkt"), None);
        assert_eq!(match_legacy_http("ftp://storage.googleapis.com/bkt/f"), None);
        assert_eq!(match_legacy_http("https://storage.googleapis.com/bkt/f#abc"), None);
    }

    #[test]
    fn test_legacy_query_is_not_part_of_object() {
        assert_eq!(
            match_legacy_http("https://storage.googleapis.com/b/o?x=1"),
            Some(obj("b", "o", None))
        );
        assert_eq!(
            match_legacy_http("https://bkt.storage.googleapis.com/dir/file?alt=media#12"),
            Some(obj("bkt", "dir/file", Some(12)))
        );
    }

    #[test]
    fn test_media_url_encodes_object() {
        let store = GcsBlobStore::new(
            UreqHttpClient::new(Duration::from_secs(1)),
            "https://storage.example/storage/v1",
            None,
        );
        let url = store.media_url("bkt", "dir/my file", Some(5)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example/storage/v1/b/bkt/o/dir%2Fmy%20file?alt=media&generation=5"
        );
    }

    #[tokio::test]
    async fn test_open_sends_token_and_generation() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/bkt/o/obj"))
            .and(query_param("alt", "media"))
            .and(query_param("generation", "3"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("blob"))
            .mount(&mock_server)
            .await;

        let store = GcsBlobStore::new(
            UreqHttpClient::new(Duration::from_secs(5)),
            format!("{}/storage/v1", mock_server.uri()),
            Some("tok".into()),
        );
        let mut body = String::new();
        store
            .open("bkt", "obj", Some(3))
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "blob");
    }

    #[tokio::test]
    async fn test_open_missing_object_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let store = GcsBlobStore::new(
            UreqHttpClient::new(Duration::from_secs(5)),
            format!("{}/storage/v1", mock_server.uri()),
            None,
        );
        let err = store.open("bkt", "nope", None).err().unwrap();
        assert!(err.to_string().contains("HTTP 404"), "{err}");
    }
}
