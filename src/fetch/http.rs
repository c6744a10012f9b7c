//! HTTP client capability and its ureq implementation.

use std::io::Read;
use std::time::Duration;

use crate::error::{Error, Result};

/// Response of a GET request. Non-2xx statuses are returned, not raised.
pub struct HttpResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

/// Minimal HTTP capability consumed by the fetcher.
pub trait HttpClient: Send + Sync {
    fn get(&self, uri: &str) -> Result<HttpResponse>;
}

/// Blocking client backed by a shared `ureq` agent.
pub struct UreqHttpClient {
    agent: ureq::Agent,
}

impl UreqHttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(concat!("recipe-apply/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    /// GET with extra request headers.
    pub(crate) fn get_with_headers(&self, uri: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut request = self.agent.get(uri);
        for (name, value) in headers {
            request = request.set(name, value);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => {
                return Err(Error::FetchFailed {
                    uri: uri.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        Ok(HttpResponse {
            status: response.status(),
            content_length: response
                .header("content-length")
                .and_then(|s| s.parse().ok()),
            body: Box::new(response.into_reader()),
        })
    }
}

impl HttpClient for UreqHttpClient {
    fn get(&self, uri: &str) -> Result<HttpResponse> {
        self.get_with_headers(uri, &[])
    }
}
