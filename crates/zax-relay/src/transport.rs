//! The HTTP transport contract.
//!
//! The relay protocol needs exactly one transport operation: POST a
//! text body to a path under the relay URL and read the response body
//! back as text. Everything else (framing, encryption, retries) lives
//! above this seam, so tests can swap in an in-process relay.

use async_trait::async_trait;

#[cfg(feature = "http")]
use crate::RelayError;
use crate::Result;

/// A request/response transport to a relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// POST `body` to `<url>/<path>` and return the response body.
    ///
    /// Implementations send `Content-Type: text/plain` and
    /// `Accept: text/plain`, surface non-2xx statuses as
    /// [`RelayError::Network`] with the status attached, and map
    /// request timeouts to [`RelayError::Timeout`].
    async fn post(&self, url: &str, path: &str, body: &str) -> Result<String>;
}

/// `reqwest`-backed transport.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Build a transport with the given per-request timeout.
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Network {
                status: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl RelayTransport for HttpTransport {
    async fn post(&self, url: &str, path: &str, body: &str) -> Result<String> {
        let endpoint = format!("{}/{}", url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .header(reqwest::header::ACCEPT, "text/plain")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout
                } else {
                    RelayError::Network {
                        status: e.status().map(|s| s.as_u16()),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Network {
                status: Some(status.as_u16()),
                message: format!("relay returned {}", status),
            });
        }

        response.text().await.map_err(|e| RelayError::Network {
            status: None,
            message: format!("failed to read response body: {}", e),
        })
    }
}
