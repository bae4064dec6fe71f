//! HTTP fetch primitive
//!
//! [`Fetch`] is the seam between the worker pool and the network: it takes a URL
//! and returns the full response body, or an error the retry layer can classify.
//! [`HttpFetcher`] is the reqwest-backed implementation used in production.

use crate::config::HttpConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Something that can GET a URL and return its body
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Request `url` once and return the body bytes
    ///
    /// Non-success statuses map to [`Error::HttpStatus`], transport failures and
    /// timeouts to [`Error::Network`], and a successful empty body to
    /// [`Error::EmptyBody`].
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed [`Fetch`] implementation
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client carrying the configured User-Agent, timeout and TLS policy
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url = %url, "GET");

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Read response body
        let body = response.bytes().await?.to_vec();

        if body.is_empty() {
            return Err(Error::EmptyBody {
                url: url.to_string(),
            });
        }

        tracing::debug!(url = %url, bytes = body.len(), "response received");
        Ok(body)
    }
}
