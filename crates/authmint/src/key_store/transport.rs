//! Fetching the published certificate set
//!
//! [`KeyFetchTransport`] is the seam between the key store and the network.
//! [`HttpKeyTransport`] is the production implementation; tests substitute
//! their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use tracing::{debug, error};

use crate::config::KeyStoreConfig;
use crate::error::{ConfigError, TransportError};

/// Body and cache lifetime of one certificate fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedKeys {
    /// JSON object mapping key id to PEM certificate
    pub body: Vec<u8>,
    /// How long the response may be cached, if the server said so
    pub max_age: Option<Duration>,
}

/// Source of the current verification certificates
#[async_trait]
pub trait KeyFetchTransport: Send + Sync {
    /// Fetch the certificate set published at `url`
    async fn fetch(&self, url: &str) -> Result<FetchedKeys, TransportError>;
}

/// Fetches certificates over HTTPS with `reqwest`
///
/// - non-2xx responses are errors
/// - bodies larger than `max_response_bytes` are rejected, by `Content-Length`
///   up front and by actual length after reading
/// - `Cache-Control: max-age` sets the lifetime, capped at `max_cache_ttl_secs`
#[derive(Debug, Clone)]
pub struct HttpKeyTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
    max_cache_ttl: Duration,
}

impl HttpKeyTransport {
    /// Create a transport from key store settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: &KeyStoreConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(format!("authmint/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Use an existing `reqwest` client
    pub fn with_client(client: reqwest::Client, config: &KeyStoreConfig) -> Self {
        Self {
            client,
            max_response_bytes: config.max_response_bytes,
            max_cache_ttl: config.max_cache_ttl(),
        }
    }
}

#[async_trait]
impl KeyFetchTransport for HttpKeyTransport {
    async fn fetch(&self, url: &str) -> Result<FetchedKeys, TransportError> {
        debug!(url = %url, "Fetching verification certificates");

        let response = self.client.get(url).send().await.map_err(|e| {
            error!(url = %url, error = %e, "Certificate request failed");
            TransportError::Http(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(url = %url, status = %status, "Certificate endpoint returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        // Extract cache headers before consuming response
        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_max_age(value, self.max_cache_ttl));

        let max = self.max_response_bytes as u64;
        if let Some(content_length) = response.content_length()
            && content_length > max
        {
            return Err(TransportError::ResponseTooLarge {
                size: content_length,
                max,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(format!("failed to read response: {e}")))?;

        if body.len() > self.max_response_bytes {
            return Err(TransportError::ResponseTooLarge {
                size: body.len() as u64,
                max,
            });
        }

        Ok(FetchedKeys {
            body: body.to_vec(),
            max_age,
        })
    }
}

/// Cache lifetime from a `Cache-Control` value
///
/// `None` when the header carries no usable `max-age`, including `no-cache`
/// and `no-store`; the key store then applies its default lifetime.
pub fn parse_max_age(cache_control: &str, cap: Duration) -> Option<Duration> {
    let directives: Vec<&str> = cache_control.split(',').map(str::trim).collect();

    if directives
        .iter()
        .any(|d| d.eq_ignore_ascii_case("no-cache") || d.eq_ignore_ascii_case("no-store"))
    {
        return None;
    }

    directives.iter().find_map(|directive| {
        let (name, value) = directive.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        let seconds = value.trim().trim_matches('"').parse::<u64>().ok()?;
        Some(Duration::from_secs(seconds).min(cap))
    })
}
