//! Remote image fetching for client-skipped images.
//!
//! Only `http`/`https` URLs are ever fetched, each under a fixed timeout and
//! a body-size cap. One [`ImageFetcher`] (and its connection pool) is shared
//! by every request the pipeline serves.

use crate::error::AssetError;
use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

/// `true` when `url` uses a scheme we are willing to fetch.
pub fn is_fetchable(url: &str) -> bool {
    matches!(
        reqwest::Url::parse(url).as_ref().map(|u| u.scheme()),
        Ok("http") | Ok("https")
    )
}

/// HTTP client for image downloads.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_bytes: u64,
}

impl ImageFetcher {
    /// Build a fetcher with a per-request timeout and a body cap.
    pub fn new(timeout_secs: u64, max_bytes: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("folio-render/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            timeout_secs,
            max_bytes,
        })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Download `url` and return the body.
    ///
    /// # Errors
    /// - [`AssetError::UnsupportedScheme`] for anything but http/https
    /// - [`AssetError::FetchTimeout`] when the timeout elapses
    /// - [`AssetError::AssetTooLarge`] when the body exceeds the cap
    /// - [`AssetError::AssetFetchFailed`] for network errors and non-2xx
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        if !is_fetchable(url) {
            return Err(AssetError::UnsupportedScheme {
                url: url.to_string(),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        if !response.status().is_success() {
            return Err(AssetError::AssetFetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(AssetError::AssetTooLarge {
                    url: url.to_string(),
                    size: len,
                    limit: self.max_bytes,
                });
            }
        }

        // Stream so a server that lies about (or omits) Content-Length
        // cannot make us buffer more than the cap.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(url, e))?;
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(AssetError::AssetTooLarge {
                    url: url.to_string(),
                    size: body.len() as u64,
                    limit: self.max_bytes,
                });
            }
        }

        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> AssetError {
        if e.is_timeout() {
            AssetError::FetchTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            AssetError::AssetFetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
