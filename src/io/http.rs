use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};

use super::MaskSource;
use crate::error::IoError;

/// Default timeout for a single image fetch.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP(S)-backed mask source.
#[derive(Debug, Clone)]
pub struct HttpMaskSource {
    client: Client,
}

impl HttpMaskSource {
    /// Create a source with the default timeout.
    pub fn new() -> Result<Self, IoError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a source with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, IoError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IoError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MaskSource for HttpMaskSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes, IoError> {
        let resp = self.client.get(locator).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                IoError::Connection(e.to_string())
            } else {
                IoError::Http(e.to_string())
            }
        })?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(IoError::NotFound(locator.to_string())),
            status if !status.is_success() => {
                return Err(IoError::Http(format!("{} returned {}", locator, status)))
            }
            _ => {}
        }

        resp.bytes()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
