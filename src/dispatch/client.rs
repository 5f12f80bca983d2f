use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// License key header expected by the ingestion endpoint.
const LICENSE_KEY_HEADER: &str = "X-License-Key";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Encoding failed: {0}")]
    Encode(#[from] crate::encoder::EncodeError),
}

impl DispatchError {
    /// Transport failures requeue the batch; encoding failures abandon it.
    pub fn is_transport(&self) -> bool {
        !matches!(self, DispatchError::Encode(_))
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub api_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_url: "https://log-api.example.com/log/v1".to_string(),
            api_key: String::new(),
            connect_timeout: Duration::from_millis(30_000),
            request_timeout: Duration::from_millis(30_000),
            pool_size: 5,
        }
    }
}

/// Pooled HTTP client for the ingestion endpoint. One POST per (sub-)batch,
/// gzip body, license key header; any 2xx counts as acknowledged.
#[derive(Debug, Clone)]
pub struct IngestClient {
    client: Client,
    url: Url,
    api_key: String,
}

impl IngestClient {
    pub fn new(config: &IngestConfig) -> Result<Self, DispatchError> {
        let url: Url = config.api_url.parse().map_err(|e| {
            DispatchError::InvalidConfiguration(format!(
                "Invalid API URL '{}': {e}",
                config.api_url
            ))
        })?;

        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_size)
            .build()
            .map_err(|e| {
                DispatchError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone(),
        })
    }

    /// Sends one compressed payload. A timeout surfaces as
    /// `DispatchError::Network` via reqwest and is treated as any other
    /// transport failure by the caller.
    pub async fn post_batch(&self, payload: Vec<u8>) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(LICENSE_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(DispatchError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }

    pub fn endpoint(&self) -> &str {
        self.url.as_str()
    }
}
