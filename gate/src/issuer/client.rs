//! HTTP side of the issuing desk: code generation and QR image rendering.

use crate::error::IssueError;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(rename = "qrCode")]
    qr_code: String,
}

/// Client for `POST /generate` and for fetching rendered code images
#[derive(Clone, Debug)]
pub struct IssuerClient {
    client: Client,
    api_url: String,
}

impl IssuerClient {
    /// Create a client for the service at `api_url`
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Generate`] if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, IssueError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IssueError::Generate(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Ask the service for a fresh code
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Generate`] for network failures, non-success
    /// statuses and bodies without a `qrCode`.
    pub async fn generate(&self) -> Result<String, IssueError> {
        let response = self
            .client
            .post(format!("{}/generate", self.api_url))
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| IssueError::Generate(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IssueError::Generate(format!("status {}", status.as_u16())));
        }

        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| IssueError::Generate(e.to_string()))?;

        if body.qr_code.trim().is_empty() {
            return Err(IssueError::Generate("empty qrCode".to_string()));
        }
        Ok(body.qr_code)
    }

    /// Download the rendered image for `code`
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::ImageDownload`] if the image cannot be fetched.
    pub async fn fetch_image(&self, code: &str, url: &str) -> Result<Vec<u8>, IssueError> {
        let failed = |reason: String| IssueError::ImageDownload {
            code: code.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| failed(e.to_string()))?;

        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Builds image URLs on an external QR rendering service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageService {
    base_url: String,
    size: u32,
}

impl ImageService {
    /// A service at `base_url` rendering `size`×`size` images
    #[must_use]
    pub fn new(base_url: impl Into<String>, size: u32) -> Self {
        Self {
            base_url: base_url.into(),
            size,
        }
    }

    /// `{base}?size={n}x{n}&data={code}`, with the code query-encoded
    #[must_use]
    pub fn image_url(&self, code: &str) -> String {
        let size = format!("{0}x{0}", self.size);
        Url::parse_with_params(&self.base_url, &[("size", size.as_str()), ("data", code)])
            .map_or_else(
                |_| format!("{}?size={size}&data={code}", self.base_url),
                String::from,
            )
    }
}

impl Default for ImageService {
    fn default() -> Self {
        Self::new("https://api.qrserver.com/v1/create-qr-code/", 150)
    }
}
