//! HTTP image fetcher used for image hashing

use async_trait::async_trait;
use reposter_domain::{ImageError, ImageFetcher};
use reqwest::Client;
use std::time::Duration;

/// Downloads image bytes over plain HTTP(S)
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::Http(format!("{} for {}", response.status(), url)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Network(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }

        Ok(bytes.to_vec())
    }
}
