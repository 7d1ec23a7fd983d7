use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use nocino_core::MediaFetcher;

// --- Concrete Fetcher Implementation (HTTP file endpoint) ---

/// Downloads attachments from `{resolver_url}/{file_id}`.
pub struct HttpMediaFetcher {
    http_client: Client,
    resolver_url: String,
}

impl HttpMediaFetcher {
    pub fn new(resolver_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client for media downloads")?;

        Ok(Self {
            http_client,
            resolver_url: resolver_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, file_id: &str) -> String {
        format!("{}/{}", self.resolver_url, file_id)
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = self.url_for(file_id);
        tracing::debug!(url = %url, "Fetching media");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Can't fetch file '{}'", url))?;

        if !response.status().is_success() {
            bail!("Media download failed with status: {} for '{}'", response.status(), url);
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
