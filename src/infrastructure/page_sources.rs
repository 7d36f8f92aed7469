//! [`PageSource`] implementations: in-memory HTML and live HTTP fetches

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info};

use crate::domain::services::{PageSnapshot, PageSource};
use crate::infrastructure::parsing_error::ParsingError;

/// Fixed HTML; every snapshot is identical
#[derive(Debug, Clone)]
pub struct StaticPage {
    url: String,
    html: String,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self { url: url.into(), html: html.into() }
    }

    /// Load a saved page; the URL defaults to the file's `file://` URL
    pub async fn from_file(path: &Path, url: Option<&str>) -> Result<Self> {
        let html = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read page file {}", path.display()))?;

        let url = match url {
            Some(url) => url.to_string(),
            None => {
                let absolute = std::path::absolute(path).with_context(|| format!("Bad path {}", path.display()))?;
                url::Url::from_file_path(&absolute)
                    .map_err(|()| anyhow!("Cannot express {} as a URL", absolute.display()))?
                    .to_string()
            }
        };
        Ok(Self::new(url, html))
    }
}

#[async_trait]
impl PageSource for StaticPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn snapshot(&self) -> Result<PageSnapshot, ParsingError> {
        Ok(PageSnapshot::new(&self.url, &self.html))
    }
}

/// Live page: every snapshot is a fresh GET
pub struct FetchedPage {
    url: String,
    client: Client,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl PageSource for FetchedPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn snapshot(&self) -> Result<PageSnapshot, ParsingError> {
        info!("HTTP GET: {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ParsingError::snapshot_failed(&self.url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParsingError::HttpRequestFailed { status: status.as_u16(), url: self.url.clone() });
        }

        // Redirects (short links, locale hops) change the URL the page is known by
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| ParsingError::snapshot_failed(&self.url, e.to_string()))?;

        if html.is_empty() {
            return Err(ParsingError::snapshot_failed(&self.url, "empty response body"));
        }

        debug!("Fetched {} bytes from {}", html.len(), final_url);
        Ok(PageSnapshot::new(final_url, html))
    }
}
