//! `reqwest`-backed catalog source.

use std::time::Duration;

use async_trait::async_trait;

use super::{CatalogSource, FetchError};

/// Fetches the reference page and catalog file over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    http: reqwest::Client,
}

impl HttpCatalogSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Client with a request timeout suited to a page plus a few-MB file.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("seatwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
