//! Catalog resolver: reference page → vendor CSV link → parsed catalog.
//!
//! ## Flow
//!
//! 1. Fetch the reference page (`CatalogUnavailable` on failure)
//! 2. Scan it for the first link matching the vendor file pattern
//!    (`CatalogLinkNotFound` when there is none)
//! 3. Download the linked file (`CatalogDownloadFailed` on failure)
//! 4. Parse it; rows without an identifier or a name are dropped and counted
//!
//! Every failure is fatal: name resolution downstream has no fallback.

mod http;
mod parse;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use seatwatch_core::{Catalog, ReportError, ReportResult};

pub use http::HttpCatalogSource;
pub use parse::{parse_catalog, ParsedCatalog};

/// Reference page listing the product names and service plans for licensing.
pub const DEFAULT_CATALOG_PAGE: &str =
    "https://learn.microsoft.com/en-us/entra/identity/users/licensing-service-plan-reference";

/// Vendor-hosted CSV download linked from the reference page.
pub const DEFAULT_LINK_PATTERN: &str =
    r#"https://download\.microsoft\.com/download/[^"'\s<>]+?\.csv"#;

/// Transfer failure reported by a [`CatalogSource`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Where the catalog comes from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the reference page body.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch the raw bytes of the linked file.
    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub page_url: String,
    pub link_pattern: Regex,
}

impl CatalogConfig {
    pub fn new(page_url: impl Into<String>, link_pattern: &str) -> ReportResult<Self> {
        let link_pattern = Regex::new(link_pattern)
            .map_err(|e| ReportError::config(format!("catalog link pattern: {e}")))?;
        Ok(Self {
            page_url: page_url.into(),
            link_pattern,
        })
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_url: DEFAULT_CATALOG_PAGE.to_string(),
            link_pattern: Regex::new(DEFAULT_LINK_PATTERN).expect("default link pattern is valid"),
        }
    }
}

/// First link in `page` matching `pattern`, with `&amp;` unescaped.
pub fn find_catalog_link(page: &str, pattern: &Regex) -> Option<String> {
    pattern
        .find(page)
        .map(|m| m.as_str().replace("&amp;", "&"))
}

/// Obtains the identifier → product-name catalog for one run.
pub struct CatalogResolver<S> {
    source: S,
    config: CatalogConfig,
}

impl<S: CatalogSource> CatalogResolver<S> {
    pub fn new(source: S, config: CatalogConfig) -> Self {
        Self { source, config }
    }

    pub async fn resolve(&self) -> ReportResult<Catalog> {
        let page_url = &self.config.page_url;

        let page = self
            .source
            .fetch_page(page_url)
            .await
            .map_err(|e| ReportError::catalog_unavailable(format!("{page_url}: {e}")))?;

        let link = find_catalog_link(&page, &self.config.link_pattern)
            .ok_or_else(|| ReportError::CatalogLinkNotFound(page_url.clone()))?;
        info!(%link, "catalog file located");

        let bytes = self
            .source
            .fetch_file(&link)
            .await
            .map_err(|e| ReportError::catalog_download(format!("{link}: {e}")))?;

        let parsed = parse_catalog(&bytes)?;
        if parsed.dropped_rows > 0 {
            warn!(dropped_rows = parsed.dropped_rows, "catalog rows without identifier or name were dropped");
        }
        if parsed.entries.is_empty() {
            return Err(ReportError::catalog_download(format!("{link}: file contains no catalog entries")));
        }

        let catalog = Catalog::new(parsed.entries);
        info!(entries = catalog.len(), skus = catalog.sku_count(), "catalog loaded");
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatwatch_core::SkuId;

    const PAGE: &str = r#"<html><body>
        <p>Download the <a href="https://download.microsoft.com/download/e/3/e/e3e9faf2/Product%20names.csv?a=1&amp;b=2">CSV</a></p>
        <a href="https://download.microsoft.com/download/other.csv">second</a>
    </body></html>"#;

    const CSV: &str = "Product_Display_Name,String_Id,GUID,Service_Plan_Name\n\
        Office 365 E3,ENTERPRISEPACK,6fd2c87f-b296-42f0-b197-1e91e994b900,EXCHANGE_S_ENTERPRISE\n\
        Office 365 E3,ENTERPRISEPACK,6fd2c87f-b296-42f0-b197-1e91e994b900,SHAREPOINTENTERPRISE\n";

    struct FakeSource {
        page: Result<String, String>,
        file: Result<Vec<u8>, String>,
    }

    impl FakeSource {
        fn ok(page: &str, file: &str) -> Self {
            Self {
                page: Ok(page.to_string()),
                file: Ok(file.as_bytes().to_vec()),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for FakeSource {
        async fn fetch_page(&self, _url: &str) -> Result<String, FetchError> {
            self.page.clone().map_err(FetchError::Other)
        }

        async fn fetch_file(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            assert!(url.starts_with("https://download.microsoft.com/download/e/3/e/"));
            assert!(url.ends_with("?a=1&b=2") || url.ends_with(".csv"));
            self.file.clone().map_err(FetchError::Other)
        }
    }

    #[test]
    fn first_matching_link_wins_and_is_unescaped() {
        let pattern = Regex::new(r#"https://download\.microsoft\.com/download/[^"'\s<>]+"#).unwrap();
        assert_eq!(
            find_catalog_link(PAGE, &pattern).as_deref(),
            Some("https://download.microsoft.com/download/e/3/e/e3e9faf2/Product%20names.csv?a=1&b=2")
        );
    }

    #[test]
    fn default_pattern_stops_at_csv_extension() {
        let config = CatalogConfig::default();
        assert_eq!(
            find_catalog_link(PAGE, &config.link_pattern).as_deref(),
            Some("https://download.microsoft.com/download/e/3/e/e3e9faf2/Product%20names.csv")
        );
        assert!(find_catalog_link("<html>nothing here</html>", &config.link_pattern).is_none());
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = CatalogConfig::new(DEFAULT_CATALOG_PAGE, "([unclosed").unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));
    }

    #[tokio::test]
    async fn resolves_and_deduplicates() {
        let resolver = CatalogResolver::new(FakeSource::ok(PAGE, CSV), CatalogConfig::default());

        let catalog = resolver.resolve().await.unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog
                .joined_names(&SkuId::from("6fd2c87f-b296-42f0-b197-1e91e994b900"), ", ")
                .as_deref(),
            Some("Office 365 E3")
        );
    }

    #[tokio::test]
    async fn page_failure_is_catalog_unavailable() {
        let source = FakeSource {
            page: Err("connection refused".to_string()),
            file: Ok(Vec::new()),
        };
        let err = CatalogResolver::new(source, CatalogConfig::default())
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::CatalogUnavailable(msg) if msg.contains("connection refused")));
    }

    #[tokio::test]
    async fn page_without_link_is_link_not_found() {
        let resolver = CatalogResolver::new(FakeSource::ok("<html></html>", CSV), CatalogConfig::default());
        let err = resolver.resolve().await.unwrap_err();
        assert_eq!(err, ReportError::CatalogLinkNotFound(DEFAULT_CATALOG_PAGE.to_string()));
    }

    #[tokio::test]
    async fn file_failure_is_download_failed() {
        let source = FakeSource {
            page: Ok(PAGE.to_string()),
            file: Err("HTTP status server error (500)".to_string()),
        };
        let err = CatalogResolver::new(source, CatalogConfig::default())
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::CatalogDownloadFailed(_)));
    }

    #[tokio::test]
    async fn header_only_file_is_download_failed() {
        let resolver = CatalogResolver::new(
            FakeSource::ok(PAGE, "Product_Display_Name,GUID\n"),
            CatalogConfig::default(),
        );
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, ReportError::CatalogDownloadFailed(msg) if msg.contains("no catalog entries")));
    }
}
