//! Pipeline error model.

use thiserror::Error;

/// Result type used across the reporting pipeline.
pub type ReportResult<T> = Result<T, ReportError>;

/// Pipeline-level error.
///
/// Every variant except [`ReportError::ExportFailure`] is fatal to the run and
/// is raised before any destination file is touched. Non-fatal conditions
/// (dropped catalog rows, unmatched products, unknown licenses, per-user lookup
/// failures) are not errors: they are counted, logged and rendered as sentinel
/// values in the reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// The directory session could not be established.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The catalog reference page could not be fetched.
    #[error("catalog reference page unavailable: {0}")]
    CatalogUnavailable(String),

    /// The reference page did not contain a link to the catalog file.
    #[error("no catalog file link found in reference page {0}")]
    CatalogLinkNotFound(String),

    /// The linked catalog file failed to transfer (or is not a catalog file).
    #[error("catalog download failed: {0}")]
    CatalogDownloadFailed(String),

    /// A tenant-wide directory listing failed.
    #[error("directory request failed: {0}")]
    Directory(String),

    /// The styled artifact could not be produced. Row data is kept as CSV.
    #[error("export failed: {0}")]
    ExportFailure(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The run was cancelled by the operator.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl ReportError {
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailure(msg.into())
    }

    pub fn catalog_unavailable(msg: impl Into<String>) -> Self {
        Self::CatalogUnavailable(msg.into())
    }

    pub fn catalog_download(msg: impl Into<String>) -> Self {
        Self::CatalogDownloadFailed(msg.into())
    }

    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::ExportFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Whether the run must stop when this error is raised.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ExportFailure(_))
    }
}
