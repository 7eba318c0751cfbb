//! Directory service boundary.
//!
//! `DirectoryConnector::authenticate` yields a session; every read goes
//! through the session. Authentication failures are fatal and happen before
//! any other call.

mod graph;
mod in_memory;

use async_trait::async_trait;
use thiserror::Error;

use seatwatch_core::{ReportError, ReportResult, SkuId, TenantLicense, UserFilter, UserRecord};

pub use graph::{GraphConfig, GraphDirectory, GraphSession, GRAPH_DEFAULT_SCOPE};
pub use in_memory::InMemoryDirectory;

/// Failure of a single directory request.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl From<DirectoryError> for ReportError {
    fn from(value: DirectoryError) -> Self {
        ReportError::directory(value.to_string())
    }
}

/// Establishes an authenticated session with the directory.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    type Session: DirectorySession;

    async fn authenticate(&self, scopes: &[&str]) -> ReportResult<Self::Session>;
}

/// Read-only queries against an authenticated directory.
#[async_trait]
pub trait DirectorySession: Send + Sync {
    /// One entry per subscribed product in the tenant.
    async fn list_subscribed_products(&self) -> Result<Vec<TenantLicense>, DirectoryError>;

    /// All users accepted by `filter`, in directory order.
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, DirectoryError>;

    /// SKUs currently licensed to one user.
    async fn user_license_details(&self, user_id: &str) -> Result<Vec<SkuId>, DirectoryError>;

    async fn organization_display_name(&self) -> Result<String, DirectoryError>;
}
