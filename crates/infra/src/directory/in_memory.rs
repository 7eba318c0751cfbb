//! In-memory directory for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use seatwatch_core::{ReportError, ReportResult, SkuId, TenantLicense, UserFilter, UserRecord};

use super::{DirectoryConnector, DirectoryError, DirectorySession};

#[derive(Debug, Clone, Default)]
struct Fixture {
    organization: String,
    licenses: Vec<TenantLicense>,
    users: Vec<UserRecord>,
    /// Overrides for the per-user lookup; users without an entry report
    /// their listed `assigned_license_sku_ids`.
    details: HashMap<String, Result<Vec<SkuId>, String>>,
    delays: HashMap<String, Duration>,
    reject_auth: Option<String>,
    fail_listing: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    detail_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Directory backed by fixed data. Acts as its own session.
///
/// Clones share call counters. Configuring a clone copies its data first,
/// so the original is left as it was.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    fixture: Arc<Fixture>,
    counters: Arc<Counters>,
}

impl InMemoryDirectory {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            fixture: Arc::new(Fixture {
                organization: organization.into(),
                ..Fixture::default()
            }),
            counters: Arc::default(),
        }
    }

    fn fixture_mut(&mut self) -> &mut Fixture {
        Arc::make_mut(&mut self.fixture)
    }

    pub fn with_licenses(mut self, licenses: Vec<TenantLicense>) -> Self {
        self.fixture_mut().licenses = licenses;
        self
    }

    pub fn with_users(mut self, users: Vec<UserRecord>) -> Self {
        self.fixture_mut().users = users;
        self
    }

    /// Make the license lookup for `user_id` fail with `error`.
    pub fn with_failing_user(mut self, user_id: impl Into<String>, error: impl Into<String>) -> Self {
        self.fixture_mut().details.insert(user_id.into(), Err(error.into()));
        self
    }

    /// Delay the license lookup for `user_id`.
    pub fn with_delay(mut self, user_id: impl Into<String>, delay: Duration) -> Self {
        self.fixture_mut().delays.insert(user_id.into(), delay);
        self
    }

    pub fn with_rejected_auth(mut self, reason: impl Into<String>) -> Self {
        self.fixture_mut().reject_auth = Some(reason.into());
        self
    }

    /// Make tenant-wide listings fail.
    pub fn with_failing_listing(mut self, reason: impl Into<String>) -> Self {
        self.fixture_mut().fail_listing = Some(reason.into());
        self
    }

    /// Number of per-user license lookups issued so far.
    pub fn detail_calls(&self) -> usize {
        self.counters.detail_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent per-user lookups observed.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_listing(&self) -> Result<(), DirectoryError> {
        match &self.fixture.fail_listing {
            Some(reason) => Err(DirectoryError::Other(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    type Session = InMemoryDirectory;

    async fn authenticate(&self, _scopes: &[&str]) -> ReportResult<InMemoryDirectory> {
        match &self.fixture.reject_auth {
            Some(reason) => Err(ReportError::authentication(reason.clone())),
            None => Ok(self.clone()),
        }
    }
}

#[async_trait]
impl DirectorySession for InMemoryDirectory {
    async fn list_subscribed_products(&self) -> Result<Vec<TenantLicense>, DirectoryError> {
        self.check_listing()?;
        Ok(self.fixture.licenses.clone())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, DirectoryError> {
        self.check_listing()?;
        Ok(self
            .fixture
            .users
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }

    async fn user_license_details(&self, user_id: &str) -> Result<Vec<SkuId>, DirectoryError> {
        let (fixture, counters) = (&self.fixture, &self.counters);
        counters.detail_calls.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = fixture.delays.get(user_id) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        match fixture.details.get(user_id) {
            Some(Ok(ids)) => Ok(ids.clone()),
            Some(Err(e)) => Err(DirectoryError::Other(e.clone())),
            None => fixture
                .users
                .iter()
                .find(|u| u.id == user_id)
                .map(|u| u.assigned_license_sku_ids.clone())
                .ok_or_else(|| DirectoryError::Status {
                    status: 404,
                    body: format!("user {user_id} not found"),
                }),
        }
    }

    async fn organization_display_name(&self) -> Result<String, DirectoryError> {
        Ok(self.fixture.organization.clone())
    }
}
