//! User license resolver: bounded fan-out of per-user license lookups.
//!
//! Each lookup is tagged with the user's input index; results are written
//! back by index, so row order always equals input order regardless of which
//! request finishes first. A failed lookup is isolated to that user's row.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seatwatch_core::{
    resolve_license_names, Catalog, ExclusionSet, SkuId, UserRecord, UserReportRow, LICENSE_LOOKUP_FAILED,
};

use crate::directory::{DirectoryError, DirectorySession};

/// Upper bound on in-flight license lookups.
pub const MAX_CONCURRENCY: usize = 10;

/// A user whose license lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserResolutionFailure {
    pub user_id: String,
    pub name: String,
    pub error: String,
}

/// Resolution output plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserReport {
    /// One row per resolved user, in input order.
    pub rows: Vec<UserReportRow>,
    /// Unknown-license sentinels emitted across all rows.
    pub unknown_licenses: usize,
    pub failures: Vec<UserResolutionFailure>,
    /// False when cancellation stopped the fan-out early; `rows` then holds
    /// only the users resolved before that point.
    pub completed: bool,
}

/// Resolves assigned licenses for a list of users.
#[derive(Debug, Clone, Copy)]
pub struct UserLicenseResolver {
    concurrency: usize,
}

impl Default for UserLicenseResolver {
    fn default() -> Self {
        Self::new(8)
    }
}

impl UserLicenseResolver {
    /// `concurrency` is clamped to `1..=MAX_CONCURRENCY`; 1 is a strictly
    /// sequential run.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn resolve<S>(
        &self,
        session: &S,
        users: &[UserRecord],
        catalog: &Catalog,
        exclusions: &ExclusionSet,
        cancel: &CancellationToken,
    ) -> UserReport
    where
        S: DirectorySession + ?Sized,
    {
        let mut outcomes: Vec<Option<Result<Vec<SkuId>, DirectoryError>>> =
            users.iter().map(|_| None).collect();

        let fetches = stream::iter(users.iter().enumerate())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|(index, user)| async move { (index, session.user_license_details(&user.id).await) })
            .buffer_unordered(self.concurrency);
        let mut fetches = std::pin::pin!(fetches);

        let mut completed = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    completed = false;
                    break;
                }
                next = fetches.next() => match next {
                    Some((index, outcome)) => {
                        debug!(index, ok = outcome.is_ok(), "license lookup finished");
                        if let Some(slot) = outcomes.get_mut(index) {
                            *slot = Some(outcome);
                        }
                    }
                    None => break,
                },
            }
        }
        if cancel.is_cancelled() {
            completed = false;
        }

        let mut report = UserReport {
            completed,
            ..UserReport::default()
        };

        for (user, outcome) in users.iter().zip(outcomes) {
            match outcome {
                Some(Ok(sku_ids)) => {
                    let names = resolve_license_names(&sku_ids, catalog, exclusions);
                    if names.unknown > 0 {
                        warn!(user_id = %user.id, unknown = names.unknown, "user has licenses missing from catalog");
                    }
                    report.unknown_licenses += names.unknown;
                    report.rows.push(user.to_row(names.joined));
                }
                Some(Err(e)) => {
                    warn!(user_id = %user.id, error = %e, "license lookup failed for user");
                    let row = user.to_row(LICENSE_LOOKUP_FAILED.to_string());
                    report.failures.push(UserResolutionFailure {
                        user_id: user.id.clone(),
                        name: row.name.clone(),
                        error: e.to_string(),
                    });
                    report.rows.push(row);
                }
                None => {}
            }
        }

        info!(
            users = users.len(),
            resolved = report.rows.len(),
            failures = report.failures.len(),
            unknown_licenses = report.unknown_licenses,
            completed = report.completed,
            "user licenses resolved"
        );
        report
    }
}
