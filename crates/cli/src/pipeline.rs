//! One reporting pass: catalog, inventory, users, export.
//!
//! ## Ordering
//!
//! 1. Authenticate against the directory
//! 2. Resolve the product catalog
//! 3. List subscribed products and aggregate the inventory
//! 4. List users (filtered) and resolve their licenses
//! 5. Read the organization display name
//! 6. Export both reports
//!
//! Every fatal error is raised in steps 1-5, before the destination directory
//! is touched. Cancellation aborts the step in flight, including the
//! fan-out; a cancelled run writes nothing. Exports run on the blocking pool.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use seatwatch_core::{
    aggregate, ExclusionSet, ReportError, ReportKind, ReportResult, RunId, UserFilter,
};
use seatwatch_infra::directory::GRAPH_DEFAULT_SCOPE;
use seatwatch_infra::{
    CatalogResolver, CatalogSource, DirectoryConnector, DirectorySession, ExportArtifact, ExportOptions,
    ExportOutcome, ExportTarget, ReportExporter, UserLicenseResolver, UserResolutionFailure,
};

use crate::config::AppConfig;

/// Per-run inputs that are not collaborators.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub destination: PathBuf,
    pub exclusions: ExclusionSet,
    pub filter: UserFilter,
    pub concurrency: usize,
    pub licenses_export: ExportOptions,
    pub users_export: ExportOptions,
}

impl RunSettings {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            exclusions: ExclusionSet::default_free_products(),
            filter: UserFilter::accept_all(),
            concurrency: UserLicenseResolver::default().concurrency(),
            licenses_export: ExportOptions::for_kind(ReportKind::Licenses),
            users_export: ExportOptions::for_kind(ReportKind::Users),
        }
    }

    pub fn from_config(config: &AppConfig, destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            exclusions: config.exclusions.clone(),
            filter: config.filter.clone(),
            concurrency: config.concurrency,
            licenses_export: config.licenses_export.clone(),
            users_export: config.users_export.clone(),
        }
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub organization: String,
    pub inventory_rows: usize,
    pub unmatched_products: usize,
    pub excluded_licenses: usize,
    pub user_rows: usize,
    pub unknown_licenses: usize,
    pub user_failures: Vec<UserResolutionFailure>,
    pub exports: Vec<ExportOutcome>,
}

impl RunSummary {
    /// At least one report fell back to CSV.
    pub fn export_failed(&self) -> bool {
        self.exports.iter().any(|o| !o.is_written())
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ExportArtifact> {
        self.exports.iter().filter_map(|o| match o {
            ExportOutcome::Written(artifact) => Some(artifact),
            ExportOutcome::Failed { .. } => None,
        })
    }
}

fn ensure_active(cancel: &CancellationToken, stage: &str) -> ReportResult<()> {
    if cancel.is_cancelled() {
        warn!(stage, "run cancelled");
        return Err(ReportError::cancelled(format!("before {stage}")));
    }
    Ok(())
}

/// Run one step, abandoning it as soon as `cancel` fires.
async fn until_cancelled<T, E, F>(cancel: &CancellationToken, stage: &str, step: F) -> ReportResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ReportError>,
{
    ensure_active(cancel, stage)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(stage, "run cancelled");
            Err(ReportError::cancelled(format!("during {stage}")))
        }
        result = step => result.map_err(Into::into),
    }
}

fn ensure_destination(path: &Path) -> ReportResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ReportError::config(format!(
            "destination {} is not an existing directory",
            path.display()
        )))
    }
}

/// Run the full pipeline once.
pub async fn run<C, S, T>(
    connector: &C,
    catalog: &CatalogResolver<S>,
    target: T,
    settings: &RunSettings,
    cancel: &CancellationToken,
) -> ReportResult<RunSummary>
where
    C: DirectoryConnector,
    S: CatalogSource,
    T: ExportTarget + 'static,
{
    let run_id = RunId::new();
    let started_at = Utc::now();
    info!(%run_id, destination = %settings.destination.display(), "report run started");

    ensure_destination(&settings.destination)?;

    let session = until_cancelled(cancel, "authentication", connector.authenticate(&[GRAPH_DEFAULT_SCOPE])).await?;

    let catalog = until_cancelled(cancel, "catalog download", catalog.resolve()).await?;

    let subscribed = until_cancelled(cancel, "license inventory", session.list_subscribed_products()).await?;
    let inventory = aggregate(&subscribed, &catalog, &settings.exclusions);
    if inventory.unmatched > 0 {
        warn!(%run_id, unmatched = inventory.unmatched, "subscribed products without a catalog name");
    }
    info!(%run_id, rows = inventory.rows.len(), excluded = inventory.excluded, "license inventory built");

    let users = until_cancelled(cancel, "user listing", session.list_users(&settings.filter)).await?;
    info!(%run_id, users = users.len(), filtered = !settings.filter.is_empty(), "users selected");

    let users_report = UserLicenseResolver::new(settings.concurrency)
        .resolve(&session, &users, &catalog, &settings.exclusions, cancel)
        .await;
    if !users_report.completed {
        warn!(%run_id, resolved = users_report.rows.len(), total = users.len(), "run cancelled during user resolution");
        return Err(ReportError::cancelled(format!(
            "{} of {} users resolved",
            users_report.rows.len(),
            users.len()
        )));
    }
    if !users_report.failures.is_empty() {
        warn!(%run_id, failures = users_report.failures.len(), "license lookup failed for some users");
    }

    let organization = until_cancelled(cancel, "organization lookup", session.organization_display_name()).await?;

    ensure_active(cancel, "export")?;
    let (inventory_rows, unmatched_products, excluded_licenses) =
        (inventory.rows.len(), inventory.unmatched, inventory.excluded);
    let user_rows = users_report.rows.len();
    let exporter = ReportExporter::new(target, settings.destination.clone()).map_err(ReportError::from)?;
    let org = organization.clone();
    let (licenses_export, users_export) = (settings.licenses_export.clone(), settings.users_export.clone());
    let licenses = inventory.rows;
    let users_rows = users_report.rows;
    let exports = tokio::task::spawn_blocking(move || {
        vec![
            exporter.export(ReportKind::Licenses, &org, &licenses, &licenses_export),
            exporter.export(ReportKind::Users, &org, &users_rows, &users_export),
        ]
    })
    .await
    .map_err(|e| ReportError::export(format!("export task failed: {e}")))?;

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        organization,
        inventory_rows,
        unmatched_products,
        excluded_licenses,
        user_rows,
        unknown_licenses: users_report.unknown_licenses,
        user_failures: users_report.failures,
        exports,
    };
    info!(
        %run_id,
        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
        export_failed = summary.export_failed(),
        "report run finished"
    );
    Ok(summary)
}
