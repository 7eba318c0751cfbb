//! Run configuration: CLI flags layered over `SEATWATCH_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use seatwatch_core::{ExclusionSet, ReportError, ReportKind, ReportResult, UserFilter};
use seatwatch_infra::catalog::{DEFAULT_CATALOG_PAGE, DEFAULT_LINK_PATTERN};
use seatwatch_infra::resolver::MAX_CONCURRENCY;
use seatwatch_infra::{CatalogConfig, ExportOptions, GraphConfig};
use seatwatch_observability::LogFormat;

/// Tenant license inventory and per-user license reports.
#[derive(Parser, Debug, Clone)]
#[command(name = "seatwatch", version, about = "Tenant license inventory and per-user license reports")]
pub struct Cli {
    /// Directory (tenant) id.
    #[arg(long, env = "SEATWATCH_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id used for the client-credentials grant.
    #[arg(long, env = "SEATWATCH_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "SEATWATCH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long, env = "SEATWATCH_GRAPH_URL", default_value = "https://graph.microsoft.com")]
    pub graph_url: String,

    #[arg(long, env = "SEATWATCH_LOGIN_URL", default_value = "https://login.microsoftonline.com")]
    pub login_url: String,

    /// Reference page that links the product catalog file.
    #[arg(long, env = "SEATWATCH_CATALOG_URL", default_value = DEFAULT_CATALOG_PAGE)]
    pub catalog_url: String,

    /// Regex matching the catalog file link inside the reference page.
    #[arg(long, env = "SEATWATCH_CATALOG_LINK_PATTERN", default_value = DEFAULT_LINK_PATTERN)]
    pub catalog_link_pattern: String,

    /// Per-user license lookups in flight (1 = sequential).
    #[arg(long, env = "SEATWATCH_CONCURRENCY", default_value_t = 8)]
    pub concurrency: usize,

    /// `text` or `json`.
    #[arg(long, env = "SEATWATCH_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Destination directory; prompted for when omitted.
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// JSON file `{"<skuId>": "<reason>"}` replacing the built-in exclusions.
    #[arg(long)]
    pub exclusions: Option<PathBuf>,

    /// Only users in this department.
    #[arg(long)]
    pub department: Option<String>,

    /// Only users whose mail is in this domain.
    #[arg(long)]
    pub mail_domain: Option<String>,

    /// Only users with an enabled account.
    #[arg(long)]
    pub enabled_only: bool,

    /// Only users with this usage location (two-letter country code).
    #[arg(long)]
    pub usage_location: Option<String>,

    /// Licenses report column whose empty cells hide their row.
    #[arg(long)]
    pub licenses_filter_column: Option<String>,

    /// Users report column whose empty cells hide their row.
    #[arg(long)]
    pub users_filter_column: Option<String>,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub catalog: CatalogConfig,
    pub exclusions: ExclusionSet,
    pub filter: UserFilter,
    pub concurrency: usize,
    pub log_format: LogFormat,
    pub output_dir: Option<PathBuf>,
    pub licenses_export: ExportOptions,
    pub users_export: ExportOptions,
    pub http_timeout: Duration,
}

fn required(value: Option<String>, name: &str) -> ReportResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReportError::config(format!("{name} is required")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn export_options(column: Option<String>, kind: ReportKind) -> ExportOptions {
    match non_blank(column) {
        Some(column) => ExportOptions::filter_on(column),
        None => ExportOptions::for_kind(kind),
    }
}

/// Read an exclusion file, or fall back to the built-in free-product list.
pub fn load_exclusions(path: Option<&Path>) -> ReportResult<ExclusionSet> {
    let Some(path) = path else {
        return Ok(ExclusionSet::default_free_products());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ReportError::config(format!("exclusions file {}: {e}", path.display())))?;
    ExclusionSet::from_json(&raw)
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> ReportResult<Self> {
        let tenant_id = required(cli.tenant_id, "SEATWATCH_TENANT_ID")?;
        let client_id = required(cli.client_id, "SEATWATCH_CLIENT_ID")?;
        let client_secret = required(cli.client_secret, "SEATWATCH_CLIENT_SECRET")?;

        if !(1..=MAX_CONCURRENCY).contains(&cli.concurrency) {
            return Err(ReportError::config(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                cli.concurrency
            )));
        }

        let log_format = cli.log_format.parse::<LogFormat>().map_err(ReportError::config)?;
        let catalog = CatalogConfig::new(cli.catalog_url, &cli.catalog_link_pattern)?;
        let exclusions = load_exclusions(cli.exclusions.as_deref())?;

        let filter = UserFilter {
            department: non_blank(cli.department),
            mail_domain: non_blank(cli.mail_domain),
            enabled_only: cli.enabled_only,
            usage_location: non_blank(cli.usage_location),
        };

        Ok(Self {
            graph: GraphConfig::new(tenant_id, client_id, client_secret)
                .with_endpoints(cli.login_url, cli.graph_url),
            catalog,
            exclusions,
            filter,
            concurrency: cli.concurrency,
            log_format,
            output_dir: cli.output_dir,
            licenses_export: export_options(cli.licenses_filter_column, ReportKind::Licenses),
            users_export: export_options(cli.users_filter_column, ReportKind::Users),
            http_timeout: Duration::from_secs(60),
        })
    }
}
