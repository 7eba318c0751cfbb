//! Report export: CSV staging, styled artifact, CSV fallback.
//!
//! ## Guarantees
//!
//! - Rows are staged as UTF-8 CSV before the styled artifact is attempted, so
//!   an export failure never loses data: the staged CSV is copied next to the
//!   intended artifact instead.
//! - Artifacts are written to a temporary file in the destination directory
//!   and renamed into place; a failed export leaves no partial file.
//! - The staging directory is removed when the exporter is dropped, on every
//!   exit path.

mod stage;
mod xlsx;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use seatwatch_core::{Cell, ReportError, ReportKind, TabularRow};

pub use stage::{read_staged_csv, stage_csv};
pub use xlsx::XlsxExporter;

/// Export-step failure.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error("filter column `{0}` is not a column of this report")]
    UnknownColumn(String),

    #[error("table too large: {0}")]
    TooLarge(String),

    #[error("export target unavailable: {0}")]
    Unavailable(String),
}

impl From<ExportError> for ReportError {
    fn from(value: ExportError) -> Self {
        ReportError::export(value.to_string())
    }
}

/// In-memory table handed to an [`ExportTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableData {
    pub kind: ReportKind,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl TableData {
    pub fn from_rows<R: TabularRow>(kind: ReportKind, rows: &[R]) -> Self {
        Self {
            kind,
            headers: R::HEADERS.iter().map(|h| (*h).to_string()).collect(),
            rows: rows.iter().map(TabularRow::cells).collect(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Per-report export settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Header of the column whose empty cells hide their row.
    pub filter_column: Option<String>,
}

impl ExportOptions {
    pub fn filter_on(column: impl Into<String>) -> Self {
        Self {
            filter_column: Some(column.into()),
        }
    }

    /// The report kind's default filter column.
    pub fn for_kind(kind: ReportKind) -> Self {
        Self::filter_on(kind.default_filter_column())
    }
}

/// Spreadsheet producer.
///
/// Implementations must either write the complete artifact at `destination`
/// (replacing any existing file) or leave it untouched.
pub trait ExportTarget: Send + Sync {
    /// File extension of produced artifacts.
    fn extension(&self) -> &'static str;

    fn write(&self, table: &TableData, options: &ExportOptions, destination: &Path) -> Result<(), ExportError>;
}

/// A produced artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub kind: ReportKind,
    pub path: PathBuf,
    pub rows: usize,
}

/// Result of exporting one report.
#[derive(Debug)]
pub enum ExportOutcome {
    Written(ExportArtifact),
    /// The styled artifact failed; `fallback` is the CSV copy of the data
    /// when it could be placed in the destination.
    Failed {
        kind: ReportKind,
        error: ReportError,
        fallback: Option<PathBuf>,
    },
}

impl ExportOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, ExportOutcome::Written(_))
    }
}

/// Stages and exports reports into one destination directory.
pub struct ReportExporter<T> {
    target: T,
    destination: PathBuf,
    staging: tempfile::TempDir,
}

impl<T: ExportTarget> ReportExporter<T> {
    /// Fails when the staging directory cannot be created; nothing is written
    /// to `destination` at this point.
    pub fn new(target: T, destination: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let staging = tempfile::Builder::new().prefix("seatwatch-").tempdir()?;
        Ok(Self {
            target,
            destination: destination.into(),
            staging,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Export one report as `<tenant>-<Kind>.<ext>` in the destination.
    pub fn export<R: TabularRow>(
        &self,
        kind: ReportKind,
        tenant_display_name: &str,
        rows: &[R],
        options: &ExportOptions,
    ) -> ExportOutcome {
        let table = TableData::from_rows(kind, rows);

        let staged = self.staging.path().join(format!("{}.csv", kind.suffix()));
        if let Err(e) = stage_csv(&table, &staged) {
            error!(report = %kind, error = %e, "staging report rows failed");
            return ExportOutcome::Failed {
                kind,
                error: e.into(),
                fallback: None,
            };
        }

        let artifact = self
            .destination
            .join(kind.file_name(tenant_display_name, self.target.extension()));

        match self.target.write(&table, options, &artifact) {
            Ok(()) => {
                info!(report = %kind, path = %artifact.display(), rows = table.rows.len(), "report exported");
                ExportOutcome::Written(ExportArtifact {
                    kind,
                    path: artifact,
                    rows: table.rows.len(),
                })
            }
            Err(e) => {
                error!(report = %kind, error = %e, "styled export failed; keeping CSV copy");
                let fallback_path = self.destination.join(kind.file_name(tenant_display_name, "csv"));
                let fallback = match std::fs::copy(&staged, &fallback_path) {
                    Ok(_) => Some(fallback_path),
                    Err(copy_err) => {
                        error!(report = %kind, error = %copy_err, "could not place CSV copy in destination");
                        None
                    }
                };
                ExportOutcome::Failed {
                    kind,
                    error: e.into(),
                    fallback,
                }
            }
        }
    }
}
