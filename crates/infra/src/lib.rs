//! Infrastructure layer: catalog download, directory access, export targets.

pub mod catalog;
pub mod directory;
pub mod export;
pub mod resolver;

pub use catalog::{CatalogConfig, CatalogResolver, CatalogSource, HttpCatalogSource};
pub use directory::{
    DirectoryConnector, DirectoryError, DirectorySession, GraphConfig, GraphDirectory,
    InMemoryDirectory,
};
pub use export::{
    ExportArtifact, ExportError, ExportOptions, ExportOutcome, ExportTarget, ReportExporter, TableData, XlsxExporter,
};
pub use resolver::{UserLicenseResolver, UserReport, UserResolutionFailure};
