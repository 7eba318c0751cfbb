//! `seatwatch-core` — license reporting domain.
//!
//! This crate contains the **pure** part of the reporting pipeline: catalog
//! lookups, exclusion rules, seat aggregation and per-user license naming.
//! Nothing here performs I/O; adapters live in `seatwatch-infra`.

pub mod catalog;
pub mod error;
pub mod exclusions;
pub mod id;
pub mod license;
pub mod table;
pub mod user;

pub use catalog::{Catalog, CatalogEntry};
pub use error::{ReportError, ReportResult};
pub use exclusions::ExclusionSet;
pub use id::{RunId, SkuId};
pub use license::{aggregate, InventoryReport, LicenseInventoryRow, TenantLicense};
pub use table::{Cell, ReportKind, TabularRow};
pub use user::{
    resolve_license_names, unknown_license, LicenseNames, UserFilter, UserRecord, UserReportRow,
    LICENSE_LOOKUP_FAILED,
};
