//! Tenant subscriptions and the per-product seat inventory.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::exclusions::ExclusionSet;
use crate::id::SkuId;
use crate::table::{Cell, TabularRow};

/// One subscribed product in the tenant, as reported by the directory.
///
/// `consumed_units <= total_units` is usual but not guaranteed (suspended or
/// expiring subscriptions can be over-assigned); nothing here relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantLicense {
    pub sku_id: SkuId,
    pub consumed_units: u64,
    pub total_units: u64,
    /// Vendor part number (diagnostics only).
    #[serde(default)]
    pub sku_part_number: Option<String>,
}

impl TenantLicense {
    pub fn new(sku_id: impl Into<SkuId>, consumed_units: u64, total_units: u64) -> Self {
        Self {
            sku_id: sku_id.into(),
            consumed_units,
            total_units,
            sku_part_number: None,
        }
    }
}

/// One row of the license inventory report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInventoryRow {
    /// Sorted unique display names joined with ", "; empty when unmatched.
    pub product: String,
    pub assigned: u64,
    pub total: u64,
}

impl TabularRow for LicenseInventoryRow {
    const HEADERS: &'static [&'static str] = &["product", "assigned", "total"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.product.clone()),
            Cell::Number(i64::try_from(self.assigned).unwrap_or(i64::MAX)),
            Cell::Number(i64::try_from(self.total).unwrap_or(i64::MAX)),
        ]
    }
}

/// Aggregation output plus diagnostics counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryReport {
    pub rows: Vec<LicenseInventoryRow>,
    /// Rows whose SKU had no catalog match (rendered with an empty product).
    pub unmatched: usize,
    /// Tenant licenses dropped by the exclusion set.
    pub excluded: usize,
}

/// Join tenant subscriptions against the catalog.
///
/// One row per non-excluded subscription, in input order. Repeated SKUs are
/// not merged.
pub fn aggregate(
    tenant_licenses: &[TenantLicense],
    catalog: &Catalog,
    exclusions: &ExclusionSet,
) -> InventoryReport {
    let mut report = InventoryReport::default();

    for license in tenant_licenses {
        if exclusions.contains(&license.sku_id) {
            debug!(
                sku_id = %license.sku_id,
                reason = exclusions.reason(&license.sku_id).unwrap_or_default(),
                "excluded subscription"
            );
            report.excluded += 1;
            continue;
        }

        let product = match catalog.joined_names(&license.sku_id, ", ") {
            Some(names) => names,
            None => {
                warn!(
                    sku_id = %license.sku_id,
                    part_number = license.sku_part_number.as_deref().unwrap_or_default(),
                    "subscribed product not found in catalog"
                );
                report.unmatched += 1;
                String::new()
            }
        };

        report.rows.push(LicenseInventoryRow {
            product,
            assigned: license.consumed_units,
            total: license.total_units,
        });
    }

    report
}
