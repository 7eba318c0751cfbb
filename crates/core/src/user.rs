//! Directory users and the per-user license report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::exclusions::ExclusionSet;
use crate::id::SkuId;
use crate::table::{Cell, TabularRow};

/// Marker written to the `licenses` column when the user's license-detail
/// lookup failed.
pub const LICENSE_LOOKUP_FAILED: &str = "License lookup failed";

/// Sentinel for a SKU the catalog does not know yet.
pub fn unknown_license(sku_id: &SkuId) -> String {
    format!("Unknown license ({sku_id})")
}

/// Identity as listed by the directory. Absent attributes are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub office_location: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub assigned_license_sku_ids: Vec<SkuId>,
    #[serde(default)]
    pub account_enabled: Option<bool>,
    #[serde(default)]
    pub usage_location: Option<String>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Some(display_name.into()),
            ..Self::default()
        }
    }

    /// Report row for this user with an already rendered `licenses` value.
    pub fn to_row(&self, licenses: String) -> UserReportRow {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        UserReportRow {
            name: text(&self.display_name),
            licenses,
            mail: text(&self.mail),
            department: text(&self.department),
            job_title: text(&self.job_title),
            office: text(&self.office_location),
            city: text(&self.city),
        }
    }
}

/// One row of the user report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReportRow {
    pub name: String,
    /// Newline-joined, sorted, unique license names and sentinels.
    pub licenses: String,
    pub mail: String,
    pub department: String,
    pub job_title: String,
    pub office: String,
    pub city: String,
}

impl TabularRow for UserReportRow {
    const HEADERS: &'static [&'static str] = &[
        "name",
        "licenses",
        "mail",
        "department",
        "jobTitle",
        "office",
        "city",
    ];

    fn cells(&self) -> Vec<Cell> {
        [
            &self.name,
            &self.licenses,
            &self.mail,
            &self.department,
            &self.job_title,
            &self.office,
            &self.city,
        ]
        .into_iter()
        .map(|v| Cell::Text(v.clone()))
        .collect()
    }
}

/// Rendered `licenses` value for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseNames {
    pub joined: String,
    /// SKUs rendered as [`unknown_license`] sentinels.
    pub unknown: usize,
}

/// Render a user's assigned SKUs.
///
/// Excluded SKUs are dropped without trace; catalog hits become their
/// ", "-joined display names; misses become `Unknown license (<id>)`. The
/// result is sorted, deduplicated and joined with `\n`.
pub fn resolve_license_names(
    sku_ids: &[SkuId],
    catalog: &Catalog,
    exclusions: &ExclusionSet,
) -> LicenseNames {
    let mut names: BTreeSet<String> = BTreeSet::new();
    let mut unknown = BTreeSet::new();

    for sku_id in sku_ids.iter().filter(|id| !exclusions.contains(id)) {
        match catalog.joined_names(sku_id, ", ") {
            Some(name) => {
                names.insert(name);
            }
            None => {
                unknown.insert(sku_id);
                names.insert(unknown_license(sku_id));
            }
        }
    }

    LicenseNames {
        joined: names.into_iter().collect::<Vec<_>>().join("\n"),
        unknown: unknown.len(),
    }
}

/// Operator-supplied predicate restricting which users are processed.
///
/// Each populated field must match; an empty filter accepts everyone.
/// String comparisons are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    /// Exact department name.
    pub department: Option<String>,
    /// Mail domain, with or without a leading `@`.
    pub mail_domain: Option<String>,
    /// Only users whose account is enabled.
    #[serde(default)]
    pub enabled_only: bool,
    /// Top-level `usageLocation` attribute (two-letter country code).
    pub usage_location: Option<String>,
}

impl UserFilter {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, user: &UserRecord) -> bool {
        fn eq_ci(expected: &Option<String>, actual: &Option<String>) -> bool {
            match expected {
                None => true,
                Some(e) => actual
                    .as_deref()
                    .is_some_and(|a| a.trim().eq_ignore_ascii_case(e.trim())),
            }
        }

        if self.enabled_only && user.account_enabled != Some(true) {
            return false;
        }

        if let Some(domain) = &self.mail_domain {
            let suffix = format!("@{}", domain.trim().trim_start_matches('@')).to_lowercase();
            let matched = user
                .mail
                .as_deref()
                .is_some_and(|m| m.trim().to_lowercase().ends_with(&suffix));
            if !matched {
                return false;
            }
        }

        eq_ci(&self.department, &user.department) && eq_ci(&self.usage_location, &user.usage_location)
    }
}
