//! Product-name catalog: SKU identifier → display name(s).

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::id::SkuId;

/// One row of the vendor reference file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub sku_id: SkuId,
    pub product_display_name: String,
}

impl CatalogEntry {
    pub fn new(sku_id: impl Into<SkuId>, product_display_name: impl Into<String>) -> Self {
        Self {
            sku_id: sku_id.into(),
            product_display_name: product_display_name.into(),
        }
    }
}

/// Immutable catalog for one pipeline run.
///
/// The vendor file repeats a SKU once per included service plan (and for
/// regional name variants), so lookups always go through a deduplicated,
/// lexicographically sorted name set.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<SkuId, BTreeSet<String>>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut index: HashMap<SkuId, BTreeSet<String>> = HashMap::new();
        for entry in &entries {
            index
                .entry(entry.sku_id.clone())
                .or_default()
                .insert(entry.product_display_name.clone());
        }
        Self { entries, index }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct SKUs known to the catalog.
    pub fn sku_count(&self) -> usize {
        self.index.len()
    }

    /// Sorted unique display names for `sku_id`, or `None` when unknown.
    pub fn names(&self, sku_id: &SkuId) -> Option<&BTreeSet<String>> {
        self.index.get(sku_id).filter(|names| !names.is_empty())
    }

    /// Display names joined with `separator`, or `None` when unknown.
    pub fn joined_names(&self, sku_id: &SkuId, separator: &str) -> Option<String> {
        self.names(sku_id).map(|names| {
            names
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(separator)
        })
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
