//! Free/trial products that never show up in either report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::id::SkuId;

/// Built-in exclusions: self-service, viral and trial SKUs that every tenant
/// accumulates and that carry no seat cost.
const DEFAULT_EXCLUSIONS: &[(&str, &str)] = &[
    ("f30db892-07e9-47e9-837c-80727f46fd3d", "Microsoft Power Automate Free"),
    ("a403ebcc-fae0-4ca2-8c8c-7a907fd6c235", "Microsoft Fabric (Free)"),
    ("710779e8-3d4a-4c88-adb9-386c958d1fdf", "Microsoft Teams Exploratory"),
    ("6470687e-a428-4b7a-bef2-8a291ad947c9", "Windows Store for Business"),
    ("dcb1a3ae-b33f-4487-846a-a640262fadf4", "Microsoft Power Apps Plan 2 Trial"),
    ("606b54a9-78d8-4298-ad8b-df6ef4481c80", "Power Virtual Agents Viral Trial"),
    ("5b631642-bd26-49fe-bd20-1daaa972ef80", "Microsoft Power Apps for Developer"),
    ("1f2f344a-700d-42c9-9427-5cea1d5d7ba6", "Microsoft Stream Trial"),
];

/// Injected exclusion rules: identifier → reason.
///
/// Never mutated once the pipeline starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet {
    rules: BTreeMap<SkuId, String>,
}

impl ExclusionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in free/trial product list.
    pub fn default_free_products() -> Self {
        DEFAULT_EXCLUSIONS
            .iter()
            .map(|(id, reason)| (SkuId::new(id), (*reason).to_string()))
            .collect()
    }

    /// Parse a JSON object of `{"<skuId>": "<reason>"}`.
    pub fn from_json(raw: &str) -> ReportResult<Self> {
        let set: Self = serde_json::from_str(raw)
            .map_err(|e| ReportError::config(format!("exclusions: {e}")))?;
        if set.rules.keys().any(SkuId::is_empty) {
            return Err(ReportError::config("exclusions: empty identifier"));
        }
        Ok(set)
    }

    pub fn contains(&self, sku_id: &SkuId) -> bool {
        self.rules.contains_key(sku_id)
    }

    pub fn reason(&self, sku_id: &SkuId) -> Option<&str> {
        self.rules.get(sku_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(SkuId, String)> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = (SkuId, String)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_contains_free_flow() {
        let set = ExclusionSet::default_free_products();
        let flow = SkuId::from("f30db892-07e9-47e9-837c-80727f46fd3d");
        assert!(set.contains(&flow));
        assert_eq!(set.reason(&flow), Some("Microsoft Power Automate Free"));
        assert_eq!(set.len(), DEFAULT_EXCLUSIONS.len());
    }

    #[test]
    fn json_file_replaces_defaults() {
        let set = ExclusionSet::from_json(r#"{ "sku-X": "trial", " sku-Y ": "viral" }"#).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&SkuId::from("sku-Y")));
        assert!(!set.contains(&SkuId::from("f30db892-07e9-47e9-837c-80727f46fd3d")));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = ExclusionSet::from_json(r#"["sku-X"]"#).unwrap_err();
        assert!(matches!(err, ReportError::Config(_)));

        let err = ExclusionSet::from_json(r#"{ "  ": "blank" }"#).unwrap_err();
        assert!(matches!(err, ReportError::Config(msg) if msg.contains("empty")));
    }
}
