//! Tabular view of report rows, shared by every export format.

/// One cell of an exported row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    Number(i64),
}

impl Cell {
    /// Empty text cells are the ones hidden by the export filter.
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Text(s) if s.is_empty())
    }

    /// Plain-text rendering (CSV staging).
    pub fn to_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// A row that can be written as a table with a fixed header.
pub trait TabularRow {
    /// Column headers, one per field, in output order.
    const HEADERS: &'static [&'static str];

    /// Cells in `HEADERS` order.
    fn cells(&self) -> Vec<Cell>;
}

/// The two artifacts produced per run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Licenses,
    Users,
}

impl ReportKind {
    /// Fixed file-name suffix (`<tenant>-<suffix>.xlsx`).
    pub fn suffix(&self) -> &'static str {
        match self {
            ReportKind::Licenses => "Licenses",
            ReportKind::Users => "Users",
        }
    }

    /// Worksheet and table name inside the artifact.
    pub fn sheet_name(&self) -> &'static str {
        self.suffix()
    }

    /// Column hidden-when-empty unless the operator picks another one.
    pub fn default_filter_column(&self) -> &'static str {
        match self {
            ReportKind::Licenses => "product",
            ReportKind::Users => "licenses",
        }
    }

    /// Artifact file name for a tenant; characters invalid in file names are
    /// replaced with `_`.
    pub fn file_name(&self, tenant_display_name: &str, extension: &str) -> String {
        let tenant: String = tenant_display_name
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let tenant = if tenant.is_empty() { "tenant".to_string() } else { tenant };
        format!("{tenant}-{}.{extension}", self.suffix())
    }
}

impl core::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.suffix())
    }
}
