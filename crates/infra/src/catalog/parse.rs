//! Vendor CSV → catalog entries.

use tracing::debug;

use seatwatch_core::{CatalogEntry, ReportError, ReportResult};

const ID_COLUMN: &str = "GUID";
const NAME_COLUMN: &str = "Product_Display_Name";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parsed file plus the number of data rows that had to be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCatalog {
    pub entries: Vec<CatalogEntry>,
    pub dropped_rows: usize,
}

/// Parse the vendor reference file.
///
/// The first row is the header and is used only to locate the identifier and
/// display-name columns; every other row is data. Rows that are malformed or
/// miss either field are dropped and counted.
pub fn parse_catalog(bytes: &[u8]) -> ReportResult<ParsedCatalog> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ReportError::catalog_download(format!("unreadable catalog header: {e}")))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| ReportError::catalog_download(format!("catalog header has no `{name}` column")))
    };
    let id_col = column(ID_COLUMN)?;
    let name_col = column(NAME_COLUMN)?;

    let mut parsed = ParsedCatalog::default();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                debug!(row = line + 2, error = %e, "malformed catalog row");
                parsed.dropped_rows += 1;
                continue;
            }
        };

        let id = record.get(id_col).map(str::trim).unwrap_or_default();
        let name = record.get(name_col).map(str::trim).unwrap_or_default();
        if id.is_empty() || name.is_empty() {
            parsed.dropped_rows += 1;
            continue;
        }

        parsed.entries.push(CatalogEntry::new(id, name));
    }

    Ok(parsed)
}
