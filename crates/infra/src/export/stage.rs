//! Plain-text (UTF-8 CSV) staging of report rows.

use std::path::Path;

use super::{ExportError, TableData};

/// Write `table` as UTF-8 CSV at `path`, header first.
pub fn stage_csv(table: &TableData, path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.to_text()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a staged CSV back as `(headers, rows)`.
pub fn read_staged_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.map(|record| record.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
    Ok((headers, rows))
}
