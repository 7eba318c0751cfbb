//! `.xlsx` export target built on `rust_xlsxwriter`.

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Mutex;

use rust_xlsxwriter::{Format, FormatAlign, Table, TableColumn, TableStyle, Workbook, Worksheet};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use seatwatch_core::Cell;

use super::{ExportError, ExportOptions, ExportTarget, TableData};

/// Writes one worksheet holding one styled table per artifact.
///
/// Conversions are serialized: one workbook is built at a time and it is
/// dropped (released) before `write` returns, whatever the outcome.
pub struct XlsxExporter {
    style: TableStyle,
    lock: Mutex<()>,
}

impl Default for XlsxExporter {
    fn default() -> Self {
        Self::new(TableStyle::Medium2)
    }
}

impl XlsxExporter {
    pub fn new(style: TableStyle) -> Self {
        Self {
            style,
            lock: Mutex::new(()),
        }
    }

    fn build(&self, table: &TableData, filter_col: Option<usize>) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(table.kind.sheet_name())?;

        let hidden = write_rows(worksheet, table, filter_col)?;

        let columns: Vec<TableColumn> = table
            .headers
            .iter()
            .map(|h| TableColumn::new().set_header(h))
            .collect();
        // A table needs at least one data row below the header.
        let last_row = to_row(table.rows.len().max(1))?;
        let last_col = to_col(table.headers.len().saturating_sub(1))?;
        let styled = Table::new()
            .set_name(table.kind.sheet_name())
            .set_style(self.style)
            .set_columns(&columns);
        worksheet.add_table(0, 0, last_row, last_col, &styled)?;

        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();

        debug!(report = %table.kind, rows = table.rows.len(), hidden, "workbook built");
        let bytes = workbook.save_to_buffer()?;
        match filter_col {
            Some(col) => add_non_blank_filter(&bytes, col),
            None => Ok(bytes),
        }
    }
}

/// Custom filter Excel writes for "(Non blanks)" on one table column.
fn non_blank_filter(col: usize) -> String {
    format!(
        r#"<filterColumn colId="{col}"><customFilters><customFilter operator="notEqual" val=" "/></customFilters></filterColumn>"#
    )
}

/// Expand the table's empty `<autoFilter ref=".."/>` into one carrying
/// `filter`. `None` when the part has no such element.
fn patch_table_part(xml: &str, filter: &str) -> Option<String> {
    let start = xml.find("<autoFilter ")?;
    let close = start + xml[start..].find("/>")?;
    if xml[start..close].contains('>') {
        return None;
    }
    Some(format!("{}>{filter}</autoFilter>{}", &xml[..close], &xml[close + 2..]))
}

/// Rewrite the workbook archive so every table part filters `col` on
/// non-blank cells. The hidden rows written earlier match this filter.
fn add_non_blank_filter(workbook: &[u8], col: usize) -> Result<Vec<u8>, ExportError> {
    let filter = non_blank_filter(col);
    let mut archive = ZipArchive::new(Cursor::new(workbook))?;
    let mut out = ZipWriter::new(Cursor::new(Vec::with_capacity(workbook.len())));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for index in 0..archive.len() {
        let mut part = archive.by_index(index)?;
        let name = part.name().to_string();
        let mut content = Vec::with_capacity(part.size() as usize);
        part.read_to_end(&mut content)?;

        if name.starts_with("xl/tables/") && name.ends_with(".xml") {
            let patched = std::str::from_utf8(&content)
                .ok()
                .and_then(|xml| patch_table_part(xml, &filter));
            match patched {
                Some(xml) => content = xml.into_bytes(),
                None => warn!(part = %name, "table part has no autofilter to extend"),
            }
        }

        out.start_file(name, options)?;
        out.write_all(&content)?;
    }

    Ok(out.finish()?.into_inner())
}

fn to_row(index: usize) -> Result<u32, ExportError> {
    u32::try_from(index).map_err(|_| ExportError::TooLarge(format!("{index} rows")))
}

fn to_col(index: usize) -> Result<u16, ExportError> {
    u16::try_from(index).map_err(|_| ExportError::TooLarge(format!("{index} columns")))
}

/// Write data rows below the header; rows whose filter cell is empty are
/// hidden. Returns the number of hidden rows.
fn write_rows(worksheet: &mut Worksheet, table: &TableData, filter_col: Option<usize>) -> Result<usize, ExportError> {
    let wrap = Format::new().set_text_wrap().set_align(FormatAlign::Top);
    let mut hidden = 0usize;

    for (r, row) in table.rows.iter().enumerate() {
        let row_num = to_row(r + 1)?;
        for (c, cell) in row.iter().enumerate() {
            let col = to_col(c)?;
            match cell {
                Cell::Text(s) if s.is_empty() => {}
                Cell::Text(s) if s.contains('\n') => {
                    worksheet.write_string_with_format(row_num, col, s, &wrap)?;
                }
                Cell::Text(s) => {
                    worksheet.write_string(row_num, col, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(row_num, col, *n as f64)?;
                }
            }
        }

        let hide = filter_col
            .and_then(|fc| row.get(fc))
            .is_some_and(Cell::is_empty);
        if hide {
            worksheet.set_row_hidden(row_num)?;
            hidden += 1;
        }
    }

    Ok(hidden)
}

/// Write `bytes` next to `destination` and rename over it.
fn persist_atomically(destination: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new().prefix(".seatwatch-").suffix(".part").tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(destination).map_err(|e| ExportError::Io(e.error))?;
    Ok(())
}

impl ExportTarget for XlsxExporter {
    fn extension(&self) -> &'static str {
        "xlsx"
    }

    fn write(&self, table: &TableData, options: &ExportOptions, destination: &Path) -> Result<(), ExportError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ExportError::Unavailable("previous conversion panicked".to_string()))?;

        let filter_col = match &options.filter_column {
            Some(name) => Some(
                table
                    .column_index(name)
                    .ok_or_else(|| ExportError::UnknownColumn(name.clone()))?,
            ),
            None => None,
        };

        let bytes = self.build(table, filter_col)?;
        persist_atomically(destination, &bytes)
    }
}
