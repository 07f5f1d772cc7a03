//! Tabular files: CSV text and spreadsheet workbooks.
//!
//! The format follows the file extension. CSV and files without an
//! extension are read as UTF-8 text; workbooks are read through `calamine`
//! (first worksheet only) and `.xlsx` is written through `rust_xlsxwriter`.

use crate::error::{StoreError, StoreResult};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use std::path::Path;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// A tabular document: one header row followed by data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based line in the source file; the header is line 1.
    pub line: usize,
    pub cells: Vec<String>,
}

impl SheetRow {
    pub fn cell(&self, col: usize) -> &str {
        self.cells.get(col).map(String::as_str).unwrap_or("")
    }
}

fn parse_csv_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut out = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut record_line = 1usize;
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            record.push(std::mem::take(&mut buf));
            i += 1;
            continue;
        }
        if (ch == '\n' || ch == '\r') && !in_quotes {
            // \r\n counts as one break.
            if ch == '\r' && i + 1 < chars.len() && chars[i + 1] == '\n' {
                i += 1;
            }
            record.push(std::mem::take(&mut buf));
            out.push((record_line, std::mem::take(&mut record)));
            line += 1;
            record_line = line;
            i += 1;
            continue;
        }
        if ch == '\n' {
            line += 1;
        }
        buf.push(ch);
        i += 1;
    }
    if !buf.is_empty() || !record.is_empty() {
        record.push(buf);
        out.push((record_line, record));
    }
    out
}

/// One exported cell. Numbers stay numeric in workbooks.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => format_number(*n),
        }
    }
}

/// Integral values print without a fractional part (`3`, not `3.0`).
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        (v as i64).to_string()
    } else {
        v.to_string()
    }
}

fn collect_sheet(mut records: impl Iterator<Item = (usize, Vec<String>)>) -> Sheet {
    let Some((_, headers)) = records.next() else {
        return Sheet::default();
    };
    let headers = headers.into_iter().map(|h| h.trim().to_string()).collect();
    let rows = records
        .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|(line, cells)| SheetRow { line, cells })
        .collect();
    Sheet { headers, rows }
}

pub fn parse_csv(text: &str) -> Sheet {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    collect_sheet(parse_csv_records(text).into_iter())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn unsupported(field: &str, ext: &str, supported: &str) -> StoreError {
    StoreError::validation(
        field,
        format!("unsupported file format '.{ext}' (expected {supported})"),
    )
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

fn read_workbook(path: &Path) -> StoreResult<Sheet> {
    let mut workbook = open_workbook_auto(path)?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Ok(Sheet::default());
    };
    let range = workbook.worksheet_range(&first)?;
    // Rows above the used range still count as lines.
    let top = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let records = range
        .rows()
        .enumerate()
        .map(|(i, cells)| (top + i + 1, cells.iter().map(cell_text).collect()));
    Ok(collect_sheet(records))
}

/// Reads a CSV file or the first worksheet of a workbook.
pub fn read_sheet(path: &Path) -> StoreResult<Sheet> {
    match extension(path).as_deref() {
        None | Some("csv") => {
            let bytes = std::fs::read(path)?;
            let text = String::from_utf8(bytes).map_err(|_| {
                StoreError::validation("inPath", "CSV file is not UTF-8 text")
            })?;
            Ok(parse_csv(&text))
        }
        Some(ext) if WORKBOOK_EXTENSIONS.contains(&ext) => read_workbook(path),
        Some(ext) => Err(unsupported("inPath", ext, ".csv, .xlsx, .xlsm, .xlsb, .xls or .ods")),
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> StoreResult<()> {
    let mut csv = headers
        .iter()
        .map(|h| csv_quote(h))
        .collect::<Vec<_>>()
        .join(",");
    csv.push('\n');
    for row in rows {
        csv.push_str(
            &row.iter()
                .map(|c| csv_quote(&c.text()))
                .collect::<Vec<_>>()
                .join(","),
        );
        csv.push('\n');
    }
    std::fs::write(path, csv)?;
    Ok(())
}

fn write_xlsx(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> StoreResult<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let line = (i + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => worksheet.write_string(line, col as u16, s.as_str())?,
                Cell::Number(n) => worksheet.write_number(line, col as u16, *n)?,
            };
        }
    }
    workbook.save(path)?;
    Ok(())
}

/// Checks that `path` names a format `write_sheet` can produce.
pub fn check_writable(path: &Path) -> StoreResult<()> {
    match extension(path).as_deref() {
        None | Some("csv") | Some("xlsx") => Ok(()),
        Some(ext) => Err(unsupported("outPath", ext, ".csv or .xlsx")),
    }
}

/// Writes CSV, or an `.xlsx` workbook when the path asks for one.
pub fn write_sheet(path: &Path, headers: &[&str], rows: &[Vec<Cell>]) -> StoreResult<()> {
    check_writable(path)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match extension(path).as_deref() {
        Some("xlsx") => write_xlsx(path, headers, rows),
        _ => write_csv(path, headers, rows),
    }
}
