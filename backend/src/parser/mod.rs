//! Spreadsheet loader with format, encoding and delimiter auto-detection.
//!
//! Accepts CSV exports and Excel workbooks and turns them into a [`Table`].
//! No KPI-specific logic here.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

use crate::error::{InputError, InputResult};
use crate::models::{Cell, RowOrigin, Table};

/// Format of the uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

/// Which worksheet(s) of a workbook to load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "name", rename_all = "lowercase")]
pub enum SheetSelection {
    /// First sheet in the workbook.
    #[default]
    First,
    /// A sheet by exact name.
    Named(String),
    /// Every non-empty sheet, concatenated.
    All,
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Loaded rows
    pub table: Table,
    /// Detected source format
    pub format: SourceFormat,
    /// Detected encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only)
    pub delimiter: Option<char>,
    /// Sheets that contributed rows (workbooks only)
    pub sheets: Vec<String>,
}

/// Detect the source format from the file name, falling back to the ZIP magic
/// bytes every `.xlsx` starts with.
pub fn detect_format(bytes: &[u8], file_name: Option<&str>) -> SourceFormat {
    let ext = file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    match ext.as_deref() {
        Some("xlsx") | Some("xlsm") => SourceFormat::Xlsx,
        Some("csv") | Some("txt") => SourceFormat::Csv,
        _ if bytes.starts_with(b"PK\x03\x04") => SourceFormat::Xlsx,
        _ => SourceFormat::Csv,
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding label.
///
/// Any WHATWG label is accepted; unknown labels decode as UTF-8. Malformed
/// sequences are replaced rather than rejected and a leading byte-order mark
/// is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let encoding = Encoding::for_label(encoding.trim().as_bytes()).unwrap_or(UTF_8);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// The first record is the header. Quoted fields are honoured, blank lines are
/// skipped and short rows read as empty trailing cells.
pub fn parse_csv_str(content: &str, delimiter: char) -> InputResult<Table> {
    if content.trim().is_empty() {
        return Err(InputError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record?,
        None => return Err(InputError::EmptyFile),
    };
    let headers: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(InputError::NoHeaders);
    }

    let mut table = Table::new(headers);
    for (index, record) in records.enumerate() {
        let record = record?;
        let row: Vec<Cell> = record.iter().map(Cell::from_text).collect();
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2);
        table.push_row(row, RowOrigin { sheet: None, line });
    }

    Ok(table)
}

/// Parse an `.xlsx` workbook. The first row of each sheet is its header.
///
/// Returns the table and the names of the sheets that contributed rows.
pub fn parse_xlsx(bytes: &[u8], selection: &SheetSelection) -> InputResult<(Table, Vec<String>)> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: calamine::XlsxError| InputError::Workbook(e.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(InputError::Workbook("workbook has no sheets".to_string()));
    }

    let wanted: Vec<String> = match selection {
        SheetSelection::First => vec![sheet_names[0].clone()],
        SheetSelection::Named(name) => {
            if !sheet_names.iter().any(|s| s == name) {
                return Err(InputError::SheetNotFound {
                    name: name.clone(),
                    available: sheet_names.join(", "),
                });
            }
            vec![name.clone()]
        }
        SheetSelection::All => sheet_names,
    };

    let mut combined: Option<Table> = None;
    let mut used = Vec::new();

    for name in &wanted {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| InputError::Workbook(format!("cannot read sheet '{}': {}", name, e)))?;

        let Some(table) = range_to_table(&range, name) else {
            continue;
        };

        used.push(name.clone());
        match combined.as_mut() {
            Some(existing) => existing.append(table),
            None => combined = Some(table),
        }
    }

    match combined {
        Some(table) => Ok((table, used)),
        None => Err(InputError::EmptyFile),
    }
}

/// Convert a calamine range into a [`Table`]. First row = headers.
/// Returns `None` for sheets without a usable header row.
///
/// Row origins are 1-based worksheet row numbers; the range may start below
/// row 1 when leading rows are blank.
fn range_to_table(range: &calamine::Range<Data>, sheet: &str) -> Option<Table> {
    let header_line = range.start().map(|(row, _)| row as usize + 1)?;
    let mut rows = range.rows();

    let header_row = rows.next()?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| data_to_cell(c).to_string().trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return None;
    }

    let mut table = Table::new(headers);
    for (offset, row) in rows.enumerate() {
        let cells: Vec<Cell> = row.iter().map(data_to_cell).collect();
        if cells.iter().all(Cell::is_empty) {
            continue;
        }
        let origin = RowOrigin {
            sheet: Some(sheet.to_string()),
            line: header_line + offset + 1,
        };
        table.push_row(cells, origin);
    }

    Some(table)
}

/// Convert a calamine cell.
fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::DateTime)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => parse_timestamp_str(s)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::from_text(s)),
        other => Cell::from_text(&other.to_string()),
    }
}

/// Convert an Excel serial date (days since 1899-12-30) to a timestamp,
/// rounded to the second.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    // NetAct exports are month-first; day-first only matches when the
    // first field cannot be a month.
    "%m.%d.%Y %H:%M:%S",
    "%m.%d.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m.%d.%Y", "%d.%m.%Y", "%m/%d/%Y"];

/// Parse a textual timestamp in any of the supported layouts.
pub fn parse_timestamp_str(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_end_matches('Z');
    if raw.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Interpret a cell as an interval timestamp. Unparseable values yield `None`.
pub fn parse_timestamp(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Number(n) => excel_serial_to_datetime(*n),
        Cell::Text(s) => parse_timestamp_str(s),
        Cell::Empty => None,
    }
}

/// Parse bytes with auto-detection of format, encoding and delimiter.
pub fn parse_bytes_auto(
    bytes: &[u8],
    file_name: Option<&str>,
    selection: &SheetSelection,
) -> InputResult<ParseResult> {
    if bytes.is_empty() {
        return Err(InputError::EmptyFile);
    }

    match detect_format(bytes, file_name) {
        SourceFormat::Xlsx => {
            let (table, sheets) = parse_xlsx(bytes, selection)?;
            Ok(ParseResult {
                table,
                format: SourceFormat::Xlsx,
                encoding: None,
                delimiter: None,
                sheets,
            })
        }
        SourceFormat::Csv => {
            let encoding = detect_encoding(bytes);
            let content = decode_content(bytes, &encoding);
            let delimiter = detect_delimiter(&content);
            let table = parse_csv_str(&content, delimiter)?;
            Ok(ParseResult {
                table,
                format: SourceFormat::Csv,
                encoding: Some(encoding),
                delimiter: Some(delimiter),
                sheets: Vec::new(),
            })
        }
    }
}

/// Parse a file from disk with auto-detection.
pub fn parse_file_auto<P: AsRef<Path>>(path: P, selection: &SheetSelection) -> InputResult<ParseResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let file_name = path.file_name().and_then(|n| n.to_str());
    parse_bytes_auto(&bytes, file_name, selection)
}
