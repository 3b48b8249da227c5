//! Domain models for the KPI report pipeline.
//!
//! - [`Cell`] / [`Table`] - a loaded spreadsheet, independent of its source format
//! - [`ReportLevel`] - which network elements the report is keyed by
//! - [`Granularity`] / [`TimeBucket`] - the time axis of the report
//! - [`PivotedReport`] / [`ReportRow`] - the final wide table, one row per (element, KPI)

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Well-known columns
// =============================================================================

/// Timestamp of the measurement interval.
pub const PERIOD_START_TIME: &str = "Period start time";
/// Radio network controller.
pub const RNC_NAME: &str = "RNC name";
/// Site (NodeB).
pub const WBTS_NAME: &str = "WBTS name";
/// Cell.
pub const WCEL_NAME: &str = "WCEL name";
/// Column holding the KPI name in the pivoted report.
pub const KPI_NAME: &str = "KPI NAME";

// =============================================================================
// Cell / Table
// =============================================================================

/// A single spreadsheet value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Build a cell from raw text. Blank text becomes [`Cell::Empty`].
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Numeric value of the cell. Text is parsed as a plain decimal;
    /// non-finite values are treated as missing.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            Cell::Empty | Cell::DateTime(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            // Whole numbers print without a trailing ".0" so numeric
            // element names match their text form.
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                write!(f, "{}", *n as i64)
            }
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

static EMPTY_CELL: Cell = Cell::Empty;

/// Where a data row came from in the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOrigin {
    /// Worksheet name; `None` for CSV.
    pub sheet: Option<String>,
    /// 1-based line (CSV) or row number (worksheet).
    pub line: usize,
}

/// A loaded sheet: a header row plus data rows.
///
/// Rows may be shorter than the header; missing trailing cells read as empty.
/// `origins` runs parallel to `rows`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub origins: Vec<RowOrigin>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            origins: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<Cell>, origin: RowOrigin) {
        self.rows.push(cells);
        self.origins.push(origin);
    }

    /// Source position of a row. Rows added without one are assumed to follow
    /// a single header line with no gaps.
    pub fn origin(&self, row: usize) -> RowOrigin {
        self.origins.get(row).cloned().unwrap_or(RowOrigin {
            sheet: None,
            line: row + 2,
        })
    }

    /// Index of a column by exact (trimmed) header name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (row, column); out-of-range reads as empty.
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append another sheet's rows, aligning columns by header name.
    /// Columns unknown to `self` are added at the end.
    pub fn append(&mut self, other: Table) {
        let mapping: Vec<usize> = other
            .headers
            .iter()
            .map(|h| match self.column_index(h) {
                Some(i) => i,
                None => {
                    self.headers.push(h.clone());
                    self.headers.len() - 1
                }
            })
            .collect();

        if self.origins.len() != self.rows.len() {
            self.origins = (0..self.rows.len()).map(|i| self.origin(i)).collect();
        }

        let width = self.headers.len();
        let origins: Vec<RowOrigin> = (0..other.rows.len()).map(|i| other.origin(i)).collect();
        for (row, origin) in other.rows.into_iter().zip(origins) {
            let mut aligned = vec![Cell::Empty; width];
            for (cell, &target) in row.into_iter().zip(&mapping) {
                aligned[target] = cell;
            }
            self.push_row(aligned, origin);
        }
    }
}

// =============================================================================
// Report level
// =============================================================================

/// Network-element level the report is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    /// One row group per (RNC, WBTS).
    #[default]
    Site,
    /// One row group per (RNC, WCEL).
    Cell,
}

impl ReportLevel {
    /// Grouping key columns, outermost first.
    pub fn key_columns(&self) -> [&'static str; 2] {
        match self {
            ReportLevel::Site => [RNC_NAME, WBTS_NAME],
            ReportLevel::Cell => [RNC_NAME, WCEL_NAME],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportLevel::Site => "Site",
            ReportLevel::Cell => "Cell",
        }
    }
}

impl FromStr for ReportLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "site" | "wbts" => Ok(ReportLevel::Site),
            "cell" | "wcel" => Ok(ReportLevel::Cell),
            other => Err(format!("unknown report level '{}' (expected site or cell)", other)),
        }
    }
}

// =============================================================================
// Time axis
// =============================================================================

/// Time granularity of the report columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Hour,
}

impl Granularity {
    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Day => "Day",
            Granularity::Hour => "Hour",
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" | "date" => Ok(Granularity::Day),
            "hour" | "hourly" => Ok(Granularity::Hour),
            other => Err(format!("unknown granularity '{}' (expected day or hour)", other)),
        }
    }
}

/// One report column: a date, optionally narrowed to an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    pub date: NaiveDate,
    pub hour: Option<u8>,
}

impl TimeBucket {
    pub fn of(timestamp: NaiveDateTime, granularity: Granularity) -> Self {
        let hour = match granularity {
            Granularity::Day => None,
            Granularity::Hour => Some(timestamp.hour() as u8),
        };
        Self {
            date: timestamp.date(),
            hour,
        }
    }

    /// Column label: `2025-01-15` or `2025-01-15 07:00`.
    pub fn label(&self) -> String {
        match self.hour {
            None => self.date.format("%Y-%m-%d").to_string(),
            Some(h) => format!("{} {:02}:00", self.date.format("%Y-%m-%d"), h),
        }
    }

    /// Inverse of [`TimeBucket::label`].
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        match label.split_once(' ') {
            None => Some(Self {
                date: NaiveDate::parse_from_str(label, "%Y-%m-%d").ok()?,
                hour: None,
            }),
            Some((date, time)) => {
                let hour: u8 = time.strip_suffix(":00")?.parse().ok()?;
                if hour > 23 {
                    return None;
                }
                Some(Self {
                    date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
                    hour: Some(hour),
                })
            }
        }
    }
}

// =============================================================================
// Pivoted report
// =============================================================================

/// One output row: an element, a KPI, and one value per time bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub keys: Vec<String>,
    pub kpi: String,
    pub values: Vec<Option<f64>>,
}

impl ReportRow {
    /// Keys, KPI name, then formatted values.
    pub fn to_strings(&self) -> Vec<String> {
        self.keys
            .iter()
            .cloned()
            .chain(std::iter::once(self.kpi.clone()))
            .chain(self.values.iter().map(|v| format_value(*v)))
            .collect()
    }
}

/// Wide report keyed by element and KPI name, one column per time bucket.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PivotedReport {
    pub key_columns: Vec<String>,
    pub buckets: Vec<TimeBucket>,
    pub rows: Vec<ReportRow>,
}

impl PivotedReport {
    /// Header row: key columns, `KPI NAME`, then one label per bucket.
    pub fn header(&self) -> Vec<String> {
        self.key_columns
            .iter()
            .cloned()
            .chain(std::iter::once(KPI_NAME.to_string()))
            .chain(self.buckets.iter().map(TimeBucket::label))
            .collect()
    }

    /// Value for an (element, KPI, bucket) cell, if present.
    pub fn value(&self, keys: &[&str], kpi: &str, bucket: &TimeBucket) -> Option<f64> {
        let col = self.buckets.iter().position(|b| b == bucket)?;
        self.rows
            .iter()
            .find(|r| r.kpi == kpi && r.keys.iter().map(String::as_str).eq(keys.iter().copied()))
            .and_then(|r| r.values[col])
    }

    /// Number of distinct element key tuples.
    pub fn group_count(&self) -> usize {
        let mut count = 0;
        let mut last: Option<&Vec<String>> = None;
        for row in &self.rows {
            if last != Some(&row.keys) {
                count += 1;
                last = Some(&row.keys);
            }
        }
        count
    }

    /// Every row rendered as text, header excluded.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(ReportRow::to_strings).collect()
    }

    /// First `n` rows rendered as text.
    pub fn head(&self, n: usize) -> Vec<Vec<String>> {
        self.rows.iter().take(n).map(ReportRow::to_strings).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Text form of a report value: shortest round-trip decimal, empty when missing.
pub fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
