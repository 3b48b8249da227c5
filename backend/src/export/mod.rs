//! Report serialization.
//!
//! CSV values are written in Rust's shortest round-trip float form, so
//! [`read_csv`] recovers exactly the exported `f64`s.

use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ExportError, ExportResult};
use crate::models::{Granularity, PivotedReport, ReportLevel, ReportRow, TimeBucket, KPI_NAME};

/// Name of the single worksheet in exported workbooks.
pub const SHEET_NAME: &str = "KPIs";

/// Download format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    /// Guess from an output path's extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unknown export format '{}' (expected csv or xlsx)", other)),
        }
    }
}

/// Download file name, e.g. `3G_Day_Site_Level_KPIs_output.csv`.
pub fn output_file_name(level: ReportLevel, granularity: Granularity, format: ExportFormat) -> String {
    format!(
        "3G_{}_{}_Level_KPIs_output.{}",
        granularity.label(),
        level.label(),
        format.extension()
    )
}

/// Serialize in the requested format.
pub fn export(report: &PivotedReport, format: ExportFormat) -> ExportResult<Vec<u8>> {
    match format {
        ExportFormat::Csv => to_csv(report),
        ExportFormat::Xlsx => to_xlsx(report),
    }
}

/// UTF-8 CSV, comma separated, header first.
pub fn to_csv(report: &PivotedReport) -> ExportResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(report.header())?;

    for row in &report.rows {
        writer.write_record(row.to_strings())?;
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Single-sheet workbook with a bold, frozen header row.
pub fn to_xlsx(report: &PivotedReport) -> ExportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, name) in report.header().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header_format)?;
    }

    let value_offset = report.key_columns.len() + 1;
    for (row_idx, row) in report.rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;

        for (col, key) in row.keys.iter().enumerate() {
            worksheet.write_string(r, col as u16, key)?;
        }
        worksheet.write_string(r, row.keys.len() as u16, &row.kpi)?;

        for (i, value) in row.values.iter().enumerate() {
            if let Some(v) = value {
                worksheet.write_number(r, (value_offset + i) as u16, *v)?;
            }
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();

    Ok(workbook.save_to_buffer()?)
}

/// Re-import a CSV produced by [`to_csv`].
pub fn read_csv(bytes: &[u8]) -> ExportResult<PivotedReport> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);

    let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let kpi_col = header
        .iter()
        .position(|h| h == KPI_NAME)
        .ok_or_else(|| ExportError::InvalidReport(format!("no '{}' column", KPI_NAME)))?;

    let key_columns = header[..kpi_col].to_vec();
    let buckets = header[kpi_col + 1..]
        .iter()
        .map(|label| {
            TimeBucket::parse_label(label)
                .ok_or_else(|| ExportError::InvalidReport(format!("bad time column '{}'", label)))
        })
        .collect::<ExportResult<Vec<_>>>()?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: Vec<&str> = record.iter().collect();

        let values = fields[kpi_col + 1..]
            .iter()
            .map(|f| parse_value(f))
            .collect::<ExportResult<Vec<_>>>()?;

        rows.push(ReportRow {
            keys: fields[..kpi_col].iter().map(|s| s.to_string()).collect(),
            kpi: fields[kpi_col].to_string(),
            values,
        });
    }

    Ok(PivotedReport {
        key_columns,
        buckets,
        rows,
    })
}

fn parse_value(field: &str) -> ExportResult<Option<f64>> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ExportError::InvalidReport(format!("not a number: '{}'", field)))
}
