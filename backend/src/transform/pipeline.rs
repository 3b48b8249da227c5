//! High-level pipeline API: spreadsheet in, pivoted KPI report out.
//!
//! Combines all steps: parsing, column check, KPI calculation and pivot.
//!
//! # Example
//!
//! ```rust,ignore
//! use kpireport::{build_report, KpiCatalog, ReportOptions, Preset};
//! use std::path::Path;
//!
//! let options = ReportOptions::preset(Preset::Bbh);
//! let output = build_report(Path::new("bbh.xlsx"), &options, &KpiCatalog::default())?;
//! println!("{} report rows", output.report.rows.len());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::error::{PipelineError, PipelineResult};
use crate::export::{output_file_name, ExportFormat};
use crate::kpi::{calculate, ColumnReport, KpiCatalog, SkippedRow};
use crate::models::{Granularity, PivotedReport, ReportLevel};
use crate::parser::{parse_bytes_auto, parse_file_auto, ParseResult, SheetSelection, SourceFormat};
use super::pivot::{pivot, PivotOptions};

/// Named option sets matching the two report flavours engineers ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Busy-hour export: site level, one column per day.
    Bbh,
    /// Continuous export: cell level, one column per day, single hour kept.
    Continue,
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bbh" => Ok(Preset::Bbh),
            "continue" | "continuous" => Ok(Preset::Continue),
            other => Err(format!("unknown preset '{}' (expected bbh or continue)", other)),
        }
    }
}

/// Options for one report run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOptions {
    /// Element level the rows are keyed by
    #[serde(default)]
    pub level: ReportLevel,

    /// Column granularity
    #[serde(default)]
    pub granularity: Granularity,

    /// Keep only intervals starting in this hour (0-23)
    #[serde(default)]
    pub hour: Option<u8>,

    /// Workbook sheet(s) to read
    #[serde(default)]
    pub sheet: SheetSelection,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::preset(Preset::Bbh)
    }
}

impl ReportOptions {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Bbh => Self {
                level: ReportLevel::Site,
                granularity: Granularity::Day,
                hour: None,
                sheet: SheetSelection::First,
            },
            Preset::Continue => Self {
                level: ReportLevel::Cell,
                granularity: Granularity::Day,
                hour: Some(0),
                sheet: SheetSelection::First,
            },
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        match self.hour {
            Some(h) if h > 23 => Err(PipelineError::InvalidOption(format!(
                "hour must be between 0 and 23, got {}",
                h
            ))),
            _ => Ok(()),
        }
    }

    pub fn pivot_options(&self) -> PivotOptions {
        PivotOptions {
            level: self.level,
            granularity: self.granularity,
            hour: self.hour,
        }
    }

    pub fn file_name(&self, format: ExportFormat) -> String {
        output_file_name(self.level, self.granularity, format)
    }
}

/// Input file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputInfo {
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub sheets: Vec<String>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of a complete report run
#[derive(Debug, Clone)]
pub struct ReportOutput {
    /// The pivoted report
    pub report: PivotedReport,

    /// Options the report was built with
    pub options: ReportOptions,

    /// Input metadata
    pub input: InputInfo,

    /// Missing-column report
    pub columns: ColumnReport,

    /// Rows excluded from the report
    pub skipped: Vec<SkippedRow>,
}

impl ReportOutput {
    /// Missing-column warnings followed by a skipped-rows summary.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = self.columns.warnings();
        warnings.extend(summarize_skipped(&self.skipped));
        if self.report.is_empty() {
            match self.options.hour {
                Some(h) => warnings.push(format!("No intervals starting at hour {}", h)),
                None => warnings.push("Report is empty".to_string()),
            }
        }
        warnings
    }

    pub fn file_name(&self, format: ExportFormat) -> String {
        self.options.file_name(format)
    }
}

/// Load a custom catalog, or the built-in one when `path` is `None`.
pub fn load_catalog(path: Option<&Path>) -> PipelineResult<KpiCatalog> {
    match path {
        Some(p) => {
            let catalog = KpiCatalog::from_file(p)?;
            log_success(format!("Loaded KPI catalog {} ({} KPIs)", p.display(), catalog.len()));
            Ok(catalog)
        }
        None => Ok(KpiCatalog::default()),
    }
}

/// Build a report from a spreadsheet file.
///
/// This is the main entry point for the pipeline. It:
/// 1. Parses the file with format auto-detection
/// 2. Checks the required columns
/// 3. Computes the KPIs per row
/// 4. Pivots by element and time bucket
pub fn build_report(
    path: &Path,
    options: &ReportOptions,
    catalog: &KpiCatalog,
) -> PipelineResult<ReportOutput> {
    options.validate()?;
    log_info(format!("📖 Reading {}...", path.display()));
    let parse_result = parse_file_auto(path, &options.sheet)?;
    build_from_parsed(parse_result, options, catalog)
}

/// Build a report from uploaded bytes.
///
/// Same as [`build_report`] but accepts raw bytes and an optional file name
/// (used for format detection).
pub fn build_report_from_bytes(
    bytes: &[u8],
    file_name: Option<&str>,
    options: &ReportOptions,
    catalog: &KpiCatalog,
) -> PipelineResult<ReportOutput> {
    options.validate()?;
    log_info(format!(
        "📖 Reading upload {} ({} bytes)...",
        file_name.unwrap_or("unknown"),
        bytes.len()
    ));
    let parse_result = parse_bytes_auto(bytes, file_name, &options.sheet)?;
    build_from_parsed(parse_result, options, catalog)
}

/// Build a report from an already-parsed input.
pub fn build_from_parsed(
    parse_result: ParseResult,
    options: &ReportOptions,
    catalog: &KpiCatalog,
) -> PipelineResult<ReportOutput> {
    print_input_info(&parse_result);

    let input = InputInfo {
        format: parse_result.format,
        encoding: parse_result.encoding.clone(),
        delimiter: parse_result.delimiter,
        sheets: parse_result.sheets.clone(),
        headers: parse_result.table.headers.clone(),
        row_count: parse_result.table.len(),
    };

    if parse_result.table.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    // Step 2+3: column check and KPI calculation
    log_info(format!("🧮 Computing {} KPIs ({} level)...", catalog.len(), options.level.label()));
    let key_columns = options.level.key_columns();
    let calculation = calculate(&parse_result.table, catalog, &key_columns).map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    print_column_report(&calculation.columns);

    if calculation.rows.is_empty() {
        for warning in summarize_skipped(&calculation.skipped) {
            log_warning(warning);
        }
        return Err(PipelineError::NoUsableRows(parse_result.table.len()));
    }
    log_success(format!(
        "{} rows computed, {} skipped",
        calculation.rows.len(),
        calculation.skipped.len()
    ));

    // Step 4: pivot
    match options.hour {
        Some(h) => log_info(format!("📊 Pivoting by {} (hour {:02} only)...", options.granularity.label(), h)),
        None => log_info(format!("📊 Pivoting by {}...", options.granularity.label())),
    }
    let report = pivot(&calculation.rows, &calculation.kpi_names, &options.pivot_options());
    log_success(format!(
        "{} report rows, {} elements, {} time columns",
        report.rows.len(),
        report.group_count(),
        report.buckets.len()
    ));

    let output = ReportOutput {
        report,
        options: options.clone(),
        input,
        columns: calculation.columns,
        skipped: calculation.skipped,
    };

    for warning in output.warnings() {
        log_warning(warning);
    }

    Ok(output)
}

/// Group skipped rows by reason: `"<n> rows skipped: <reason> (lines: 3, BBH!7, ...)"`.
fn summarize_skipped(skipped: &[SkippedRow]) -> Vec<String> {
    let mut reasons: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for skip in skipped {
        reasons.entry(skip.reason.as_str()).or_default().push(skip.location());
    }

    reasons
        .into_iter()
        .map(|(reason, lines)| {
            let sample: Vec<&str> = lines.iter().take(5).map(String::as_str).collect();
            let more = if lines.len() > 5 {
                format!(", ... +{}", lines.len() - 5)
            } else {
                String::new()
            };
            format!(
                "{} row(s) skipped: {} (lines: {}{})",
                lines.len(),
                reason,
                sample.join(", "),
                more
            )
        })
        .collect()
}

fn print_input_info(parse_result: &ParseResult) {
    match parse_result.format {
        SourceFormat::Csv => {
            if let Some(ref enc) = parse_result.encoding {
                log_success(format!("Detected encoding: {}", enc));
            }
            if let Some(d) = parse_result.delimiter {
                log_success(format!("Detected separator: '{}'", format_delimiter(d)));
            }
        }
        SourceFormat::Xlsx => {
            log_success(format!("Workbook sheets: {}", parse_result.sheets.join(", ")));
        }
    }
    log_success(format!("Read {} rows", parse_result.table.len()));
    log_info(format!("📋 {} columns:", parse_result.table.headers.len()));
    for (i, col) in parse_result.table.headers.iter().enumerate() {
        log_info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }
}

fn print_column_report(columns: &ColumnReport) {
    if columns.is_complete() {
        log_success(format!("All {} KPIs have their input columns", columns.active_kpis.len()));
    } else {
        log_warning(format!(
            "{} of {} KPIs skipped (missing columns)",
            columns.disabled_kpis.len(),
            columns.active_kpis.len() + columns.disabled_kpis.len()
        ));
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KpiError;
    use crate::export::{read_csv, to_csv};
    use crate::models::TimeBucket;
    use std::io::Write;

    const HEADER: &str = "Period start time;RNC name;WBTS name;WCEL name;CS_RRC_Num_M;CS_RRC_Denum_M;CS Traffic";

    fn upload(rows: &[&str]) -> Vec<u8> {
        let mut csv = HEADER.to_string();
        for r in rows {
            csv.push('\n');
            csv.push_str(r);
        }
        csv.into_bytes()
    }

    fn day(label: &str) -> TimeBucket {
        TimeBucket::parse_label(label).unwrap()
    }

    #[test]
    fn test_default_options_are_bbh() {
        let opts = ReportOptions::default();
        assert_eq!(opts.level, ReportLevel::Site);
        assert_eq!(opts.granularity, Granularity::Day);
        assert_eq!(opts.hour, None);
        assert_eq!(opts.file_name(ExportFormat::Csv), "3G_Day_Site_Level_KPIs_output.csv");
    }

    #[test]
    fn test_continue_preset() {
        let opts = ReportOptions::preset(Preset::Continue);
        assert_eq!(opts.level, ReportLevel::Cell);
        assert_eq!(opts.hour, Some(0));
        assert_eq!(opts.file_name(ExportFormat::Xlsx), "3G_Day_Cell_Level_KPIs_output.xlsx");
        assert_eq!("continuous".parse::<Preset>(), Ok(Preset::Continue));
    }

    #[test]
    fn test_invalid_hour_rejected() {
        let opts = ReportOptions {
            hour: Some(24),
            ..ReportOptions::default()
        };
        let err = build_report_from_bytes(b"a", None, &opts, &KpiCatalog::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOption(_)));
    }

    #[test]
    fn test_site_level_report() {
        let bytes = upload(&[
            "2025-01-15 00:00:00;RNC01;SITE_A;CELL_1;49;50;1.5",
            "2025-01-15 00:00:00;RNC01;SITE_A;CELL_2;50;50;2.5",
            "2025-01-16 00:00:00;RNC01;SITE_A;CELL_1;0;0;1",
        ]);

        let output =
            build_report_from_bytes(&bytes, Some("bbh.csv"), &ReportOptions::default(), &KpiCatalog::default())
                .unwrap();
        let report = &output.report;

        assert_eq!(output.input.row_count, 3);
        assert_eq!(output.input.delimiter, Some(';'));
        assert_eq!(report.buckets, vec![day("2025-01-15"), day("2025-01-16")]);
        assert_eq!(report.value(&["RNC01", "SITE_A"], "CS RRC SR", &day("2025-01-15")), Some(198.0));
        assert_eq!(report.value(&["RNC01", "SITE_A"], "CS RRC SR", &day("2025-01-16")), Some(0.0));
        assert_eq!(report.value(&["RNC01", "SITE_A"], "CS Traffic", &day("2025-01-15")), Some(4.0));

        // Missing ratio counters are reported as warnings.
        let warnings = output.warnings();
        assert!(warnings.iter().any(|w| w.contains("PS_RRC_Num_M")));
        assert_eq!(output.columns.active_kpis, vec!["CS RRC SR", "CS Traffic"]);
    }

    #[test]
    fn test_continue_report_filters_hour() {
        let bytes = upload(&[
            "2025-01-15 00:00:00;RNC01;SITE_A;CELL_1;1;2;1",
            "2025-01-15 05:00:00;RNC01;SITE_A;CELL_1;1;4;2",
            "2025-01-15 05:00:00;RNC01;SITE_A;CELL_2;1;1;3",
        ]);
        let options = ReportOptions {
            hour: Some(5),
            ..ReportOptions::preset(Preset::Continue)
        };

        let output = build_report_from_bytes(&bytes, None, &options, &KpiCatalog::default()).unwrap();
        let report = &output.report;

        assert_eq!(report.key_columns, vec!["RNC name", "WCEL name"]);
        assert_eq!(report.value(&["RNC01", "CELL_1"], "CS RRC SR", &day("2025-01-15")), Some(25.0));
        assert_eq!(report.value(&["RNC01", "CELL_2"], "CS RRC SR", &day("2025-01-15")), Some(100.0));
        assert_eq!(report.group_count(), 2);
    }

    #[test]
    fn test_hour_with_no_data_is_warning_not_error() {
        let bytes = upload(&["2025-01-15 00:00:00;RNC01;SITE_A;CELL_1;1;2;1"]);
        let options = ReportOptions {
            hour: Some(12),
            ..ReportOptions::default()
        };

        let output = build_report_from_bytes(&bytes, None, &options, &KpiCatalog::default()).unwrap();
        assert!(output.report.is_empty());
        assert!(output.warnings().iter().any(|w| w.contains("hour 12")));
    }

    #[test]
    fn test_missing_key_column_is_reported_error() {
        let bytes = b"Period start time;RNC name;CS Traffic\n2025-01-15 00:00;RNC01;1".to_vec();
        let err = build_report_from_bytes(&bytes, None, &ReportOptions::default(), &KpiCatalog::default())
            .unwrap_err();

        match err {
            PipelineError::Kpi(KpiError::MissingColumns { columns }) => {
                assert_eq!(columns.first().map(String::as_str), Some("WBTS name"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_usable_rows() {
        let bytes = upload(&["garbage;RNC01;SITE_A;CELL_1;1;2;1", ";RNC01;SITE_A;CELL_1;1;2;1"]);
        let err = build_report_from_bytes(&bytes, None, &ReportOptions::default(), &KpiCatalog::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoUsableRows(2)));
    }

    #[test]
    fn test_header_only_is_empty_input() {
        let err = build_report_from_bytes(HEADER.as_bytes(), None, &ReportOptions::default(), &KpiCatalog::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[test]
    fn test_export_then_reimport_roundtrip() {
        let bytes = upload(&[
            "2025-01-15 00:00:00;RNC01;SITE_A;CELL_1;1;3;0.1",
            "2025-01-15 01:00:00;RNC01;SITE_A;CELL_1;2;3;0.2",
            "2025-01-15 00:00:00;RNC02;SITE_B;CELL_9;7;9;",
        ]);
        let output =
            build_report_from_bytes(&bytes, None, &ReportOptions::default(), &KpiCatalog::default()).unwrap();

        let back = read_csv(&to_csv(&output.report).unwrap()).unwrap();
        assert_eq!(back, output.report);
    }

    #[test]
    fn test_build_report_from_file_with_custom_catalog() {
        let mut data = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(data, "Period start time,RNC name,WBTS name,ok,att\n2025-01-15 00:00,RNC01,SITE_A,3,4\n").unwrap();

        let mut catalog_file = tempfile::NamedTempFile::new().unwrap();
        write!(
            catalog_file,
            r#"{{ "kpis": [ {{ "name": "Setup SR", "formula": {{ "type": "ratio", "numerator": "ok", "denominator": "att" }} }} ] }}"#
        )
        .unwrap();

        let catalog = load_catalog(Some(catalog_file.path())).unwrap();
        let output = build_report(data.path(), &ReportOptions::default(), &catalog).unwrap();

        assert!(output.columns.is_complete());
        assert_eq!(
            output.report.value(&["RNC01", "SITE_A"], "Setup SR", &day("2025-01-15")),
            Some(75.0)
        );
    }

    #[test]
    fn test_skipped_rows_point_at_worksheet_rows() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        for (name, rows) in [
            ("Day1", vec![(1, "2025-01-15 00:00")]),
            ("Day2", vec![(1, "2025-01-16 00:00"), (3, "garbage")]),
        ] {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name).unwrap();
            for (c, h) in ["Period start time", "RNC name", "WBTS name", "CS Traffic"].iter().enumerate() {
                sheet.write_string(0, c as u16, *h).unwrap();
            }
            for (r, time) in rows {
                sheet.write_string(r, 0, time).unwrap();
                sheet.write_string(r, 1, "RNC01").unwrap();
                sheet.write_string(r, 2, "SITE_A").unwrap();
                sheet.write_number(r, 3, 1.0).unwrap();
            }
        }
        let bytes = workbook.save_to_buffer().unwrap();
        let options = ReportOptions {
            sheet: SheetSelection::All,
            ..ReportOptions::default()
        };

        let output = build_report_from_bytes(&bytes, Some("bbh.xlsx"), &options, &KpiCatalog::default()).unwrap();

        assert_eq!(
            output.skipped,
            vec![SkippedRow {
                sheet: Some("Day2".into()),
                line: 4,
                reason: "unparseable 'Period start time' value 'garbage'".into(),
            }]
        );
        assert!(output.warnings().iter().any(|w| w.ends_with("(lines: Day2!4)")));
        assert_eq!(output.report.buckets.len(), 2);
    }

    #[test]
    fn test_summarize_skipped() {
        let skipped: Vec<SkippedRow> = (2..10)
            .map(|line| SkippedRow {
                sheet: None,
                line,
                reason: "empty 'WBTS name'".into(),
            })
            .collect();

        assert_eq!(
            summarize_skipped(&skipped),
            vec!["8 row(s) skipped: empty 'WBTS name' (lines: 2, 3, 4, 5, 6, ... +3)"]
        );
    }
}
