//! REST API payloads.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::export::ExportFormat;
use crate::kpi::{Formula, KpiCatalog, MissingCounter, SkippedRow};
use crate::models::{Granularity, ReportLevel};
use crate::parser::SourceFormat;
use crate::transform::pipeline::ReportOutput;

/// Body of `POST /api/preview`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub job_id: String,

    /// "ready" or "warning"
    pub status: String,

    /// Name the report would be downloaded as
    pub file_name: String,

    /// Report header (keys, `KPI NAME`, time labels)
    pub header: Vec<String>,

    /// First report rows, values as text
    pub rows: Vec<Vec<String>>,

    pub metadata: PreviewMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetadata {
    pub input: InputMetadata,
    pub level: ReportLevel,
    pub granularity: Granularity,
    pub hour: Option<u8>,
    /// KPIs present in the report
    pub kpis: Vec<String>,
    pub groups: usize,
    pub time_columns: usize,
    pub report_rows: usize,
    pub missing_columns: Vec<MissingCounter>,
    pub skipped_rows: Vec<SkippedRow>,
    pub warnings: Vec<String>,
}

/// Uploaded file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMetadata {
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub sheets: Vec<String>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl PreviewResponse {
    pub fn from_output(output: &ReportOutput, format: ExportFormat, preview_rows: usize) -> Self {
        let warnings = output.warnings();

        PreviewResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if warnings.is_empty() { "ready" } else { "warning" }.to_string(),
            file_name: output.file_name(format),
            header: output.report.header(),
            rows: output.report.head(preview_rows),
            metadata: PreviewMetadata {
                input: InputMetadata {
                    format: output.input.format,
                    encoding: output.input.encoding.clone(),
                    delimiter: output.input.delimiter.map(|d| d.to_string()),
                    sheets: output.input.sheets.clone(),
                    row_count: output.input.row_count,
                    columns: output.input.headers.clone(),
                },
                level: output.options.level,
                granularity: output.options.granularity,
                hour: output.options.hour,
                kpis: output.columns.active_kpis.clone(),
                groups: output.report.group_count(),
                time_columns: output.report.buckets.len(),
                report_rows: output.report.rows.len(),
                missing_columns: output.columns.missing_counters.clone(),
                skipped_rows: output.skipped.clone(),
                warnings,
            },
        }
    }
}

/// Body of `GET /api/kpis`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiListResponse {
    pub version: String,
    pub kpis: Vec<KpiInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiInfo {
    pub name: String,
    /// Human-readable formula, e.g. `100 * CS_RRC_Num_M / CS_RRC_Denum_M`
    pub formula: String,
    pub inputs: Vec<String>,
}

impl From<&KpiCatalog> for KpiListResponse {
    fn from(catalog: &KpiCatalog) -> Self {
        KpiListResponse {
            version: catalog.version.clone(),
            kpis: catalog
                .kpis
                .iter()
                .map(|k| KpiInfo {
                    name: k.name.clone(),
                    formula: describe_formula(&k.formula),
                    inputs: k.formula.inputs().iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        }
    }
}

fn describe_formula(formula: &Formula) -> String {
    match formula {
        Formula::Ratio {
            numerator,
            denominator,
            scale,
        } => format!("{} * {} / {}", scale, numerator, denominator),
        Formula::Column { source } => source.clone(),
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}
