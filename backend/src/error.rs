//! Error types for the KPI report pipeline.
//!
//! One enum per layer:
//!
//! - [`InputError`] - spreadsheet loading errors (CSV and workbook)
//! - [`KpiError`] - catalog and column errors during KPI calculation
//! - [`ExportError`] - CSV/XLSX serialization errors
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Input Errors
// =============================================================================

/// Errors while loading the uploaded spreadsheet.
#[derive(Debug, Error)]
pub enum InputError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV content.
    #[error("Invalid CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    /// The workbook could not be opened or a sheet could not be read.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// The requested sheet does not exist.
    #[error("Sheet not found: '{name}' (available: {available})")]
    SheetNotFound { name: String, available: String },

    /// Empty file.
    #[error("Input file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in input")]
    NoHeaders,
}

impl From<csv::Error> for InputError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line()).unwrap_or(0);
        InputError::Csv {
            line,
            message: e.to_string(),
        }
    }
}

// =============================================================================
// KPI Errors
// =============================================================================

/// Errors from the KPI catalog and calculator.
#[derive(Debug, Error)]
pub enum KpiError {
    /// Columns the report cannot be built without.
    #[error("Missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// Catalog structure is invalid.
    #[error("Invalid KPI catalog: {0}")]
    InvalidCatalog(String),

    /// Catalog JSON could not be parsed.
    #[error("KPI catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while serializing or re-reading a report.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writer/reader error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook writer error.
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// IO error while flushing a buffer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A re-imported report does not have the exported layout.
    #[error("Invalid report layout: {0}")]
    InvalidReport(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by [`crate::transform::pipeline::build_report`].
/// It wraps all lower-level errors and adds pipeline-specific variants.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input loading error.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// KPI calculation error.
    #[error("KPI error: {0}")]
    Kpi(#[from] KpiError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO error (catalog files, output files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An option value is out of range.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// The sheet has headers but no data rows.
    #[error("No records to process")]
    EmptyInput,

    /// Every data row was rejected (missing keys or timestamps).
    #[error("None of the {0} rows could be used (missing element names or timestamps)")]
    NoUsableRows(usize),
}

impl PipelineError {
    /// Whether the error was caused by the uploaded data or the options,
    /// as opposed to an internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Input(_)
                | PipelineError::Kpi(_)
                | PipelineError::InvalidOption(_)
                | PipelineError::EmptyInput
                | PipelineError::NoUsableRows(_)
        )
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Socket or listener error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for input operations.
pub type InputResult<T> = Result<T, InputError>;

/// Result type for KPI operations.
pub type KpiResult<T> = Result<T, KpiError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // InputError -> PipelineError
        let input_err = InputError::EmptyFile;
        let pipeline_err: PipelineError = input_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // KpiError -> PipelineError
        let kpi_err = KpiError::MissingColumns {
            columns: vec!["RNC name".into(), "Period start time".into()],
        };
        let pipeline_err: PipelineError = kpi_err.into();
        let msg = pipeline_err.to_string();
        assert!(msg.contains("RNC name"));
        assert!(msg.contains("Period start time"));
        assert!(pipeline_err.is_client_error());
    }

    #[test]
    fn test_sheet_not_found_format() {
        let err = InputError::SheetNotFound {
            name: "Hourly".into(),
            available: "BBH, Daily".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'Hourly'"));
        assert!(msg.contains("BBH, Daily"));
    }

    #[test]
    fn test_export_error_is_not_client_error() {
        let err: PipelineError = ExportError::InvalidReport("no KPI NAME column".into()).into();
        assert!(!err.is_client_error());
    }
}
