//! # kpireport - 3G KPI reports from raw counter exports
//!
//! Reads a counter export (CSV or `.xlsx`), computes ratio KPIs per row
//! (`numerator / denominator * 100`, 0 when the denominator is 0), and pivots
//! them into a wide report: one row per network element and KPI, one column
//! per day or hour.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│ KPI compute │────▶│    Pivot    │────▶│ CSV / XLSX  │
//! │  (upload)   │     │ (auto-enc)  │     │  (catalog)  │     │ (day/hour)  │     │ (download)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kpireport::{build_report, export, ExportFormat, KpiCatalog, Preset, ReportOptions};
//! use std::path::Path;
//!
//! let options = ReportOptions::preset(Preset::Bbh);
//! let output = build_report(Path::new("bbh.xlsx"), &options, &KpiCatalog::default())?;
//! let bytes = export(&output.report, ExportFormat::Csv)?;
//! std::fs::write(output.file_name(ExportFormat::Csv), bytes)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Layered error types
//! - [`models`] - Cells, tables, report levels and the pivoted report
//! - [`parser`] - CSV/XLSX loading with auto-detection
//! - [`kpi`] - KPI catalog, column check and per-row calculation
//! - [`transform`] - Pivot and the end-to-end pipeline
//! - [`export`] - CSV/XLSX serialization
//! - [`config`] - Server configuration from the environment
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Input
pub mod parser;

// KPI computation
pub mod kpi;

// Reshaping
pub mod transform;

// Output
pub mod export;

// HTTP API
pub mod api;
pub mod config;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ExportError, ExportResult, InputError, InputResult, KpiError, KpiResult, PipelineError, PipelineResult,
    ServerError, ServerResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Cell, Granularity, PivotedReport, ReportLevel, ReportRow, RowOrigin, Table, TimeBucket, KPI_NAME,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    detect_delimiter, detect_encoding, detect_format, parse_bytes_auto, parse_file_auto, ParseResult,
    SheetSelection, SourceFormat,
};

// =============================================================================
// Re-exports - KPI
// =============================================================================

pub use kpi::{calculate, check_columns, ratio, ColumnReport, Formula, KpiCatalog, KpiDefinition, SkippedRow};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    build_report, build_report_from_bytes, load_catalog, InputInfo, Preset, ReportOptions, ReportOutput,
};
pub use transform::pivot::{pivot, PivotOptions};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{export, output_file_name, read_csv, to_csv, to_xlsx, ExportFormat};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, KpiListResponse, PreviewResponse};
pub use config::ServerConfig;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
