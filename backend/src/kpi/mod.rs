//! KPI computation.
//!
//! - `catalog`: which KPIs exist and how each is derived from counters
//! - `columns`: required-column check and missing-column report
//! - `calculator`: per-row KPI evaluation
//!
//! ## Usage Flow
//!
//! ```text
//! Table → columns::check_columns → calculator::calculate → KpiRow[] → pivot
//! ```

pub mod calculator;
pub mod catalog;
pub mod columns;

pub use calculator::{calculate, ratio, Calculation, KpiRow, SkippedRow};
pub use catalog::{catalog_description, Formula, KpiCatalog, KpiDefinition};
pub use columns::{check_columns, ColumnReport, MissingCounter};
