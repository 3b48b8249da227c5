//! Report building.
//!
//! - Pivot: per-interval KPI rows to the wide element x time layout
//! - Pipeline: parse, compute, pivot in one call

pub mod pipeline;
pub mod pivot;

pub use pipeline::*;
pub use pivot::{pivot, PivotOptions};
