//! Required-column check.
//!
//! Structural columns (timestamp and element keys) are mandatory. Counter
//! columns are optional per KPI: a missing counter disables the KPIs that read
//! it and is reported, never silently dropped.

use serde::Serialize;

use super::catalog::KpiCatalog;
use crate::models::PERIOD_START_TIME;

/// A counter column absent from the input and the KPIs it disables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingCounter {
    pub column: String,
    pub kpis: Vec<String>,
}

/// Outcome of comparing the input headers with what a report needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnReport {
    /// Timestamp/key columns that are absent.
    pub missing_structural: Vec<String>,
    /// Counter columns that are absent.
    pub missing_counters: Vec<MissingCounter>,
    /// KPIs that can be computed, in catalog order.
    pub active_kpis: Vec<String>,
    /// KPIs skipped because an input is missing, in catalog order.
    pub disabled_kpis: Vec<String>,
}

impl ColumnReport {
    /// Every column the report can use is present.
    pub fn is_complete(&self) -> bool {
        self.missing_structural.is_empty() && self.missing_counters.is_empty()
    }

    /// The report cannot be built at all.
    pub fn is_fatal(&self) -> bool {
        !self.missing_structural.is_empty() || self.active_kpis.is_empty()
    }

    /// All missing column names, structural first.
    pub fn missing_columns(&self) -> Vec<String> {
        self.missing_structural
            .iter()
            .cloned()
            .chain(self.missing_counters.iter().map(|m| m.column.clone()))
            .collect()
    }

    /// One line per missing counter, for logs and API responses.
    pub fn warnings(&self) -> Vec<String> {
        self.missing_counters
            .iter()
            .map(|m| format!("Missing column '{}': skipped {}", m.column, m.kpis.join(", ")))
            .collect()
    }
}

/// Compare `headers` with the timestamp, the grouping keys and the catalog inputs.
pub fn check_columns(headers: &[String], catalog: &KpiCatalog, key_columns: &[&str]) -> ColumnReport {
    let present = |name: &str| headers.iter().any(|h| h == name);

    let missing_structural: Vec<String> = std::iter::once(PERIOD_START_TIME)
        .chain(key_columns.iter().copied())
        .filter(|c| !present(c))
        .map(String::from)
        .collect();

    let mut report = ColumnReport {
        missing_structural,
        ..ColumnReport::default()
    };

    for column in catalog.required_columns() {
        if present(column) {
            continue;
        }
        let kpis = catalog
            .kpis
            .iter()
            .filter(|k| k.formula.inputs().contains(&column))
            .map(|k| k.name.clone())
            .collect();
        report.missing_counters.push(MissingCounter {
            column: column.to_string(),
            kpis,
        });
    }

    for kpi in &catalog.kpis {
        if kpi.formula.inputs().iter().all(|c| present(c)) {
            report.active_kpis.push(kpi.name.clone());
        } else {
            report.disabled_kpis.push(kpi.name.clone());
        }
    }

    report
}
