//! Pivot per-interval KPI rows into the wide report.
//!
//! # Layout
//!
//! ```text
//! KPI rows (one per element per interval)        →  Pivoted report
//! ┌───────────────────────────────────────┐        ┌────────────────────────────────────────────┐
//! │ RNC01 SITE_A 01-15 00:00  CS RRC SR=98│        │ RNC  WBTS    KPI NAME   2025-01-15 01-16   │
//! │ RNC01 SITE_A 01-15 01:00  CS RRC SR=99│   →    │ RNC01 SITE_A CS RRC SR  197        ...     │
//! │ RNC01 SITE_A 01-16 00:00  CS RRC SR=97│        │ RNC01 SITE_A CS DCR     ...        ...     │
//! └───────────────────────────────────────┘        └────────────────────────────────────────────┘
//! ```
//!
//! Values are **summed** per (element, time bucket, KPI). Groups are ordered by
//! key, KPIs by catalog order, buckets chronologically. A (element, KPI) row
//! with no value in any bucket is omitted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::kpi::KpiRow;
use crate::models::{Granularity, PivotedReport, ReportLevel, ReportRow, TimeBucket};

/// Shape of the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PivotOptions {
    pub level: ReportLevel,
    pub granularity: Granularity,
    /// Keep only intervals starting in this hour (0-23).
    pub hour: Option<u8>,
}

/// Pivot `rows` (values parallel to `kpi_names`) into a [`PivotedReport`].
pub fn pivot(rows: &[KpiRow], kpi_names: &[String], options: &PivotOptions) -> PivotedReport {
    let mut groups: BTreeMap<&[String], GroupBuilder> = BTreeMap::new();
    let mut buckets: BTreeSet<TimeBucket> = BTreeSet::new();

    for row in rows {
        if let Some(hour) = options.hour {
            if chrono::Timelike::hour(&row.timestamp) != u32::from(hour) {
                continue;
            }
        }

        let bucket = TimeBucket::of(row.timestamp, options.granularity);
        buckets.insert(bucket);
        groups
            .entry(row.keys.as_slice())
            .or_insert_with(|| GroupBuilder::new(kpi_names.len()))
            .add(bucket, &row.values);
    }

    let buckets: Vec<TimeBucket> = buckets.into_iter().collect();
    let key_columns = options
        .level
        .key_columns()
        .iter()
        .map(|c| c.to_string())
        .collect();

    let rows = groups
        .into_iter()
        .flat_map(|(keys, group)| group.build(keys, kpi_names, &buckets))
        .collect();

    PivotedReport {
        key_columns,
        buckets,
        rows,
    }
}

/// Running sums for one element.
struct GroupBuilder {
    kpi_count: usize,
    sums: BTreeMap<TimeBucket, Vec<Option<f64>>>,
}

impl GroupBuilder {
    fn new(kpi_count: usize) -> Self {
        Self {
            kpi_count,
            sums: BTreeMap::new(),
        }
    }

    fn add(&mut self, bucket: TimeBucket, values: &[Option<f64>]) {
        let kpi_count = self.kpi_count;
        let sums = self
            .sums
            .entry(bucket)
            .or_insert_with(|| vec![None; kpi_count]);

        for (sum, value) in sums.iter_mut().zip(values) {
            if let Some(v) = value {
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
        }
    }

    fn build(self, keys: &[String], kpi_names: &[String], buckets: &[TimeBucket]) -> Vec<ReportRow> {
        kpi_names
            .iter()
            .enumerate()
            .filter_map(|(k, name)| {
                let values: Vec<Option<f64>> = buckets
                    .iter()
                    .map(|b| self.sums.get(b).and_then(|sums| sums[k]))
                    .collect();

                if values.iter().all(Option::is_none) {
                    return None;
                }

                Some(ReportRow {
                    keys: keys.to_vec(),
                    kpi: name.clone(),
                    values,
                })
            })
            .collect()
    }
}
