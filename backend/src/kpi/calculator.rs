//! KPI calculator
//!
//! Evaluates the catalog on every raw row, producing element keys, the interval
//! timestamp and one value per active KPI.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::catalog::{Formula, KpiCatalog};
use super::columns::{check_columns, ColumnReport};
use crate::error::{KpiError, KpiResult};
use crate::models::{Cell, RowOrigin, Table, PERIOD_START_TIME};
use crate::parser::parse_timestamp;

/// `numerator / denominator * scale`; a zero denominator yields 0.
pub fn ratio(numerator: f64, denominator: f64, scale: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * scale
    }
}

/// KPI values of one raw row.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiRow {
    /// Element key values, in key-column order.
    pub keys: Vec<String>,
    pub timestamp: NaiveDateTime,
    /// One value per active KPI; `None` when an input cell is blank or not numeric.
    pub values: Vec<Option<f64>>,
}

/// A raw row excluded from the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    /// Worksheet the row came from; absent for CSV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Line in the CSV file, or row number in the worksheet.
    pub line: usize,
    pub reason: String,
}

impl SkippedRow {
    /// `"7"` for CSV, `"BBH!7"` for a worksheet row.
    pub fn location(&self) -> String {
        match &self.sheet {
            Some(sheet) => format!("{}!{}", sheet, self.line),
            None => self.line.to_string(),
        }
    }
}

/// Output of [`calculate`].
#[derive(Debug, Clone)]
pub struct Calculation {
    /// Active KPI names; parallel to [`KpiRow::values`].
    pub kpi_names: Vec<String>,
    pub rows: Vec<KpiRow>,
    pub skipped: Vec<SkippedRow>,
    pub columns: ColumnReport,
}

/// A formula with its inputs resolved to column indices.
enum Resolved {
    Ratio { numerator: usize, denominator: usize, scale: f64 },
    Column { source: usize },
}

impl Resolved {
    fn evaluate(&self, table: &Table, row: usize) -> Option<f64> {
        match *self {
            Resolved::Ratio {
                numerator,
                denominator,
                scale,
            } => {
                let den = table.cell(row, denominator).as_f64()?;
                if den == 0.0 {
                    return Some(0.0);
                }
                let num = table.cell(row, numerator).as_f64()?;
                Some(ratio(num, den, scale))
            }
            Resolved::Column { source } => table.cell(row, source).as_f64(),
        }
    }
}

/// Compute the active KPIs for every row of `table`.
///
/// Fails with [`KpiError::MissingColumns`] when the timestamp or a key column
/// is absent, or when no KPI has all of its inputs. Rows with a blank key or an
/// unparseable timestamp are skipped and listed in [`Calculation::skipped`].
pub fn calculate(table: &Table, catalog: &KpiCatalog, key_columns: &[&str]) -> KpiResult<Calculation> {
    let columns = check_columns(&table.headers, catalog, key_columns);
    if columns.is_fatal() {
        return Err(KpiError::MissingColumns {
            columns: columns.missing_columns(),
        });
    }

    let index = |name: &str| {
        table
            .column_index(name)
            .ok_or_else(|| KpiError::MissingColumns {
                columns: vec![name.to_string()],
            })
    };

    let time_col = index(PERIOD_START_TIME)?;
    let key_cols = key_columns
        .iter()
        .map(|&k| index(k))
        .collect::<KpiResult<Vec<usize>>>()?;

    let mut kpi_names = Vec::new();
    let mut formulas = Vec::new();
    for kpi in catalog.kpis.iter().filter(|k| columns.active_kpis.contains(&k.name)) {
        let resolved = match &kpi.formula {
            Formula::Ratio {
                numerator,
                denominator,
                scale,
            } => Resolved::Ratio {
                numerator: index(numerator.as_str())?,
                denominator: index(denominator.as_str())?,
                scale: *scale,
            },
            Formula::Column { source } => Resolved::Column {
                source: index(source.as_str())?,
            },
        };
        kpi_names.push(kpi.name.clone());
        formulas.push(resolved);
    }

    let mut rows = Vec::with_capacity(table.len());
    let mut skipped = Vec::new();

    for row in 0..table.len() {
        let RowOrigin { sheet, line } = table.origin(row);

        let keys: Vec<String> = key_cols.iter().map(|&c| table.cell(row, c).to_string()).collect();
        if let Some(pos) = keys.iter().position(|k| k.is_empty()) {
            skipped.push(SkippedRow {
                sheet,
                line,
                reason: format!("empty '{}'", key_columns[pos]),
            });
            continue;
        }

        let time_cell = table.cell(row, time_col);
        let Some(timestamp) = parse_timestamp(time_cell) else {
            let reason = match time_cell {
                Cell::Empty => format!("empty '{}'", PERIOD_START_TIME),
                other => format!("unparseable '{}' value '{}'", PERIOD_START_TIME, other),
            };
            skipped.push(SkippedRow { sheet, line, reason });
            continue;
        };

        let values = formulas.iter().map(|f| f.evaluate(table, row)).collect();
        rows.push(KpiRow {
            keys,
            timestamp,
            values,
        });
    }

    Ok(Calculation {
        kpi_names,
        rows,
        skipped,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RNC_NAME, WBTS_NAME};

    const KEYS: [&str; 2] = [RNC_NAME, WBTS_NAME];

    fn table(csv: &str) -> Table {
        crate::parser::parse_csv_str(csv, ';').unwrap()
    }

    const HEADER: &str = "Period start time;RNC name;WBTS name;CS_RRC_Num_M;CS_RRC_Denum_M;PS_RRC_Num_M;PS_RRC_Denum_M;CS_RAB_Num_M;CS_RAB_Denum_M;PS_RAB_Num_M;PS_RAB_Denum_M;CSDROPNOM_C;CSDROPDENOM_C;HSDROP_NUM_V;HSDROP_DENOM_V;CS Traffic";

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio(5.0, 0.0, 100.0), 0.0);
        assert_eq!(ratio(0.0, 0.0, 100.0), 0.0);
        assert_eq!(ratio(49.0, 50.0, 100.0), 98.0);
    }

    #[test]
    fn test_calculate_ratios() {
        let csv = format!(
            "{}\n2025-01-15 00:00:00;RNC01;SITE_A;98;100;45;50;10;10;0;0;1;200;3;0;12.5",
            HEADER
        );
        let calc = calculate(&table(&csv), &KpiCatalog::default(), &KEYS).unwrap();

        assert_eq!(
            calc.kpi_names,
            vec!["CS RRC SR", "PS RRC SR", "CS RAB SR", "PS RAB SR", "CS DCR", "HS DCR", "CS Traffic"]
        );
        assert_eq!(calc.rows.len(), 1);

        let row = &calc.rows[0];
        assert_eq!(row.keys, vec!["RNC01", "SITE_A"]);
        assert_eq!(
            row.values,
            vec![Some(98.0), Some(90.0), Some(100.0), Some(0.0), Some(0.5), Some(0.0), Some(12.5)]
        );
    }

    #[test]
    fn test_zero_denominator_is_zero_for_every_row() {
        let mut csv = HEADER.to_string();
        for num in ["0", "7", "", "abc"] {
            csv.push_str(&format!(
                "\n2025-01-15 01:00;RNC01;SITE_A;{n};0;{n};0;{n};0;{n};0;{n};0;{n};0;1",
                n = num
            ));
        }
        let calc = calculate(&table(&csv), &KpiCatalog::default(), &KEYS).unwrap();

        assert_eq!(calc.rows.len(), 4);
        for row in &calc.rows {
            // Every ratio KPI is 0; the pass-through counter is untouched.
            assert!(row.values[..6].iter().all(|v| *v == Some(0.0)));
            assert_eq!(row.values[6], Some(1.0));
        }
    }

    #[test]
    fn test_blank_inputs_are_missing_not_zero() {
        let csv = format!(
            "{}\n2025-01-15 00:00;RNC01;SITE_A;;100;45;;10;10;0;0;1;200;3;0;",
            HEADER
        );
        let calc = calculate(&table(&csv), &KpiCatalog::default(), &KEYS).unwrap();
        let values = &calc.rows[0].values;

        assert_eq!(values[0], None); // numerator blank
        assert_eq!(values[1], None); // denominator blank
        assert_eq!(values[6], None); // counter blank
    }

    #[test]
    fn test_missing_counter_columns_reported() {
        let csv = "Period start time;RNC name;WBTS name;CS_RRC_Num_M;CS_RRC_Denum_M\n\
                   2025-01-15 00:00;RNC01;SITE_A;1;2";
        let calc = calculate(&table(csv), &KpiCatalog::default(), &KEYS).unwrap();

        assert_eq!(calc.kpi_names, vec!["CS RRC SR"]);
        assert_eq!(calc.rows[0].values, vec![Some(50.0)]);
        assert_eq!(calc.columns.disabled_kpis.len(), 13);
        assert!(calc.columns.warnings().iter().any(|w| w.contains("PS_RRC_Num_M")));
    }

    #[test]
    fn test_missing_structural_column_is_error() {
        let csv = "RNC name;CS_RRC_Num_M;CS_RRC_Denum_M\nRNC01;1;2";
        let err = calculate(&table(csv), &KpiCatalog::default(), &KEYS).unwrap_err();

        match err {
            KpiError::MissingColumns { columns } => {
                assert!(columns.contains(&PERIOD_START_TIME.to_string()));
                assert!(columns.contains(&WBTS_NAME.to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rows_without_key_or_timestamp_are_skipped() {
        let csv = "Period start time;RNC name;WBTS name;CS Traffic\n\
                   2025-01-15 00:00;RNC01;SITE_A;1\n\
                   2025-01-15 00:00;RNC01;;2\n\
                   garbage;RNC01;SITE_A;3\n\
                   ;RNC01;SITE_A;4";
        let calc = calculate(&table(csv), &KpiCatalog::default(), &KEYS).unwrap();

        assert_eq!(calc.rows.len(), 1);
        assert_eq!(
            calc.skipped,
            vec![
                skip(3, "empty 'WBTS name'"),
                skip(4, "unparseable 'Period start time' value 'garbage'"),
                skip(5, "empty 'Period start time'"),
            ]
        );
    }

    fn skip(line: usize, reason: &str) -> SkippedRow {
        SkippedRow {
            sheet: None,
            line,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_skipped_lines_count_blank_lines() {
        let csv = "Period start time;RNC name;WBTS name;CS Traffic\n\
                   \n\
                   \n\
                   garbage;RNC01;SITE_A;3\n\
                   2025-01-15 00:00;RNC01;SITE_A;1\n\
                   \n\
                   2025-01-15 00:00;;SITE_A;2";
        let calc = calculate(&table(csv), &KpiCatalog::default(), &KEYS).unwrap();

        assert_eq!(calc.rows.len(), 1);
        assert_eq!(
            calc.skipped,
            vec![
                skip(4, "unparseable 'Period start time' value 'garbage'"),
                skip(7, "empty 'RNC name'"),
            ]
        );
    }

    #[test]
    fn test_skipped_rows_name_their_worksheet() {
        let mut table = Table::new(vec![PERIOD_START_TIME.into(), RNC_NAME.into(), WBTS_NAME.into(), "CS Traffic".into()]);
        table.push_row(
            vec![Cell::from_text("never"), Cell::from_text("RNC01"), Cell::from_text("SITE_A"), Cell::Number(1.0)],
            RowOrigin {
                sheet: Some("Hourly".into()),
                line: 9,
            },
        );

        let calc = calculate(&table, &KpiCatalog::default(), &KEYS).unwrap();

        assert_eq!(calc.skipped[0].location(), "Hourly!9");
        assert_eq!(skip(4, "x").location(), "4");
    }
}
