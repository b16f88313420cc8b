//! Per-run comparison tables.
//!
//! A [`RunTable`] holds one row per `(run, metric)` pair and an ordered set of
//! optional numeric columns (`Avg`, `P50`, ...). Cells that could not be
//! queried are `None`, and the reason is kept in the table's failure list.

use serde::{Deserialize, Serialize};

use crate::error::{PerfError, PerfResult};
use crate::outcome::Failure;

/// Header of the run label column
pub const RUN_COLUMN: &str = "Run";

/// Header of the metric name column
pub const METRIC_COLUMN: &str = "Metric";

/// Name of the derived relative-change column for `column`
pub fn delta_column_name(column: &str, baseline: &str) -> String {
    format!("δ{} (vs {})", column, baseline)
}

/// Whether `column` is a relative-change column
pub fn is_delta_column(column: &str, baseline: &str) -> bool {
    column.starts_with('δ') || column.contains(&format!("vs {}", baseline))
}

/// One `(run, metric)` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub run: String,
    pub metric: String,
    pub values: Vec<Option<f64>>,
}

/// Table of numeric results per run and metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTable {
    columns: Vec<String>,
    rows: Vec<RunRow>,
    #[serde(default)]
    failures: Vec<Failure>,
}

impl RunTable {
    /// Create an empty table with the given value columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Value column headers (excluding `Run` and `Metric`)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[RunRow] {
        &self.rows
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Append a row; cells for columns not listed stay missing
    pub fn push_row<'a, I>(&mut self, run: &str, metric: &str, cells: I) -> PerfResult<()>
    where
        I: IntoIterator<Item = (&'a str, Option<f64>)>,
    {
        let mut values = vec![None; self.columns.len()];
        for (column, value) in cells {
            let idx = self.column_index(column).ok_or_else(|| {
                PerfError::validation(format!("Unknown table column '{}'", column))
            })?;
            values[idx] = value.filter(|v| !v.is_nan());
        }
        self.rows.push(RunRow {
            run: run.to_string(),
            metric: metric.to_string(),
            values,
        });
        Ok(())
    }

    pub fn record_failures(&mut self, failures: impl IntoIterator<Item = Failure>) {
        self.failures.extend(failures);
    }

    /// Cell lookup by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.values[idx])
    }

    /// Cell lookup by run label, metric and column
    pub fn value(&self, run: &str, metric: &str, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .find(|r| r.run == run && r.metric == metric)
            .and_then(|r| r.values[idx])
    }

    /// Metric names in first-seen order
    pub fn metrics(&self) -> Vec<&str> {
        unique(self.rows.iter().map(|r| r.metric.as_str()))
    }

    /// Run labels in first-seen order
    pub fn runs(&self) -> Vec<&str> {
        unique(self.rows.iter().map(|r| r.run.as_str()))
    }

    /// Add `δ<col> (vs <baseline>)` after every value column.
    ///
    /// The delta is `value / baseline_value - 1` where the baseline value is
    /// the same column of the baseline run's row for the same metric.
    /// Infinite or undefined ratios become missing, as do the baseline rows'
    /// own deltas.
    pub fn with_relative_change(&self, baseline: &str) -> Self {
        let mut columns = Vec::with_capacity(self.columns.len() * 2);
        for column in &self.columns {
            columns.push(column.clone());
            columns.push(delta_column_name(column, baseline));
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let reference = self
                    .rows
                    .iter()
                    .find(|r| r.run == baseline && r.metric == row.metric);
                let mut values = Vec::with_capacity(columns.len());
                for (idx, value) in row.values.iter().enumerate() {
                    values.push(*value);
                    let delta = if row.run == baseline {
                        None
                    } else {
                        match (value, reference.and_then(|r| r.values[idx])) {
                            (Some(v), Some(base)) => Some(v / base - 1.0).filter(|d| d.is_finite()),
                            _ => None,
                        }
                    };
                    values.push(delta);
                }
                RunRow {
                    run: row.run.clone(),
                    metric: row.metric.clone(),
                    values,
                }
            })
            .collect();

        Self {
            columns,
            rows,
            failures: self.failures.clone(),
        }
    }

    /// Rows ordered by metric name, then by position of the run in `run_order`.
    ///
    /// Runs missing from `run_order` sort after the listed ones, keeping their
    /// input order.
    pub fn sorted(&self, run_order: &[&str]) -> Self {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            let rank = |r: &RunRow| {
                run_order
                    .iter()
                    .position(|o| *o == r.run)
                    .unwrap_or(usize::MAX)
            };
            a.metric.cmp(&b.metric).then(rank(a).cmp(&rank(b)))
        });
        Self {
            columns: self.columns.clone(),
            rows,
            failures: self.failures.clone(),
        }
    }
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen: Vec<&str> = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_table() -> RunTable {
        let mut table = RunTable::new(["P50", "P90"]);
        table
            .push_row("WVA", "ITL", [("P50", Some(0.02)), ("P90", Some(0.04))])
            .unwrap();
        table
            .push_row("HPA", "ITL", [("P50", Some(0.03)), ("P90", None)])
            .unwrap();
        table
            .push_row("WVA", "TTFT", [("P50", Some(0.0)), ("P90", Some(1.0))])
            .unwrap();
        table
            .push_row("HPA", "TTFT", [("P50", Some(0.5)), ("P90", Some(1.5))])
            .unwrap();
        table
    }

    #[test]
    fn test_push_row_rejects_unknown_columns() {
        let mut table = RunTable::new(["Avg"]);
        assert!(table.push_row("a", "m", [("P50", Some(1.0))]).is_err());
        table.push_row("a", "m", [("Avg", Some(f64::NAN))]).unwrap();
        assert_eq!(table.get(0, "Avg"), None);
    }

    #[test]
    fn test_relative_change() {
        let table = sample_table().with_relative_change("WVA");

        assert_eq!(
            table.columns(),
            &["P50", "δP50 (vs WVA)", "P90", "δP90 (vs WVA)"]
        );
        assert_relative_eq!(
            table.value("HPA", "ITL", "δP50 (vs WVA)").unwrap(),
            0.5,
            epsilon = 1e-12
        );
        // Missing numerator
        assert_eq!(table.value("HPA", "ITL", "δP90 (vs WVA)"), None);
        // Division by a zero baseline is infinite and becomes missing
        assert_eq!(table.value("HPA", "TTFT", "δP50 (vs WVA)"), None);
        assert_relative_eq!(
            table.value("HPA", "TTFT", "δP90 (vs WVA)").unwrap(),
            0.5,
            epsilon = 1e-12
        );
        // Baseline rows carry no delta
        assert_eq!(table.value("WVA", "ITL", "δP50 (vs WVA)"), None);
        assert_eq!(table.value("WVA", "ITL", "P50"), Some(0.02));
    }

    #[test]
    fn test_relative_change_without_baseline_row() {
        let table = sample_table().with_relative_change("missing");
        assert_eq!(table.value("HPA", "ITL", "δP50 (vs missing)"), None);
    }

    #[test]
    fn test_sorted_by_metric_then_run_order() {
        let mut table = sample_table();
        table
            .push_row("Other", "ITL", [("P50", Some(1.0))])
            .unwrap();

        let sorted = table.sorted(&["HPA", "WVA"]);
        let order: Vec<(&str, &str)> = sorted
            .rows()
            .iter()
            .map(|r| (r.metric.as_str(), r.run.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("ITL", "HPA"),
                ("ITL", "WVA"),
                ("ITL", "Other"),
                ("TTFT", "HPA"),
                ("TTFT", "WVA"),
            ]
        );
    }

    #[test]
    fn test_delta_column_detection() {
        assert!(is_delta_column("δP50 (vs WVA)", "WVA"));
        assert!(is_delta_column("Avg vs WVA", "WVA"));
        assert!(!is_delta_column("P50", "WVA"));
    }

    #[test]
    fn test_runs_and_metrics_first_seen() {
        let table = sample_table();
        assert_eq!(table.runs(), vec!["WVA", "HPA"]);
        assert_eq!(table.metrics(), vec!["ITL", "TTFT"]);
    }
}
