//! Outer-join alignment of independently stepped time series.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PerfError, PerfResult};
use crate::series::{present, TimeSeriesPoint};
use crate::time::Timestamp;

/// A named column of an [`AlignedTable`], one optional value per axis row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Series sharing one ascending, duplicate-free timestamp axis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedTable {
    index: Vec<Timestamp>,
    columns: Vec<Column>,
}

/// Merge named series on the union of their timestamps.
///
/// Columns keep first-seen order. A series with no points adds no column.
/// When a name repeats, its points land in the same column and a later point
/// replaces an earlier one at the same timestamp.
pub fn align_series<N, S>(series: S) -> AlignedTable
where
    N: AsRef<str>,
    S: IntoIterator<Item = (N, Vec<TimeSeriesPoint>)>,
{
    let mut order: Vec<String> = Vec::new();
    let mut by_name: BTreeMap<String, BTreeMap<Timestamp, Option<f64>>> = BTreeMap::new();
    let mut axis: BTreeSet<Timestamp> = BTreeSet::new();

    for (name, points) in series {
        if points.is_empty() {
            continue;
        }
        let name = name.as_ref();
        if !by_name.contains_key(name) {
            order.push(name.to_string());
        }
        let cells = by_name.entry(name.to_string()).or_default();
        for point in points {
            axis.insert(point.timestamp);
            cells.insert(point.timestamp, present(point.value));
        }
    }

    let index: Vec<Timestamp> = axis.into_iter().collect();
    let columns = order
        .into_iter()
        .map(|name| {
            let cells = &by_name[&name];
            let values = index
                .iter()
                .map(|ts| cells.get(ts).copied().flatten())
                .collect();
            Column { name, values }
        })
        .collect();

    AlignedTable { index, columns }
}

impl AlignedTable {
    /// An empty table with no rows and no columns
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an explicit axis and columns; lengths and ordering are checked.
    ///
    /// `NaN` cells become missing.
    pub fn from_columns(index: Vec<Timestamp>, mut columns: Vec<Column>) -> PerfResult<Self> {
        if index.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PerfError::validation(
                "Timestamp axis must be strictly ascending",
            ));
        }
        if let Some(bad) = columns.iter().find(|c| c.values.len() != index.len()) {
            return Err(PerfError::validation(format!(
                "Column '{}' has {} values for {} rows",
                bad.name,
                bad.values.len(),
                index.len()
            )));
        }
        for column in &mut columns {
            for value in &mut column.values {
                *value = present(*value);
            }
        }
        Ok(Self { index, columns })
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Values of one column, aligned with [`timestamps`](Self::timestamps)
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`column`](Self::column) but reports absence as an error
    pub fn require_column(&self, name: &str) -> PerfResult<&[Option<f64>]> {
        self.column(name)
            .ok_or_else(|| PerfError::missing_column(name))
    }

    /// Non-missing `(timestamp, value)` pairs of one column
    pub fn present(&self, name: &str) -> Vec<(Timestamp, f64)> {
        self.column(name)
            .map(|values| {
                self.index
                    .iter()
                    .zip(values)
                    .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Multiply every present value of one column by `factor`.
    ///
    /// Products that come out `NaN` (such as `inf * 0`) become missing.
    pub fn scale_column(&mut self, name: &str, factor: f64) -> PerfResult<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| PerfError::missing_column(name))?;
        for value in column.values.iter_mut() {
            *value = present(value.map(|v| v * factor));
        }
        Ok(())
    }

    /// Indices of rows where every named column has a value.
    ///
    /// A name that is not a column makes every row incomplete.
    pub fn complete_rows(&self, names: &[&str]) -> Vec<usize> {
        let columns: Option<Vec<&[Option<f64>]>> =
            names.iter().map(|name| self.column(name)).collect();
        let Some(columns) = columns else {
            return Vec::new();
        };
        (0..self.row_count())
            .filter(|&row| columns.iter().all(|values| values[row].is_some()))
            .collect()
    }
}
