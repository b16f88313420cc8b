//! Up/down classification of candle medians.

use serde::{Deserialize, Serialize};

use crate::align::AlignedTable;
use crate::error::PerfResult;
use crate::series::present;

/// Direction of a value relative to the last observed value before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    /// One side of the comparison is missing
    Unknown,
}

impl Trend {
    /// Rendering branch: only `Up` uses the rising color, everything else the falling one
    pub fn is_up(&self) -> bool {
        matches!(self, Trend::Up)
    }
}

/// Classify each row of `primary` against the last observed value before it.
///
/// `NaN` counts as missing in both columns.
/// Rows where `mask` is missing are removed from the comparison entirely: the
/// primary value there is treated as missing, so later rows look past it.
/// The comparison is a strict `>`; a missing side gives [`Trend::Unknown`],
/// which renders like [`Trend::Down`].
pub fn classify_trend(table: &AlignedTable, primary: &str, mask: &str) -> PerfResult<Vec<Trend>> {
    let primary = table.require_column(primary)?;
    let mask = table.require_column(mask)?;

    let masked: Vec<Option<f64>> = primary
        .iter()
        .zip(mask)
        .map(|(value, support)| present(*support).and(present(*value)))
        .collect();

    Ok(classify_masked(&masked))
}

/// Forward-fill, shift by one and compare
fn classify_masked(masked: &[Option<f64>]) -> Vec<Trend> {
    let mut last_seen: Option<f64> = None;
    masked
        .iter()
        .map(|current| {
            let previous = last_seen;
            if current.is_some() {
                last_seen = *current;
            }
            match (current, previous) {
                (Some(cur), Some(prev)) if *cur > prev => Trend::Up,
                (Some(_), Some(_)) => Trend::Down,
                _ => Trend::Unknown,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_series;
    use crate::series::TimeSeriesPoint;
    use crate::time::Timestamp;

    fn column(values: &[Option<f64>]) -> Vec<TimeSeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| TimeSeriesPoint::new(Timestamp::from_secs(60 * i as i64).unwrap(), *v))
            .collect()
    }

    #[test]
    fn test_masked_rows_are_skipped() {
        let table = align_series(vec![
            ("P50", column(&[Some(1.0), Some(5.0), Some(3.0), None, Some(7.0)])),
            ("P75", column(&[Some(1.0), Some(1.0), None, Some(1.0), Some(1.0)])),
        ]);

        let flags = classify_trend(&table, "P50", "P75").unwrap();
        assert_eq!(
            flags,
            vec![
                Trend::Unknown,
                Trend::Up,
                Trend::Unknown,
                Trend::Unknown,
                Trend::Up
            ]
        );
    }

    #[test]
    fn test_compares_against_last_observed_value() {
        // Row 3 has a missing value; row 4 must compare with row 1 (5.0), not row 2 (masked 3.0)
        let masked = [Some(1.0), Some(5.0), None, None, Some(4.0)];
        let flags = classify_masked(&masked);
        assert_eq!(flags[4], Trend::Down);

        let masked = [Some(1.0), Some(5.0), None, Some(6.0)];
        assert_eq!(classify_masked(&masked)[3], Trend::Up);
    }

    #[test]
    fn test_nan_is_skipped_by_forward_fill() {
        let raw = |values: &[f64]| -> Vec<TimeSeriesPoint> {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| TimeSeriesPoint {
                    timestamp: Timestamp::from_secs(60 * i as i64).unwrap(),
                    value: Some(*v),
                })
                .collect()
        };
        let table = align_series(vec![
            ("P50", raw(&[1.0, f64::NAN, 2.0, 3.0])),
            ("P75", raw(&[1.0, 1.0, 1.0, f64::NAN])),
        ]);

        let flags = classify_trend(&table, "P50", "P75").unwrap();
        assert_eq!(
            flags,
            vec![Trend::Unknown, Trend::Unknown, Trend::Up, Trend::Unknown]
        );
    }

    #[test]
    fn test_equal_values_are_not_up() {
        let flags = classify_masked(&[Some(2.0), Some(2.0)]);
        assert_eq!(flags, vec![Trend::Unknown, Trend::Down]);
        assert!(!flags[1].is_up());
    }

    #[test]
    fn test_missing_columns_are_errors() {
        let table = align_series(vec![("P50", column(&[Some(1.0)]))]);
        assert!(classify_trend(&table, "P50", "P75").is_err());
        assert!(classify_trend(&table, "P90", "P50").is_err());
    }

    #[test]
    fn test_empty_table() {
        let table = AlignedTable::new();
        assert!(classify_trend(&table, "P50", "P75").is_err());
        assert!(classify_masked(&[]).is_empty());
    }
}
