//! Series types: backend range-query results, parsed time series points,
//! benchmark run windows and long-form sample frames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PerfError, PerfResult};
use crate::time::{TimeRange, Timestamp};

/// Label carrying a histogram bucket's upper bound
pub const LE_LABEL: &str = "le";

/// Parse a sample value in the backend's text encoding (`NaN`, `+Inf`, `-Inf`, decimals)
pub fn parse_prom_float(raw: &str) -> PerfResult<f64> {
    match raw.trim() {
        "+Inf" | "Inf" | "inf" | "+inf" => Ok(f64::INFINITY),
        "-Inf" | "-inf" => Ok(f64::NEG_INFINITY),
        "NaN" | "nan" => Ok(f64::NAN),
        other => other
            .parse::<f64>()
            .map_err(|e| PerfError::parse(format!("Invalid sample value '{}': {}", raw, e))),
    }
}

/// Epoch-seconds field which the backend may encode as a number or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EpochField {
    Number(f64),
    Text(String),
}

/// Wire form of a sample before timestamp normalization
#[derive(Debug, Clone, Deserialize)]
pub struct RawSample(EpochField, String);

/// One `[timestamp, "value"]` pair of a range-query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSample", into = "(f64, String)")]
pub struct PromSample {
    /// Epoch seconds
    pub timestamp: f64,
    /// Value as sent by the backend
    pub value: String,
}

impl TryFrom<RawSample> for PromSample {
    type Error = PerfError;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        let timestamp = match raw.0 {
            EpochField::Number(n) => n,
            EpochField::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| PerfError::parse(format!("Invalid sample timestamp '{}'", s)))?,
        };
        Ok(Self {
            timestamp,
            value: raw.1,
        })
    }
}

impl From<PromSample> for (f64, String) {
    fn from(sample: PromSample) -> Self {
        (sample.timestamp, sample.value)
    }
}

impl PromSample {
    pub fn new<S: Into<String>>(timestamp: f64, value: S) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Parsed numeric value
    pub fn parse_value(&self) -> PerfResult<f64> {
        parse_prom_float(&self.value)
    }

    /// Convert into a point; `NaN` values become missing
    pub fn to_point(&self) -> PerfResult<TimeSeriesPoint> {
        let timestamp = Timestamp::from_epoch_secs_f64(self.timestamp)?;
        let value = self.parse_value()?;
        Ok(TimeSeriesPoint {
            timestamp,
            value: if value.is_nan() { None } else { Some(value) },
        })
    }
}

/// One series of a range (matrix) or instant (vector) query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromSeries {
    /// Label set identifying the series
    #[serde(default)]
    pub metric: BTreeMap<String, String>,

    /// Samples of a range query
    #[serde(default)]
    pub values: Vec<PromSample>,

    /// Sample of an instant query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PromSample>,
}

impl PromSeries {
    pub fn new(metric: BTreeMap<String, String>, values: Vec<PromSample>) -> Self {
        Self {
            metric,
            values,
            value: None,
        }
    }

    /// Get a label value
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str)
    }

    /// Range samples if present, otherwise the single instant sample
    pub fn samples(&self) -> &[PromSample] {
        if !self.values.is_empty() {
            &self.values
        } else {
            self.value.as_slice()
        }
    }

    /// Parse into ordered points, skipping malformed samples
    pub fn points(&self) -> Vec<TimeSeriesPoint> {
        self.samples()
            .iter()
            .filter_map(|s| s.to_point().ok())
            .collect()
    }

    /// Numeric value of the last sample
    pub fn last_value(&self) -> PerfResult<f64> {
        self.samples()
            .last()
            .ok_or_else(|| PerfError::no_data("series has no samples"))?
            .parse_value()
    }
}

/// A single observation in a time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: Timestamp,
    pub value: Option<f64>,
}

impl TimeSeriesPoint {
    /// A `NaN` value is stored as missing
    pub fn new(timestamp: Timestamp, value: Option<f64>) -> Self {
        Self {
            timestamp,
            value: present(value),
        }
    }
}

/// `None` for missing and `NaN` alike
pub(crate) fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// One labeled benchmark execution window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWindow {
    pub start: Timestamp,
    pub end: Timestamp,
    pub label: String,
}

impl RunWindow {
    pub fn new<S: Into<String>>(start: Timestamp, end: Timestamp, label: S) -> PerfResult<Self> {
        let window = Self {
            start,
            end,
            label: label.into(),
        };
        window.range()?;
        Ok(window)
    }

    /// The window as a validated time range
    pub fn range(&self) -> PerfResult<TimeRange> {
        TimeRange::new(self.start, self.end)
    }
}

/// Long-form `(run, value)` rows, the input of distribution plots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    pub rows: Vec<(String, f64)>,
}

impl SampleFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the samples of one run
    pub fn extend_run(&mut self, run: &str, samples: impl IntoIterator<Item = f64>) {
        self.rows
            .extend(samples.into_iter().map(|v| (run.to_string(), v)));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Run labels in first-seen order
    pub fn runs(&self) -> Vec<&str> {
        let mut runs: Vec<&str> = Vec::new();
        for (run, _) in &self.rows {
            if !runs.contains(&run.as_str()) {
                runs.push(run);
            }
        }
        runs
    }

    /// Finite values of one run
    pub fn values_for(&self, run: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|(r, v)| r == run && v.is_finite())
            .map(|(_, v)| *v)
            .collect()
    }

    /// Multiply every value; non-finite values are dropped
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .map(|(r, v)| (r.clone(), v * factor))
                .filter(|(_, v)| v.is_finite())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_prom_float() {
        assert_eq!(parse_prom_float("1.5").unwrap(), 1.5);
        assert_eq!(parse_prom_float("+Inf").unwrap(), f64::INFINITY);
        assert_eq!(parse_prom_float("-Inf").unwrap(), f64::NEG_INFINITY);
        assert!(parse_prom_float("NaN").unwrap().is_nan());
        assert!(parse_prom_float("abc").is_err());
    }

    #[test]
    fn test_series_deserialization() {
        let series: PromSeries = serde_json::from_value(json!({
            "metric": {"le": "0.5"},
            "values": [[1700000000, "1"], ["1700000015.5", "NaN"]]
        }))
        .unwrap();

        assert_eq!(series.label("le"), Some("0.5"));
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.values[1].timestamp, 1_700_000_015.5);

        let points = series.points();
        assert_eq!(points[0].value, Some(1.0));
        assert_eq!(points[1].value, None);
    }

    #[test]
    fn test_instant_sample_fallback() {
        let series: PromSeries = serde_json::from_value(json!({
            "metric": {},
            "value": [1700000000, "42"]
        }))
        .unwrap();

        assert_eq!(series.samples().len(), 1);
        assert_eq!(series.last_value().unwrap(), 42.0);
        assert!(PromSeries::default().last_value().is_err());
    }

    #[test]
    fn test_nan_point_is_missing() {
        let ts = Timestamp::from_secs(100).unwrap();
        assert_eq!(TimeSeriesPoint::new(ts, Some(f64::NAN)).value, None);
        assert_eq!(TimeSeriesPoint::new(ts, Some(f64::INFINITY)).value, Some(f64::INFINITY));
    }

    #[test]
    fn test_run_window_validation() {
        let start = Timestamp::from_secs(100).unwrap();
        let end = Timestamp::from_secs(200).unwrap();
        assert!(RunWindow::new(start, end, "baseline").is_ok());
        assert!(RunWindow::new(end, start, "backwards").is_err());
    }

    #[test]
    fn test_sample_frame() {
        let mut frame = SampleFrame::new();
        frame.extend_run("a", vec![1.0, 2.0]);
        frame.extend_run("b", vec![3.0, f64::NAN]);

        assert_eq!(frame.runs(), vec!["a", "b"]);
        assert_eq!(frame.values_for("b"), vec![3.0]);
        assert_eq!(frame.scaled(1000.0).values_for("a"), vec![1000.0, 2000.0]);
        assert_eq!(frame.scaled(1000.0).len(), 3);
    }
}
