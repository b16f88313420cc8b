//! Study files: the benchmark runs to compare and what to query for them.
//!
//! A study is a JSON document such as
//!
//! ```json
//! {
//!   "runs": [
//!     {"start": "2025-06-01T10:00:00Z", "end": "2025-06-01T10:40:00Z", "label": "WVA"},
//!     {"start": "2025-06-01T11:00:00Z", "end": "2025-06-01T11:40:00Z", "label": "HPA"}
//!   ],
//!   "model_name": "meta-llama/Llama-3.1-8B-Instruct",
//!   "namespace": "bench",
//!   "histogram_metrics": [{"name": "TTFT", "query": "vllm:time_to_first_token_seconds_bucket"}],
//!   "gauge_metrics": [{"name": "Power", "query": "sum(DCGM_FI_DEV_POWER_USAGE)"}]
//! }
//! ```

use anyhow::{Context, Result};
use perfscope_core::{RunWindow, Step};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Display name paired with the metric or query producing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedMetric {
    pub name: String,
    pub query: String,
}

impl NamedMetric {
    pub fn new<N: Into<String>, Q: Into<String>>(name: N, query: Q) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// Settings of the candlestick percentile queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleOptions {
    /// Histogram base name; `_bucket` is appended
    pub metric_name: String,
    pub title: String,
    pub yaxis_title: String,
    /// Unit suffix of the latency axis
    pub y_unit: String,
    /// Multiplier applied to every percentile value
    pub scale: f64,
    pub iqr_step: Step,
    pub iqr_rate_interval: Step,
    pub p50_step: Step,
    pub p50_rate_interval: Step,
}

impl Default for CandleOptions {
    fn default() -> Self {
        Self {
            metric_name: "vllm:inter_token_latency_seconds".to_string(),
            title: "Inter-Token Latency (ITL)".to_string(),
            yaxis_title: "Inter-Token Latency (ms)".to_string(),
            y_unit: "s".to_string(),
            scale: 1.0,
            iqr_step: Step::minutes(1),
            iqr_rate_interval: Step::minutes(1),
            p50_step: Step::minutes(1),
            p50_rate_interval: Step::minutes(1),
        }
    }
}

/// A violin of raw query samples per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionQuery {
    pub name: String,
    pub query: String,
    #[serde(default = "default_distribution_step")]
    pub step: Step,
    /// Whether `query` returns `sum by (le)` bucket rates
    #[serde(default)]
    pub histogram: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub y_title: Option<String>,
}

fn default_distribution_step() -> Step {
    Step::seconds(15)
}

fn default_scale() -> f64 {
    1.0
}

fn default_regex() -> String {
    ".*".to_string()
}

/// Benchmark runs plus the metrics to compare across them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub runs: Vec<RunWindow>,

    /// Label of the run others are compared against; the first run when unset
    #[serde(default)]
    pub baseline: Option<String>,

    pub model_name: String,
    pub namespace: String,

    /// Replica gauge selector, as regular expressions
    #[serde(default = "default_regex")]
    pub variant_name: String,
    #[serde(default = "default_regex")]
    pub accelerator_type: String,

    #[serde(default)]
    pub histogram_metrics: Vec<NamedMetric>,
    #[serde(default)]
    pub gauge_metrics: Vec<NamedMetric>,
    #[serde(default)]
    pub distributions: Vec<DistributionQuery>,

    #[serde(default)]
    pub candles: CandleOptions,

    /// Display multiplier per metric name in tables
    #[serde(default)]
    pub metric_scale: BTreeMap<String, f64>,
    /// Display unit per metric name in tables
    #[serde(default)]
    pub metric_unit: BTreeMap<String, String>,
}

impl Study {
    /// Read and validate a study file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read study file {}", path.display()))?;
        let study: Study = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse study file {}", path.display()))?;
        study.validate()?;
        Ok(study)
    }

    /// Validate the study
    pub fn validate(&self) -> Result<()> {
        if self.runs.is_empty() {
            return Err(anyhow::anyhow!("A study needs at least one run"));
        }

        let mut labels = HashSet::new();
        for run in &self.runs {
            run.range()
                .with_context(|| format!("Run '{}' has an invalid window", run.label))?;
            if !labels.insert(run.label.as_str()) {
                return Err(anyhow::anyhow!("Duplicate run label '{}'", run.label));
            }
        }

        if let Some(baseline) = &self.baseline {
            if !labels.contains(baseline.as_str()) {
                return Err(anyhow::anyhow!(
                    "Baseline '{}' is not one of the runs",
                    baseline
                ));
            }
        }

        if self.model_name.is_empty() || self.namespace.is_empty() {
            return Err(anyhow::anyhow!("model_name and namespace cannot be empty"));
        }

        Ok(())
    }

    /// The baseline label
    pub fn baseline(&self) -> &str {
        self.baseline
            .as_deref()
            .or_else(|| self.runs.first().map(|r| r.label.as_str()))
            .unwrap_or_default()
    }

    /// Run labels in study order
    pub fn run_order(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.label.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STUDY: &str = r#"{
        "runs": [
            {"start": "2025-06-01T10:00:00Z", "end": "2025-06-01T10:40:00Z", "label": "WVA"},
            {"start": "2025-06-01T11:00:00Z", "end": "2025-06-01T11:40:00Z", "label": "HPA"}
        ],
        "model_name": "llama",
        "namespace": "bench",
        "histogram_metrics": [{"name": "TTFT", "query": "vllm:time_to_first_token_seconds_bucket"}],
        "candles": {"scale": 1000.0, "y_unit": "ms", "p50_step": "30s"}
    }"#;

    #[test]
    fn test_load_study_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STUDY.as_bytes()).unwrap();

        let study = Study::load(file.path()).unwrap();
        assert_eq!(study.run_order(), vec!["WVA", "HPA"]);
        assert_eq!(study.baseline(), "WVA");
        assert_eq!(study.variant_name, ".*");
        assert_eq!(study.histogram_metrics[0].name, "TTFT");
        assert_eq!(study.candles.scale, 1000.0);
        assert_eq!(study.candles.p50_step, Step::seconds(30));
        // Unset candle options keep their defaults
        assert_eq!(study.candles.iqr_step, Step::minutes(1));
        assert_eq!(study.candles.metric_name, "vllm:inter_token_latency_seconds");
    }

    #[test]
    fn test_validation() {
        let mut study: Study = serde_json::from_str(STUDY).unwrap();
        study.validate().unwrap();

        study.baseline = Some("KEDA".to_string());
        assert!(study.validate().is_err());

        study.baseline = None;
        let dup = study.runs[0].clone();
        study.runs.push(dup);
        assert!(study.validate().is_err());

        study.runs.clear();
        assert!(study.validate().is_err());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let raw = STUDY.replace("10:40:00Z", "09:40:00Z");
        let study: Study = serde_json::from_str(&raw).unwrap();
        assert!(study.validate().is_err());
    }
}
