//! PromQL text builders.
//!
//! Every query perfscope issues is built here, so the exact text can be
//! checked in tests without a backend.

use std::fmt;

use perfscope_core::Step;

/// Window of the subqueries summarizing a whole run
pub const SUMMARY_WINDOW: &str = "30m";

/// Rate interval of the histogram summary queries
pub const SUMMARY_RATE_INTERVAL: &str = "1m";

/// Autoscaler replica gauge used for scaling events
pub const REPLICAS_METRIC: &str = "inferno_current_replicas";

/// Window of the `delta` detecting replica changes
pub const SCALING_DELTA_WINDOW: &str = "30s";

/// Label matching operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    Regex,
}

impl MatchOp {
    fn as_str(&self) -> &'static str {
        match self {
            MatchOp::Equal => "=",
            MatchOp::Regex => "=~",
        }
    }
}

/// One `label<op>"value"` matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub label: String,
    pub op: MatchOp,
    pub value: String,
}

/// Label selector rendered as `{a="x",b=~"y"}`; empty selectors render as nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    matchers: Vec<Matcher>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq<L: Into<String>, V: Into<String>>(mut self, label: L, value: V) -> Self {
        self.matchers.push(Matcher {
            label: label.into(),
            op: MatchOp::Equal,
            value: value.into(),
        });
        self
    }

    pub fn regex<L: Into<String>, V: Into<String>>(mut self, label: L, value: V) -> Self {
        self.matchers.push(Matcher {
            label: label.into(),
            op: MatchOp::Regex,
            value: value.into(),
        });
        self
    }

    /// Selector of the model-serving histograms
    pub fn model(model_name: &str, namespace: &str) -> Self {
        Self::new()
            .eq("model_name", model_name)
            .eq("namespace", namespace)
    }

    /// Selector of the autoscaler replica gauge
    pub fn variant(variant_name: &str, accelerator_type: &str) -> Self {
        Self::new()
            .regex("variant_name", variant_name)
            .regex("accelerator_type", accelerator_type)
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matchers.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, m) in self.matchers.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}{}\"{}\"", m.label, m.op.as_str(), escape(&m.value))?;
        }
        f.write_str("}")
    }
}

/// Run-level percentile of a histogram:
/// `quantile_over_time(p, histogram_quantile(p, sum by (le) (rate(m{..}[1m])))[30m:])`
pub fn histogram_quantile_over_time(metric: &str, p: f64, selector: &Selector) -> String {
    format!(
        "quantile_over_time({p}, histogram_quantile({p}, sum by (le) (rate({metric}{selector}[{rate}])))[{window}:])",
        p = p,
        metric = metric,
        selector = selector,
        rate = SUMMARY_RATE_INTERVAL,
        window = SUMMARY_WINDOW,
    )
}

/// Percentile over time of a gauge query
pub fn quantile_over_time(query: &str, p: f64) -> String {
    format!("quantile_over_time({}, ({})[{}:])", p, query, SUMMARY_WINDOW)
}

/// Mean over time of a gauge query
pub fn avg_over_time(query: &str) -> String {
    format!("avg_over_time(({})[{}:])", query, SUMMARY_WINDOW)
}

/// Standard deviation over time of a gauge query
pub fn stddev_over_time(query: &str) -> String {
    format!("stddev_over_time(({})[{}:])", query, SUMMARY_WINDOW)
}

/// Sum over time of a gauge query
pub fn sum_over_time(query: &str) -> String {
    format!("sum_over_time(({})[{}:])", query, SUMMARY_WINDOW)
}

/// Per-step percentile of a histogram's `_bucket` series
pub fn histogram_quantile(metric_name: &str, p: f64, selector: &Selector, rate_interval: &Step) -> String {
    format!(
        "histogram_quantile({}, sum by(le) (rate({}_bucket{}[{}])))",
        p, metric_name, selector, rate_interval
    )
}

/// Direction of a replica change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDirection {
    Out,
    In,
}

/// Replica count at the steps where it changed in `direction`
pub fn replicas_change(selector: &Selector, direction: ScalingDirection) -> String {
    let cmp = match direction {
        ScalingDirection::Out => ">",
        ScalingDirection::In => "<",
    };
    format!(
        "{metric}{selector} and (delta({metric}{selector}[{window}]) {cmp} 0)",
        metric = REPLICAS_METRIC,
        selector = selector,
        window = SCALING_DELTA_WINDOW,
        cmp = cmp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_rendering() {
        assert_eq!(Selector::new().to_string(), "");
        assert_eq!(
            Selector::model("llama", "bench").to_string(),
            r#"{model_name="llama",namespace="bench"}"#
        );
        assert_eq!(
            Selector::variant(".*", "H100").to_string(),
            r#"{variant_name=~".*",accelerator_type=~"H100"}"#
        );
        assert_eq!(
            Selector::new().eq("a", r#"x"y\z"#).to_string(),
            r#"{a="x\"y\\z"}"#
        );
    }

    #[test]
    fn test_histogram_quantile_over_time() {
        let q = histogram_quantile_over_time(
            "vllm:time_to_first_token_seconds_bucket",
            0.9,
            &Selector::model("m", "ns"),
        );
        assert_eq!(
            q,
            r#"quantile_over_time(0.9, histogram_quantile(0.9, sum by (le) (rate(vllm:time_to_first_token_seconds_bucket{model_name="m",namespace="ns"}[1m])))[30m:])"#
        );
    }

    #[test]
    fn test_gauge_summaries() {
        assert_eq!(
            quantile_over_time("sum(power_watts)", 0.25),
            "quantile_over_time(0.25, (sum(power_watts))[30m:])"
        );
        assert_eq!(avg_over_time("x"), "avg_over_time((x)[30m:])");
        assert_eq!(stddev_over_time("x"), "stddev_over_time((x)[30m:])");
        assert_eq!(sum_over_time("x"), "sum_over_time((x)[30m:])");
    }

    #[test]
    fn test_histogram_quantile() {
        let q = histogram_quantile(
            "vllm:inter_token_latency_seconds",
            0.5,
            &Selector::model("m", "ns"),
            &Step::minutes(1),
        );
        assert_eq!(
            q,
            r#"histogram_quantile(0.5, sum by(le) (rate(vllm:inter_token_latency_seconds_bucket{model_name="m",namespace="ns"}[1m])))"#
        );
    }

    #[test]
    fn test_replicas_change() {
        let selector = Selector::variant(".*", ".*");
        assert_eq!(
            replicas_change(&selector, ScalingDirection::Out),
            r#"inferno_current_replicas{variant_name=~".*",accelerator_type=~".*"} and (delta(inferno_current_replicas{variant_name=~".*",accelerator_type=~".*"}[30s]) > 0)"#
        );
        assert!(replicas_change(&selector, ScalingDirection::In).ends_with("[30s]) < 0)"));
    }
}
