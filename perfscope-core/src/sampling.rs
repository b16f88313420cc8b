//! Sample production from range-query results.
//!
//! Two strategies are available. [`FlatSamples`] passes every observed value
//! through unchanged, which suits gauges. [`HistogramSynthetic`] rebuilds an
//! approximate population from a cumulative histogram (`sum by (le)` of
//! bucket rates), which is the only option when the backend stores latency
//! as bucket counters.

use ordered_float::OrderedFloat;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::series::{parse_prom_float, PromSeries, LE_LABEL};

/// Produces scalar samples from a raw range-query result
pub trait SampleGenerator {
    /// Generate samples; an empty result means "no data"
    fn generate(&self, results: &[PromSeries], rng: &mut dyn RngCore) -> Vec<f64>;
}

/// Every parseable, non-NaN value of every series, in order
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSamples;

impl SampleGenerator for FlatSamples {
    fn generate(&self, results: &[PromSeries], _rng: &mut dyn RngCore) -> Vec<f64> {
        results
            .iter()
            .flat_map(|series| series.samples())
            .filter_map(|sample| sample.parse_value().ok())
            .filter(|v| !v.is_nan())
            .collect()
    }
}

/// Synthetic samples reconstructed from cumulative histogram bucket rates
#[derive(Debug, Clone, Copy)]
pub struct HistogramSynthetic {
    pub max_samples: usize,
}

impl HistogramSynthetic {
    pub fn new(max_samples: usize) -> Self {
        Self { max_samples }
    }
}

impl Default for HistogramSynthetic {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAX_SAMPLES)
    }
}

impl SampleGenerator for HistogramSynthetic {
    fn generate(&self, results: &[PromSeries], rng: &mut dyn RngCore) -> Vec<f64> {
        let buckets = BucketSeries::from_results(results);
        histogram_to_samples(&buckets, self.max_samples, rng)
    }
}

/// Strategy selector used by configuration and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleStrategy {
    Flat,
    HistogramSynthetic { max_samples: usize },
}

impl Default for SampleStrategy {
    fn default() -> Self {
        SampleStrategy::Flat
    }
}

impl SampleGenerator for SampleStrategy {
    fn generate(&self, results: &[PromSeries], rng: &mut dyn RngCore) -> Vec<f64> {
        match self {
            SampleStrategy::Flat => FlatSamples.generate(results, rng),
            SampleStrategy::HistogramSynthetic { max_samples } => {
                HistogramSynthetic::new(*max_samples).generate(results, rng)
            }
        }
    }
}

/// One histogram bucket: its cumulative upper bound and the rates observed for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSeries {
    /// Inclusive upper bound, `f64::INFINITY` for the `+Inf` bucket
    pub upper_bound: f64,
    /// Rate observations over the query window
    pub rate_samples: Vec<f64>,
}

impl BucketSeries {
    pub fn new(upper_bound: f64, rate_samples: Vec<f64>) -> Self {
        Self {
            upper_bound,
            rate_samples,
        }
    }

    /// Build buckets from a `sum by (le)` result; series without a usable `le` are skipped
    pub fn from_results(results: &[PromSeries]) -> Vec<Self> {
        let mut buckets = Vec::with_capacity(results.len());
        for series in results {
            let Some(le) = series.label(LE_LABEL) else {
                warn!(labels = ?series.metric, "Skipping histogram series without le label");
                continue;
            };
            let upper_bound = match parse_prom_float(le) {
                Ok(v) if !v.is_nan() => v,
                _ => {
                    warn!(le, "Skipping histogram series with unparseable le label");
                    continue;
                }
            };
            let rate_samples = series
                .samples()
                .iter()
                .filter_map(|s| s.parse_value().ok())
                .filter(|v| !v.is_nan())
                .collect();
            buckets.push(Self::new(upper_bound, rate_samples));
        }
        buckets
    }

    /// Mean observed rate, `None` when the bucket has no observations
    pub fn average_rate(&self) -> Option<f64> {
        if self.rate_samples.is_empty() {
            return None;
        }
        Some(self.rate_samples.iter().sum::<f64>() / self.rate_samples.len() as f64)
    }
}

/// Reconstruct up to `max_samples` synthetic observations from cumulative bucket rates.
///
/// Buckets are cumulative, so each bucket's own share is the increase of its
/// average rate over the previous bucket's, clamped at zero to absorb noise
/// that makes the cumulative rates non-monotonic. A bucket receives
/// `floor(share / total_rate * max_samples)` samples drawn uniformly from
/// `[previous upper bound, upper bound)`. The unbounded `+Inf` bucket is
/// modeled as `[lo, 2 * lo)`.
pub fn histogram_to_samples<R: Rng + ?Sized>(
    buckets: &[BucketSeries],
    max_samples: usize,
    rng: &mut R,
) -> Vec<f64> {
    let mut averaged: Vec<(f64, f64)> = buckets
        .iter()
        .filter_map(|b| b.average_rate().map(|rate| (b.upper_bound, rate)))
        .collect();

    let total_rate: f64 = averaged.iter().map(|(_, rate)| rate).sum();
    if averaged.is_empty() || max_samples == 0 || !(total_rate > 0.0) {
        debug!(buckets = averaged.len(), total_rate, "No histogram data to sample");
        return Vec::new();
    }

    averaged.sort_by_key(|(upper, _)| OrderedFloat(*upper));

    let mut samples = Vec::with_capacity(max_samples);
    let mut prev_rate = 0.0;
    let mut prev_upper = 0.0;

    for (upper, rate) in averaged {
        let bucket_rate = (rate - prev_rate).max(0.0);
        prev_rate = rate;

        if bucket_rate <= 0.0 {
            prev_upper = upper;
            continue;
        }

        let n = (bucket_rate / total_rate * max_samples as f64).floor() as usize;
        if n == 0 {
            prev_upper = upper;
            continue;
        }

        let low = prev_upper;
        let high = if upper.is_finite() { upper } else { low * 2.0 };

        // Zero-width (or inverted) ranges carry no drawable mass.
        if high > low {
            samples.extend((0..n).map(|_| rng.random_range(low..high)));
        }

        prev_upper = upper;
    }

    samples.truncate(max_samples);
    samples
}
