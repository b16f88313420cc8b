//! End-to-end checks of the pure transforms on backend-shaped input
//!
//! Run with: cargo test --test pipeline_tests

use perfscope_core::{
    align_series, classify_trend, sampling::histogram_to_samples, BucketSeries,
    HistogramSynthetic, PromSeries, SampleGenerator, Timestamp, Trend,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bucket_result(le: &str, rates: &[&str]) -> serde_json::Value {
    let values: Vec<serde_json::Value> = rates
        .iter()
        .enumerate()
        .map(|(i, r)| serde_json::json!([1_700_000_000 + 60 * i as i64, r]))
        .collect();
    serde_json::json!({ "metric": { "le": le }, "values": values })
}

#[test]
fn test_histogram_response_to_samples() {
    let raw = serde_json::json!([
        bucket_result("+Inf", &["8", "8"]),
        bucket_result("0.01", &["4", "6"]),
        bucket_result("0.02", &["8", "8"]),
    ]);
    let results: Vec<PromSeries> = serde_json::from_value(raw).unwrap();

    let buckets = BucketSeries::from_results(&results);
    assert_eq!(buckets.len(), 3);

    // Rates average to 5 / 8 / 8: the +Inf bucket adds nothing new
    let mut rng = StdRng::seed_from_u64(7);
    let samples = HistogramSynthetic::new(1500).generate(&results, &mut rng);
    assert_eq!(samples.len(), 357 + 214);
    assert!(samples.iter().all(|s| (0.0..0.02).contains(s)));
    assert_eq!(samples.iter().filter(|s| **s < 0.01).count(), 357);
}

#[test]
fn test_zero_rate_histogram_has_no_samples() {
    let buckets = vec![
        BucketSeries::new(0.5, vec![0.0, 0.0]),
        BucketSeries::new(f64::INFINITY, vec![0.0]),
    ];
    let mut rng = StdRng::seed_from_u64(1);
    assert!(histogram_to_samples(&buckets, 1500, &mut rng).is_empty());
}

#[test]
fn test_candle_medians_trend() {
    let ts = |i: i64| Timestamp::from_secs(1_700_000_000 + 60 * i).unwrap();
    let p50 = vec![
        perfscope_core::TimeSeriesPoint::new(ts(0), Some(1.0)),
        perfscope_core::TimeSeriesPoint::new(ts(1), Some(1.5)),
        perfscope_core::TimeSeriesPoint::new(ts(2), Some(1.2)),
    ];
    let p75: Vec<_> = p50
        .iter()
        .map(|p| perfscope_core::TimeSeriesPoint::new(p.timestamp, p.value.map(|v| v * 1.2)))
        .collect();

    let table = align_series(vec![("P50", p50), ("P75", p75)]);
    let flags = classify_trend(&table, "P50", "P75").unwrap();

    assert_eq!(flags, vec![Trend::Unknown, Trend::Up, Trend::Down]);
}
