//! Per-run collectors.
//!
//! Each collector walks the study's runs in order and issues its queries
//! sequentially. A failed query never aborts the batch: the cell it was
//! meant to fill stays missing and a [`Failure`] is recorded instead.

use perfscope_core::{
    align_series, quantile_label, AlignedTable, Failure, Outcome, PerfError, PerfResult,
    RunTable, RunWindow, SampleFrame, SampleGenerator, Step, TimeRange, TABLE_QUANTILES,
};
use perfscope_core::time::TimeUnit;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::RangeQuery;
use crate::promql::{self, ScalingDirection, Selector};
use crate::study::{CandleOptions, NamedMetric};

/// Resolution of the run summary queries
pub const SUMMARY_STEP: Step = Step {
    value: 1,
    unit: TimeUnit::Minutes,
};

/// Resolution of the scaling event queries
pub const SCALING_STEP: Step = Step {
    value: 15,
    unit: TimeUnit::Seconds,
};

/// Gauge whose samples are integrated into the `Energy` row
pub const POWER_METRIC: &str = "Power";

/// Metric name of the derived energy row
pub const ENERGY_METRIC: &str = "Energy";

/// Scaling event column names
pub const SCALE_OUT: &str = "scale_out";
pub const SCALE_IN: &str = "scale_in";

/// Value of the last sample of the first returned series
pub async fn last_value<Q>(client: &Q, query: &str, range: &TimeRange, step: &Step) -> PerfResult<f64>
where
    Q: RangeQuery + ?Sized,
{
    let results = client.query_range(query, range, step).await?;
    results
        .first()
        .ok_or_else(|| PerfError::no_data(query))?
        .last_value()
}

/// Energy in Wh from a power gauge in W sampled every minute
pub async fn energy_wh<Q>(client: &Q, power_query: &str, range: &TimeRange) -> PerfResult<f64>
where
    Q: RangeQuery + ?Sized,
{
    let results = client.query_range(power_query, range, &SUMMARY_STEP).await?;
    let series = results
        .first()
        .ok_or_else(|| PerfError::no_data(power_query))?;
    let watt_minutes: f64 = series
        .samples()
        .iter()
        .filter_map(|s| s.parse_value().ok())
        .filter(|v| !v.is_nan())
        .sum();
    Ok(watt_minutes / 60.0)
}

fn run_range(run: &RunWindow, failures: &mut Vec<Failure>) -> Option<TimeRange> {
    Outcome::from_result(&run.label, "window", run.range()).record(failures)
}

/// P10..P99 of every histogram metric for every run.
///
/// `metrics` pairs a display name with the `_bucket` series name.
pub async fn histogram_p_table_by_run<Q>(
    client: &Q,
    runs: &[RunWindow],
    metrics: &[NamedMetric],
    selector: &Selector,
) -> PerfResult<RunTable>
where
    Q: RangeQuery + ?Sized,
{
    let columns: Vec<String> = TABLE_QUANTILES.iter().map(|p| quantile_label(*p)).collect();
    let mut table = RunTable::new(columns.clone());
    let mut failures = Vec::new();

    for run in runs {
        let Some(range) = run_range(run, &mut failures) else {
            continue;
        };
        info!(run = %run.label, metrics = metrics.len(), "Collecting histogram percentiles");

        for metric in metrics {
            let mut cells = Vec::with_capacity(columns.len());
            for (p, column) in TABLE_QUANTILES.iter().zip(&columns) {
                let query = promql::histogram_quantile_over_time(&metric.query, *p, selector);
                let result = last_value(client, &query, &range, &SUMMARY_STEP).await;
                let item = format!("{} {}", metric.name, column);
                let value = Outcome::from_result(&run.label, &item, result).record(&mut failures);
                cells.push((column.as_str(), value));
            }
            table.push_row(&run.label, &metric.name, cells)?;
        }
    }

    table.record_failures(failures);
    Ok(table)
}

/// Avg, Stddev and P10..P99 of every gauge for every run, plus an `Energy` row.
///
/// The energy row is only produced when a gauge named [`POWER_METRIC`] exists.
pub async fn gauge_p_table_by_run<Q>(
    client: &Q,
    runs: &[RunWindow],
    gauges: &[NamedMetric],
) -> PerfResult<RunTable>
where
    Q: RangeQuery + ?Sized,
{
    let quantile_columns: Vec<String> =
        TABLE_QUANTILES.iter().map(|p| quantile_label(*p)).collect();
    let mut columns = vec!["Sum".to_string(), "Avg".to_string(), "Stddev".to_string()];
    columns.extend(quantile_columns.iter().cloned());

    let mut table = RunTable::new(columns);
    let mut failures = Vec::new();
    let power = gauges.iter().find(|g| g.name == POWER_METRIC);

    for run in runs {
        let Some(range) = run_range(run, &mut failures) else {
            continue;
        };
        info!(run = %run.label, gauges = gauges.len(), "Collecting gauge statistics");

        for gauge in gauges {
            let mut cells: Vec<(&str, Option<f64>)> = Vec::new();

            let avg = last_value(client, &promql::avg_over_time(&gauge.query), &range, &SUMMARY_STEP)
                .await;
            cells.push((
                "Avg",
                Outcome::from_result(&run.label, &format!("{} Avg", gauge.name), avg)
                    .record(&mut failures),
            ));

            let stddev = last_value(
                client,
                &promql::stddev_over_time(&gauge.query),
                &range,
                &SUMMARY_STEP,
            )
            .await;
            cells.push((
                "Stddev",
                Outcome::from_result(&run.label, &format!("{} Stddev", gauge.name), stddev)
                    .record(&mut failures),
            ));

            for (p, column) in TABLE_QUANTILES.iter().zip(&quantile_columns) {
                let query = promql::quantile_over_time(&gauge.query, *p);
                let result = last_value(client, &query, &range, &SUMMARY_STEP).await;
                let item = format!("{} {}", gauge.name, column);
                cells.push((
                    column.as_str(),
                    Outcome::from_result(&run.label, &item, result).record(&mut failures),
                ));
            }

            table.push_row(&run.label, &gauge.name, cells)?;
        }

        match power {
            Some(power) => {
                let energy = energy_wh(client, &power.query, &range).await;
                let sum = Outcome::from_result(&run.label, ENERGY_METRIC, energy)
                    .record(&mut failures);
                table.push_row(&run.label, ENERGY_METRIC, [("Sum", sum)])?;
            }
            None => debug!(run = %run.label, "No power gauge, skipping energy row"),
        }
    }

    table.record_failures(failures);
    Ok(table)
}

/// One percentile series of a candlestick query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileQuery {
    pub p: f64,
    pub rate_interval: Step,
    pub step: Step,
}

/// The five candle percentiles: P50 uses its own resolution, the rest the IQR one
pub fn candle_quantiles(options: &CandleOptions) -> Vec<QuantileQuery> {
    let iqr = |p| QuantileQuery {
        p,
        rate_interval: options.iqr_rate_interval,
        step: options.iqr_step,
    };
    vec![
        iqr(0.10),
        iqr(0.25),
        QuantileQuery {
            p: 0.50,
            rate_interval: options.p50_rate_interval,
            step: options.p50_step,
        },
        iqr(0.75),
        iqr(0.90),
    ]
}

/// Percentile series of one histogram over one window, aligned on time.
///
/// Columns are named `P<percent>` and values are multiplied by `scale`.
/// Queries returning nothing add no column.
pub async fn histogram_quantiles<Q>(
    client: &Q,
    range: &TimeRange,
    metric_name: &str,
    selector: &Selector,
    quantiles: &[QuantileQuery],
    scale: f64,
) -> PerfResult<AlignedTable>
where
    Q: RangeQuery + ?Sized,
{
    let mut series = Vec::with_capacity(quantiles.len());
    for wanted in quantiles {
        let query = promql::histogram_quantile(metric_name, wanted.p, selector, &wanted.rate_interval);
        let results = client.query_range(&query, range, &wanted.step).await?;
        let Some(first) = results.first() else {
            debug!(query = %query, "Percentile query returned no series");
            continue;
        };
        series.push((quantile_label(wanted.p), first.points()));
    }

    let mut table = align_series(series);
    let names: Vec<String> = table.column_names().into_iter().map(str::to_string).collect();
    for name in &names {
        table.scale_column(name, scale)?;
    }
    Ok(table)
}

/// Replica counts at scale-out and scale-in steps, aligned on time
pub async fn scaling_events<Q>(client: &Q, range: &TimeRange, selector: &Selector) -> PerfResult<AlignedTable>
where
    Q: RangeQuery + ?Sized,
{
    let mut series = Vec::with_capacity(2);
    for (name, direction) in [
        (SCALE_OUT, ScalingDirection::Out),
        (SCALE_IN, ScalingDirection::In),
    ] {
        let query = promql::replicas_change(selector, direction);
        let results = client.query_range(&query, range, &SCALING_STEP).await?;
        let points = results.first().map(|s| s.points()).unwrap_or_default();
        series.push((name, points));
    }
    Ok(align_series(series))
}

/// Percentiles and scaling events of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub label: String,
    pub quantiles: AlignedTable,
    pub scaling: AlignedTable,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

/// Candlestick inputs for every run
pub async fn compare_runs_quantiles_for_metric<Q>(
    client: &Q,
    runs: &[RunWindow],
    model: &Selector,
    variant: &Selector,
    options: &CandleOptions,
) -> Vec<RunComparison>
where
    Q: RangeQuery + ?Sized,
{
    let quantiles = candle_quantiles(options);
    let mut comparisons = Vec::with_capacity(runs.len());

    for run in runs {
        let mut failures = Vec::new();
        let Some(range) = run_range(run, &mut failures) else {
            comparisons.push(RunComparison {
                label: run.label.clone(),
                quantiles: AlignedTable::new(),
                scaling: AlignedTable::new(),
                failures,
            });
            continue;
        };
        info!(run = %run.label, metric = %options.metric_name, "Collecting candle percentiles");

        let result = histogram_quantiles(
            client,
            &range,
            &options.metric_name,
            model,
            &quantiles,
            options.scale,
        )
        .await;
        let quantile_table = Outcome::from_result(&run.label, &options.metric_name, result)
            .record(&mut failures)
            .unwrap_or_default();

        let result = scaling_events(client, &range, variant).await;
        let scaling = Outcome::from_result(&run.label, promql::REPLICAS_METRIC, result)
            .record(&mut failures)
            .unwrap_or_default();

        comparisons.push(RunComparison {
            label: run.label.clone(),
            quantiles: quantile_table,
            scaling,
            failures,
        });
    }

    comparisons
}

/// Samples per run plus the runs whose query failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedSamples {
    pub frame: SampleFrame,
    pub failures: Vec<Failure>,
}

/// Evaluate `query` over every run and turn each result into samples.
///
/// Runs yielding no samples contribute no rows.
pub async fn custom_query_range_by_run<Q, G, R>(
    client: &Q,
    runs: &[RunWindow],
    query: &str,
    step: &Step,
    generator: &G,
    rng: &mut R,
) -> CollectedSamples
where
    Q: RangeQuery + ?Sized,
    G: SampleGenerator + ?Sized,
    R: RngCore,
{
    let mut collected = CollectedSamples::default();

    for run in runs {
        let Some(range) = run_range(run, &mut collected.failures) else {
            continue;
        };
        let result = client.query_range(query, &range, step).await;
        let Some(results) = Outcome::from_result(&run.label, query, result)
            .record(&mut collected.failures)
        else {
            continue;
        };

        let samples = generator.generate(&results, rng);
        debug!(run = %run.label, samples = samples.len(), "Generated samples");
        collected.frame.extend_run(&run.label, samples);
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_client::{series, MockRangeQuery};
    use approx::assert_relative_eq;
    use perfscope_core::{FlatSamples, HistogramSynthetic, Timestamp};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn runs() -> Vec<RunWindow> {
        vec![
            RunWindow::new(
                Timestamp::from_secs(1_000).unwrap(),
                Timestamp::from_secs(3_400).unwrap(),
                "WVA",
            )
            .unwrap(),
            RunWindow::new(
                Timestamp::from_secs(5_000).unwrap(),
                Timestamp::from_secs(7_400).unwrap(),
                "HPA",
            )
            .unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_histogram_table_records_failures() {
        let runs = runs();
        let mock = MockRangeQuery::new()
            .respond("quantile_over_time(0.5,", vec![series(&[], &[(1.0, 9.0), (2.0, 0.02)])])
            .fail_in("quantile_over_time(0.99,", runs[1].start, "backend exploded");

        let metrics = vec![NamedMetric::new("ITL", "vllm:inter_token_latency_seconds_bucket")];
        let table = histogram_p_table_by_run(&mock, &runs, &metrics, &Selector::model("m", "ns"))
            .await
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().len(), 7);
        // Last value of the first series
        assert_eq!(table.value("WVA", "ITL", "P50"), Some(0.02));
        // Empty responses are missing cells with a no-data failure
        assert_eq!(table.value("WVA", "ITL", "P10"), None);
        assert!(table
            .failures()
            .iter()
            .any(|f| f.run == "HPA" && f.item == "ITL P99" && f.reason.contains("exploded")));
        // Six failed cells per run
        assert_eq!(table.failures().len(), 12);
    }

    #[tokio::test]
    async fn test_gauge_table_with_energy() {
        let runs = runs();
        let mock = MockRangeQuery::new()
            .respond("sum(power)", vec![series(&[], &[(1.0, 600.0), (2.0, f64::NAN), (3.0, 600.0)])])
            .respond("avg_over_time((sum(power))", vec![series(&[], &[(1.0, 600.0)])])
            .respond("stddev_over_time((sum(power))", vec![series(&[], &[(1.0, 5.0)])]);

        let gauges = vec![NamedMetric::new(POWER_METRIC, "sum(power)")];
        let table = gauge_p_table_by_run(&mock, &runs, &gauges).await.unwrap();

        assert_eq!(table.metrics(), vec!["Power", "Energy"]);
        assert_eq!(table.value("WVA", "Power", "Avg"), Some(600.0));
        assert_eq!(table.value("HPA", "Power", "Stddev"), Some(5.0));
        // Quantile queries also match the raw power response here
        assert_eq!(table.value("WVA", "Power", "P90"), Some(600.0));
        // (600 + 600) W·min / 60 = 20 Wh, NaN samples ignored
        assert_relative_eq!(table.value("WVA", "Energy", "Sum").unwrap(), 20.0);
        assert_eq!(table.value("WVA", "Energy", "Avg"), None);
        assert!(table.failures().is_empty());
    }

    #[tokio::test]
    async fn test_gauge_table_without_power() {
        let mock = MockRangeQuery::new();
        let gauges = vec![NamedMetric::new("KV Cache", "avg(kv)")];
        let table = gauge_p_table_by_run(&mock, &runs(), &gauges).await.unwrap();
        assert_eq!(table.metrics(), vec!["KV Cache"]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_histogram_quantiles_alignment() {
        let range = TimeRange::from_secs(0, 600).unwrap();
        let mock = MockRangeQuery::new()
            .respond("histogram_quantile(0.1,", vec![series(&[], &[(60.0, 0.01), (120.0, 0.02)])])
            .respond("histogram_quantile(0.5,", vec![series(&[], &[(120.0, 0.03), (180.0, f64::NAN)])]);

        let options = CandleOptions::default();
        let table = histogram_quantiles(
            &mock,
            &range,
            &options.metric_name,
            &Selector::model("m", "ns"),
            &candle_quantiles(&options),
            1000.0,
        )
        .await
        .unwrap();

        assert_eq!(table.column_names(), vec!["P10", "P50"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("P10").unwrap(), &[Some(10.0), Some(20.0), None]);
        assert_eq!(table.column("P50").unwrap(), &[None, Some(30.0), None]);

        let calls = mock.calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[0].query.contains("vllm:inter_token_latency_seconds_bucket"));
        assert_eq!(calls[0].step, Step::minutes(1));
    }

    #[tokio::test]
    async fn test_compare_runs_keeps_going_after_failure() {
        let runs = runs();
        let mock = MockRangeQuery::new()
            .respond("histogram_quantile(", vec![series(&[], &[(1_060.0, 0.5)])])
            .respond("> 0)", vec![series(&[], &[(1_060.0, 2.0)])])
            .fail_in("histogram_quantile(", runs[0].start, "timeout");

        let comparisons = compare_runs_quantiles_for_metric(
            &mock,
            &runs,
            &Selector::model("m", "ns"),
            &Selector::variant(".*", ".*"),
            &CandleOptions::default(),
        )
        .await;

        assert_eq!(comparisons.len(), 2);
        assert_eq!(comparisons[0].label, "WVA");
        assert!(comparisons[0].quantiles.is_empty());
        assert_eq!(comparisons[0].failures.len(), 1);
        // Scaling still collected for the failed run
        assert_eq!(comparisons[0].scaling.column_names(), vec![SCALE_OUT]);

        assert!(comparisons[1].failures.is_empty());
        assert_eq!(comparisons[1].quantiles.column_names().len(), 5);

        let steps: Vec<Step> = mock
            .calls()
            .iter()
            .filter(|c| c.query.contains(promql::REPLICAS_METRIC))
            .map(|c| c.step)
            .collect();
        assert!(steps.iter().all(|s| *s == SCALING_STEP));
    }

    #[tokio::test]
    async fn test_custom_query_by_run() {
        let runs = runs();
        let mock = MockRangeQuery::new()
            .respond("rate(x)", vec![series(&[], &[(1.0, 1.0), (2.0, f64::NAN), (3.0, 3.0)])])
            .fail_in("rate(x)", runs[1].start, "connection refused");

        let mut rng = StdRng::seed_from_u64(3);
        let collected =
            custom_query_range_by_run(&mock, &runs, "rate(x)", &Step::seconds(15), &FlatSamples, &mut rng)
                .await;

        assert_eq!(collected.frame.values_for("WVA"), vec![1.0, 3.0]);
        assert!(collected.frame.values_for("HPA").is_empty());
        assert_eq!(collected.failures.len(), 1);
        assert_eq!(collected.failures[0].run, "HPA");
    }

    #[tokio::test]
    async fn test_custom_query_with_histogram_strategy() {
        let runs = runs();
        let mock = MockRangeQuery::new().respond(
            "sum by (le)",
            vec![
                series(&[("le", "0.1")], &[(1.0, 2.0)]),
                series(&[("le", "+Inf")], &[(1.0, 2.0)]),
            ],
        );

        let mut rng = StdRng::seed_from_u64(11);
        let generator = HistogramSynthetic::new(100);
        let collected = custom_query_range_by_run(
            &mock,
            &runs[..1],
            "sum by (le) (rate(x_bucket[1m]))",
            &Step::seconds(15),
            &generator,
            &mut rng,
        )
        .await;

        // Half of the total rate sits in the first bucket
        let values = collected.frame.values_for("WVA");
        assert_eq!(values.len(), 50);
        assert!(values.iter().all(|v| (0.0..0.1).contains(v)));
    }
}
