//! Percentile candlesticks over time, with autoscaler events.
//!
//! Each candle spans P25..P75 with P10/P90 wicks. Candles are colored by
//! whether the median rose against the last median that had a P75 beside
//! it; candles whose trend is unknown use the falling color.

use perfscope_core::{classify_trend, AlignedTable, Palette, PerfResult, Rgb, Timestamp, Trend};
use perfscope_query::collect::{RunComparison, SCALE_IN, SCALE_OUT};
use perfscope_query::study::CandleOptions;
use tracing::debug;

use crate::combine::figures_to_single_row;
use crate::figure::{Axis, Figure, LineShape, MarkerSymbol, Panel, Trace};

const CANDLE_COLUMNS: [&str; 4] = ["P10", "P25", "P75", "P90"];

fn epoch(ts: &Timestamp) -> f64 {
    ts.epoch_secs_f64()
}

#[derive(Default)]
struct CandleRows {
    x: Vec<f64>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
}

impl CandleRows {
    fn into_trace(self, name: &str, color: Rgb, period: f64) -> Trace {
        Trace::Candlestick {
            name: name.to_string(),
            x: self.x,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            color,
            fill_opacity: 0.5,
            period,
        }
    }
}

/// Rising and falling candle traces over the rows where every candle column is present
fn candle_traces(
    quantiles: &AlignedTable,
    options: &CandleOptions,
    palette: &Palette,
) -> PerfResult<Vec<Trace>> {
    let complete = quantiles.complete_rows(&CANDLE_COLUMNS);
    if complete.is_empty() {
        debug!("No rows with every candle percentile, skipping candles");
        return Ok(Vec::new());
    }

    let trends = if quantiles.has_column("P50") {
        classify_trend(quantiles, "P50", "P75")?
    } else {
        vec![Trend::Unknown; quantiles.row_count()]
    };
    let p10 = quantiles.require_column("P10")?;
    let p25 = quantiles.require_column("P25")?;
    let p75 = quantiles.require_column("P75")?;
    let p90 = quantiles.require_column("P90")?;
    let timestamps = quantiles.timestamps();

    let mut up = CandleRows::default();
    let mut down = CandleRows::default();
    for i in complete {
        let (Some(low), Some(open), Some(close), Some(high)) = (p10[i], p25[i], p75[i], p90[i])
        else {
            continue;
        };
        let rows = if trends[i].is_up() { &mut up } else { &mut down };
        rows.x.push(epoch(&timestamps[i]));
        rows.open.push(open);
        rows.high.push(high);
        rows.low.push(low);
        rows.close.push(close);
    }

    let period = options.iqr_step.to_secs_f64();
    Ok(vec![
        up.into_trace(&options.title, palette.up, period),
        down.into_trace(&options.title, palette.down, period),
    ])
}

fn scaling_markers(scaling: &AlignedTable, palette: &Palette) -> Vec<Trace> {
    [
        (SCALE_OUT, "Scale Out", palette.scale_out, MarkerSymbol::TriangleUp),
        (SCALE_IN, "Scale In", palette.scale_in, MarkerSymbol::TriangleDown),
    ]
    .into_iter()
    .map(|(column, name, color, symbol)| {
        let (x, y) = scaling
            .present(column)
            .into_iter()
            .map(|(ts, v)| (epoch(&ts), v))
            .unzip();
        Trace::Markers {
            name: name.to_string(),
            x,
            y,
            color,
            size: 8,
            symbol,
            secondary: true,
        }
    })
    .collect()
}

/// Candlestick figure of one run
pub fn candlestick_over_time_with_scaling(
    quantiles: &AlignedTable,
    scaling: &AlignedTable,
    run_label: &str,
    options: &CandleOptions,
    palette: &Palette,
) -> PerfResult<Figure> {
    let title = format!("{} - {}", options.title, run_label);
    let mut panel = Panel::new(
        "",
        Axis::time("Time"),
        Axis::linear(options.yaxis_title.clone()).with_suffix(options.y_unit.clone()),
    );
    panel.secondary_y = Some(Axis::linear("Replicas"));

    panel.traces.extend(candle_traces(quantiles, options, palette)?);

    if let Some(p50) = quantiles.column("P50") {
        panel.traces.push(Trace::Line {
            name: "P50".to_string(),
            x: quantiles.timestamps().iter().map(epoch).collect(),
            y: p50.to_vec(),
            color: palette.median,
            width: 1,
            shape: LineShape::Linear,
            show_legend: true,
        });
    }

    panel.traces.extend(scaling_markers(scaling, palette));
    Ok(Figure::single(title, panel))
}

/// One candlestick figure per run, in run order
pub fn candlesticks_over_time_with_scaling(
    comparisons: &[RunComparison],
    options: &CandleOptions,
    palette: &Palette,
) -> PerfResult<Vec<(String, Figure)>> {
    comparisons
        .iter()
        .map(|run| {
            let figure = candlestick_over_time_with_scaling(
                &run.quantiles,
                &run.scaling,
                &run.label,
                options,
                palette,
            )?;
            Ok((run.label.clone(), figure))
        })
        .collect()
}

/// Every run's candlesticks in one row on a shared latency axis
pub fn candlesticks_over_time_with_scaling_subplots(
    comparisons: &[RunComparison],
    options: &CandleOptions,
    palette: &Palette,
) -> PerfResult<Figure> {
    let figures = candlesticks_over_time_with_scaling(comparisons, options, palette)?;
    let mut combined = figures_to_single_row(figures, true, 1)?;
    combined.title = options.title.clone();
    Ok(combined)
}
