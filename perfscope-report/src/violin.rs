//! Distribution figures: one violin per run.

use ordered_float::OrderedFloat;
use perfscope_core::{Palette, SampleFrame};

use crate::figure::{Axis, AxisKind, Figure, Panel, Trace, ViolinGroup};

/// Options of [`violin_plot_by_run`]
#[derive(Debug, Clone, PartialEq)]
pub struct ViolinOptions {
    pub title: String,
    /// Multiplier applied to every value before plotting
    pub yscale: f64,
    pub xtitle: String,
    pub ytitle: String,
}

impl Default for ViolinOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            yscale: 1.0,
            xtitle: "Run".to_string(),
            ytitle: String::new(),
        }
    }
}

/// One violin per run of `frame`, in first-seen run order.
///
/// Values are scaled by `yscale` (a zero scale is treated as 1) and
/// non-finite values are dropped. The y axis starts at 0.
pub fn violin_plot_by_run(
    frame: &SampleFrame,
    options: &ViolinOptions,
    palette: &Palette,
) -> (SampleFrame, Figure) {
    let yscale = if options.yscale == 0.0 { 1.0 } else { options.yscale };
    let scaled = frame.scaled(yscale);

    let runs: Vec<String> = scaled.runs().into_iter().map(str::to_string).collect();
    let groups = runs
        .iter()
        .map(|run| ViolinGroup {
            label: run.clone(),
            values: scaled.values_for(run),
        })
        .collect();

    let x_axis = Axis::new(options.xtitle.clone(), AxisKind::Category { labels: runs });
    let y_axis = Axis::linear(options.ytitle.clone()).with_min(0.0);
    let mut panel = Panel::new("", x_axis, y_axis);
    panel.show_legend = false;
    panel.traces.push(Trace::Violin {
        name: options.title.clone(),
        groups,
        color: palette.distribution,
        fill_opacity: 0.5,
        jitter: 0.3,
        show_box: true,
        show_mean: true,
        show_points: true,
    });

    (scaled, Figure::single(options.title.clone(), panel))
}

/// Value at quantile `q` of sorted data, interpolating linearly between ranks
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by_key(|v| OrderedFloat(*v));
    sorted
}

/// First quartile, median and third quartile
pub fn quartiles(values: &[f64]) -> Option<(f64, f64, f64)> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return None;
    }
    Some((
        quantile_sorted(&sorted, 0.25),
        quantile_sorted(&sorted, 0.5),
        quantile_sorted(&sorted, 0.75),
    ))
}

/// Silverman's rule of thumb; zero when the values do not spread
fn bandwidth(sorted: &[f64]) -> f64 {
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let iqr = quantile_sorted(sorted, 0.75) - quantile_sorted(sorted, 0.25);
    let spread = if iqr > 0.0 { std.min(iqr / 1.34) } else { std };
    0.9 * spread * n.powf(-0.2)
}

/// Gaussian kernel density estimate on `points` evenly spaced values
/// between the smallest and largest sample.
///
/// Returns `(value, density)` pairs; empty when there are no finite values
/// or when every value is the same.
pub fn kde(values: &[f64], points: usize) -> Vec<(f64, f64)> {
    let sorted = sorted_finite(values);
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    let bw = bandwidth(&sorted);
    if bw <= 0.0 || max <= min || points < 2 {
        return Vec::new();
    }

    let norm = 1.0 / (sorted.len() as f64 * bw * (2.0 * std::f64::consts::PI).sqrt());
    (0..points)
        .map(|i| {
            let y = min + (max - min) * i as f64 / (points - 1) as f64;
            let density = sorted
                .iter()
                .map(|v| (-0.5 * ((y - v) / bw).powi(2)).exp())
                .sum::<f64>()
                * norm;
            (y, density)
        })
        .collect()
}
