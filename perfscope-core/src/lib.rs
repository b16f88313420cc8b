//! # perfscope core library
//!
//! Shared data types and the analysis transforms used by the query and
//! report crates.
//!
//! ## Features
//!
//! - **Data Types**: time series points, backend range-query results, run windows
//! - **Sampling**: synthetic sample reconstruction from cumulative histograms
//! - **Alignment**: outer-join of independently stepped series on one time axis
//! - **Trend**: up/down classification of candle medians with forward-fill
//! - **Tables**: per-run comparison tables with relative change against a baseline
//! - **Styling**: colormaps, normalization and cell styling for comparison tables
//!
//! ## Architecture
//!
//! Everything in this crate is synchronous and free of I/O. Query results
//! arrive already resident in memory and every transform is a pure
//! function of its inputs, so independent runs can be processed in any
//! order or in parallel by the caller.

pub mod align;
pub mod error;
pub mod outcome;
pub mod sampling;
pub mod series;
pub mod style;
pub mod table;
pub mod time;
pub mod trend;

// Re-export commonly used types
pub use align::{align_series, AlignedTable};
pub use error::{PerfError, PerfResult};
pub use outcome::{Failure, Outcome};
pub use sampling::{
    BucketSeries, FlatSamples, HistogramSynthetic, SampleGenerator, SampleStrategy,
};
pub use series::{PromSample, PromSeries, RunWindow, SampleFrame, TimeSeriesPoint};
pub use style::{Colormap, MetricColormaps, Palette, Rgb, StyledTable, TableFormat};
pub use table::{RunRow, RunTable};
pub use time::{Step, TimeRange, Timestamp};
pub use trend::{classify_trend, Trend};

/// Default upper bound on synthetic samples drawn per run
pub const DEFAULT_MAX_SAMPLES: usize = 1500;

/// Percentiles reported by the per-run comparison tables
pub const TABLE_QUANTILES: [f64; 7] = [0.10, 0.25, 0.50, 0.75, 0.90, 0.95, 0.99];

/// Column label for a quantile, e.g. `0.99` -> `P99`, `0.999` -> `P99.9`
pub fn quantile_label(p: f64) -> String {
    let pct = (p * 100.0 * 1000.0).round() / 1000.0;
    if pct.fract() == 0.0 {
        format!("P{}", pct as i64)
    } else {
        format!("P{}", pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_labels() {
        assert_eq!(quantile_label(0.1), "P10");
        assert_eq!(quantile_label(0.25), "P25");
        assert_eq!(quantile_label(0.99), "P99");
        assert_eq!(quantile_label(0.999), "P99.9");
        assert_eq!(quantile_label(0.5), "P50");
    }
}
