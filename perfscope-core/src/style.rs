//! Colors, colormaps, normalization and the cell styling policies of the
//! comparison tables.
//!
//! Nothing here holds global state: palettes and the metric to colormap
//! assignment are plain values handed to each styling call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PerfError, PerfResult};
use crate::table::{is_delta_column, RunTable, METRIC_COLUMN, RUN_COLUMN};

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional)
    pub fn from_hex(hex: &str) -> PerfResult<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(PerfError::parse(format!("Invalid hex color '{}'", hex)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| PerfError::parse(format!("Invalid hex color '{}'", hex)))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// CSS `rgba(r,g,b,alpha)` string
    pub fn with_opacity(&self, alpha: f64) -> String {
        format!("rgba({},{},{},{})", self.r, self.g, self.b, alpha)
    }

    /// Channels scaled to `[0, 1]`
    pub fn unit(&self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }

    /// Perceived brightness in `[0, 1]`
    pub fn luminance(&self) -> f64 {
        let [r, g, b] = self.unit();
        0.2126 * r + 0.7152 * g + 0.0722 * b
    }

    /// Linear interpolation towards `other`, `t` in `[0, 1]`
    pub fn lerp(&self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    /// `t = 0` gives white, `t = 1` gives this color
    pub fn blend_with_white(&self, t: f64) -> Rgb {
        Rgb::WHITE.lerp(*self, t)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Qualitative palette used for figure traces
pub const G10: [Rgb; 10] = [
    Rgb::new(0x33, 0x66, 0xcc),
    Rgb::new(0xdc, 0x39, 0x12),
    Rgb::new(0xff, 0x99, 0x00),
    Rgb::new(0x10, 0x96, 0x18),
    Rgb::new(0x99, 0x00, 0x99),
    Rgb::new(0x00, 0x99, 0xc6),
    Rgb::new(0xdd, 0x44, 0x77),
    Rgb::new(0x66, 0xaa, 0x00),
    Rgb::new(0xb8, 0x2e, 0x2e),
    Rgb::new(0x31, 0x63, 0x95),
];

/// Categorical palette used for per-run table colors
pub const TAB10: [Rgb; 10] = [
    Rgb::new(0x1f, 0x77, 0xb4),
    Rgb::new(0xff, 0x7f, 0x0e),
    Rgb::new(0x2c, 0xa0, 0x2c),
    Rgb::new(0xd6, 0x27, 0x28),
    Rgb::new(0x94, 0x67, 0xbd),
    Rgb::new(0x8c, 0x56, 0x4b),
    Rgb::new(0xe3, 0x77, 0xc2),
    Rgb::new(0x7f, 0x7f, 0x7f),
    Rgb::new(0xbc, 0xbd, 0x22),
    Rgb::new(0x17, 0xbe, 0xcf),
];

/// Named trace colors for figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    /// Candles whose median rose
    pub up: Rgb,
    /// Candles whose median fell or could not be compared
    pub down: Rgb,
    pub median: Rgb,
    pub scale_out: Rgb,
    pub scale_in: Rgb,
    pub distribution: Rgb,
    /// Categorical colors, one per non-baseline run
    pub runs: Vec<Rgb>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            up: G10[7],
            down: G10[1],
            median: G10[6],
            scale_out: G10[4],
            scale_in: G10[5],
            distribution: G10[0],
            runs: TAB10.to_vec(),
        }
    }
}

impl Palette {
    /// Color for the `i`-th run, cycling through [`Palette::runs`]
    pub fn run_color(&self, i: usize) -> Rgb {
        if self.runs.is_empty() {
            return TAB10[i % TAB10.len()];
        }
        self.runs[i % self.runs.len()]
    }
}

/// Continuous colormaps, defined by evenly spaced anchor colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Colormap {
    Coolwarm,
    Blues,
    Greens,
    Reds,
    Oranges,
    Purples,
    Greys,
}

impl Colormap {
    /// Sequential maps assigned to metrics, in assignment order
    pub const SEQUENTIAL: [Colormap; 6] = [
        Colormap::Blues,
        Colormap::Greens,
        Colormap::Reds,
        Colormap::Oranges,
        Colormap::Purples,
        Colormap::Greys,
    ];

    fn anchors(&self) -> &'static [Rgb] {
        match self {
            Colormap::Coolwarm => const { &[
                Rgb::new(59, 76, 192),
                Rgb::new(141, 176, 254),
                Rgb::new(221, 221, 221),
                Rgb::new(244, 154, 123),
                Rgb::new(180, 4, 38),
            ] },
            Colormap::Blues => const { &[
                Rgb::new(247, 251, 255),
                Rgb::new(107, 174, 214),
                Rgb::new(8, 48, 107),
            ] },
            Colormap::Greens => const { &[
                Rgb::new(247, 252, 245),
                Rgb::new(116, 196, 118),
                Rgb::new(0, 68, 27),
            ] },
            Colormap::Reds => const { &[
                Rgb::new(255, 245, 240),
                Rgb::new(251, 106, 74),
                Rgb::new(103, 0, 13),
            ] },
            Colormap::Oranges => const { &[
                Rgb::new(255, 245, 235),
                Rgb::new(253, 141, 60),
                Rgb::new(127, 39, 4),
            ] },
            Colormap::Purples => const { &[
                Rgb::new(252, 251, 253),
                Rgb::new(158, 154, 200),
                Rgb::new(63, 0, 125),
            ] },
            Colormap::Greys => const { &[
                Rgb::new(255, 255, 255),
                Rgb::new(150, 150, 150),
                Rgb::new(0, 0, 0),
            ] },
        }
    }

    /// Color at `t`; values outside `[0, 1]` take the end colors
    pub fn sample(&self, t: f64) -> Rgb {
        let anchors = self.anchors();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = (anchors.len() - 1) as f64;
        let pos = t * segments;
        let idx = (pos.floor() as usize).min(anchors.len() - 2);
        anchors[idx].lerp(anchors[idx + 1], pos - idx as f64)
    }
}

/// Explicit metric to colormap assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricColormaps {
    maps: BTreeMap<String, Colormap>,
}

impl MetricColormaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign [`Colormap::SEQUENTIAL`] to `metrics` in order, wrapping around
    pub fn in_order<'a>(metrics: impl IntoIterator<Item = &'a str>) -> Self {
        let maps = metrics
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                (
                    m.to_string(),
                    Colormap::SEQUENTIAL[i % Colormap::SEQUENTIAL.len()],
                )
            })
            .collect();
        Self { maps }
    }

    pub fn with(mut self, metric: &str, map: Colormap) -> Self {
        self.maps.insert(metric.to_string(), map);
        self
    }

    pub fn get(&self, metric: &str) -> Option<Colormap> {
        self.maps.get(metric).copied()
    }
}

/// Linear normalization of `[vmin, vmax]` onto `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    vmin: f64,
    vmax: f64,
}

impl Normalize {
    /// `None` when the range is empty or not finite
    pub fn new(vmin: f64, vmax: f64) -> Option<Self> {
        if !vmin.is_finite() || !vmax.is_finite() || vmax <= vmin {
            return None;
        }
        Some(Self { vmin, vmax })
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.vmin) / (self.vmax - self.vmin)
    }
}

/// Symmetric log normalization: linear within `±linthresh`, logarithmic beyond
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymLogNorm {
    linthresh: f64,
    linscale_adj: f64,
    t_min: f64,
    t_max: f64,
}

impl SymLogNorm {
    const BASE: f64 = 10.0;

    /// `None` when the transformed range is degenerate
    pub fn new(linthresh: f64, vmin: f64, vmax: f64) -> Option<Self> {
        if linthresh.is_nan() || linthresh <= 0.0 || !vmin.is_finite() || !vmax.is_finite() {
            return None;
        }
        let linscale_adj = 1.0 / (1.0 - 1.0 / Self::BASE);
        let mut norm = Self {
            linthresh,
            linscale_adj,
            t_min: 0.0,
            t_max: 0.0,
        };
        norm.t_min = norm.transform(vmin);
        norm.t_max = norm.transform(vmax);
        if norm.t_max <= norm.t_min {
            return None;
        }
        Some(norm)
    }

    fn transform(&self, value: f64) -> f64 {
        let abs = value.abs();
        if abs <= self.linthresh {
            value * self.linscale_adj
        } else {
            value.signum()
                * self.linthresh
                * (self.linscale_adj + (abs / self.linthresh).log(Self::BASE))
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        (self.transform(value) - self.t_min) / (self.t_max - self.t_min)
    }
}

/// Display configuration for comparison tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFormat {
    /// Run label the deltas are computed against
    pub baseline: String,
    /// Multiplier applied to a metric's values before display (default 1)
    #[serde(default)]
    pub metric_scale: BTreeMap<String, f64>,
    /// Unit suffix for a metric's values (default `s`)
    #[serde(default)]
    pub metric_unit: BTreeMap<String, String>,
}

impl TableFormat {
    pub fn new<S: Into<String>>(baseline: S) -> Self {
        Self {
            baseline: baseline.into(),
            metric_scale: BTreeMap::new(),
            metric_unit: BTreeMap::new(),
        }
    }

    pub fn scale(&self, metric: &str) -> f64 {
        self.metric_scale.get(metric).copied().unwrap_or(1.0)
    }

    pub fn unit(&self, metric: &str) -> &str {
        self.metric_unit.get(metric).map(String::as_str).unwrap_or("s")
    }

    /// Display text of one cell
    pub fn format_cell(&self, metric: &str, column: &str, value: Option<f64>) -> String {
        match value {
            None => String::new(),
            Some(v) if is_delta_column(column, &self.baseline) => format!("{:.2}%", v * 100.0),
            Some(v) => format!("{:.2}{}", v * self.scale(metric), self.unit(metric)),
        }
    }
}

/// One rendered table cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyledCell {
    pub text: String,
    /// Inline CSS declarations, empty when unstyled
    pub css: String,
}

/// A display-ready table: formatted text plus per-cell CSS
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyledTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<StyledCell>>,
    /// Table-wide `(selector, declarations)` rules
    pub table_styles: Vec<(String, String)>,
    /// Metric of each row, used for separators
    pub row_metrics: Vec<String>,
}

/// Cells with a missing value stay transparent regardless of policy
const NEUTRAL_CELL_RULE: (&str, &str) = ("td", "background-color: inherit");

/// Largest |delta| that still receives a color
pub const DELTA_CAP: f64 = 5.0;

fn cell_css(background: Rgb, text: Rgb) -> String {
    format!(
        "background-color: {} !important; color: {} !important;",
        background,
        text
    )
}

/// Format every cell; styling is applied by the policies below
fn base_table(table: &RunTable, format: &TableFormat) -> StyledTable {
    let mut headers = vec![RUN_COLUMN.to_string(), METRIC_COLUMN.to_string()];
    headers.extend(table.columns().iter().cloned());

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut cells = vec![
                StyledCell {
                    text: row.run.clone(),
                    css: String::new(),
                },
                StyledCell {
                    text: row.metric.clone(),
                    css: String::new(),
                },
            ];
            let is_baseline = row.run == format.baseline;
            for (column, value) in table.columns().iter().zip(&row.values) {
                let hidden = is_baseline && is_delta_column(column, &format.baseline);
                let value = if hidden { None } else { *value };
                cells.push(StyledCell {
                    text: format.format_cell(&row.metric, column, value),
                    css: String::new(),
                });
            }
            cells
        })
        .collect();

    StyledTable {
        headers,
        rows,
        table_styles: Vec::new(),
        row_metrics: table.rows().iter().map(|r| r.metric.clone()).collect(),
    }
}

/// Diverging `coolwarm` gradient per column, symmetric around zero.
///
/// The column range is `[-vmax, vmax]` with `vmax` the largest magnitude in
/// the column (delta columns only count values within [`DELTA_CAP`]). Only
/// non-baseline cells with a magnitude above 0.1 are colored.
pub fn format_with_units(table: &RunTable, format: &TableFormat) -> StyledTable {
    const EPSILON: f64 = 0.1;
    const TEXT_THRESHOLD: f64 = 0.408;

    let mut styled = base_table(table, format);

    for (col_idx, column) in table.columns().iter().enumerate() {
        let delta = is_delta_column(column, &format.baseline);
        let within_cap = |v: f64| !delta || v.abs() <= DELTA_CAP;

        let vmax = table
            .rows()
            .iter()
            .filter_map(|r| r.values[col_idx])
            .filter(|v| within_cap(*v))
            .map(f64::abs)
            .fold(f64::NAN, f64::max);
        let Some(norm) = Normalize::new(-vmax, vmax) else {
            continue;
        };

        for (row_idx, row) in table.rows().iter().enumerate() {
            let Some(value) = row.values[col_idx] else {
                continue;
            };
            if row.run == format.baseline || value.abs() <= EPSILON || !within_cap(value) {
                continue;
            }
            let background = Colormap::Coolwarm.sample(norm.apply(value));
            let text = if background.luminance() < TEXT_THRESHOLD {
                Rgb::WHITE
            } else {
                Rgb::BLACK
            };
            styled.rows[row_idx][col_idx + 2].css = cell_css(background, text);
        }
    }

    styled
}

/// Per-metric colormap on delta columns with symmetric-log normalization.
///
/// Each metric is normalized over its own delta values. Metrics without a
/// colormap in `colormaps` or with a degenerate range stay unstyled.
pub fn format_per_metric_colormap(
    table: &RunTable,
    format: &TableFormat,
    colormaps: &MetricColormaps,
) -> StyledTable {
    const LINTHRESH: f64 = 0.05;

    let mut styled = base_table(table, format);
    styled
        .table_styles
        .push((NEUTRAL_CELL_RULE.0.to_string(), NEUTRAL_CELL_RULE.1.to_string()));

    let delta_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| is_delta_column(c, &format.baseline))
        .map(|(i, _)| i)
        .collect();

    for metric in table.metrics() {
        let Some(cmap) = colormaps.get(metric) else {
            continue;
        };
        let metric_rows: Vec<usize> = table
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.metric == metric)
            .map(|(i, _)| i)
            .collect();

        let values: Vec<f64> = metric_rows
            .iter()
            .flat_map(|&r| delta_cols.iter().filter_map(move |&c| table.rows()[r].values[c]))
            .collect();
        let vmin = values.iter().copied().fold(f64::NAN, f64::min);
        let vmax = values.iter().copied().fold(f64::NAN, f64::max);
        if vmax.is_nan() || vmax == 0.0 {
            continue;
        }
        let Some(norm) = SymLogNorm::new(LINTHRESH, vmin, vmax) else {
            continue;
        };

        for &row_idx in &metric_rows {
            let row = &table.rows()[row_idx];
            if row.run == format.baseline {
                continue;
            }
            for &col_idx in &delta_cols {
                let Some(value) = row.values[col_idx] else {
                    continue;
                };
                if value == 0.0 || value.abs() > DELTA_CAP {
                    continue;
                }
                let background = cmap.sample(norm.apply(value));
                let text = if background.luminance() > 0.5 {
                    Rgb::BLACK
                } else {
                    Rgb::WHITE
                };
                styled.rows[row_idx][col_idx + 2].css = cell_css(background, text);
            }
        }
    }

    styled
}

/// One base color per non-baseline run, shaded by row-wise |delta|.
///
/// Within a row, each |delta| is normalized against the row's largest
/// |delta| (ignoring values above `delta_cap`) and the run color is blended
/// with white at `clamp(t, 0.15, 1)`.
pub fn format_per_run_color(
    table: &RunTable,
    format: &TableFormat,
    palette: &Palette,
    delta_cap: f64,
) -> StyledTable {
    let mut styled = base_table(table, format);
    styled
        .table_styles
        .push((NEUTRAL_CELL_RULE.0.to_string(), NEUTRAL_CELL_RULE.1.to_string()));

    let runs: Vec<&str> = table
        .runs()
        .into_iter()
        .filter(|r| *r != format.baseline)
        .collect();

    let delta_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| is_delta_column(c, &format.baseline))
        .map(|(i, _)| i)
        .collect();

    for (row_idx, row) in table.rows().iter().enumerate() {
        let Some(run_idx) = runs.iter().position(|r| *r == row.run) else {
            continue;
        };
        let base = palette.run_color(run_idx);

        let in_cap = |v: &f64| v.abs() <= delta_cap;
        let row_max = delta_cols
            .iter()
            .filter_map(|&c| row.values[c])
            .filter(in_cap)
            .map(f64::abs)
            .fold(f64::NAN, f64::max);
        let Some(norm) = Normalize::new(0.0, row_max) else {
            continue;
        };

        for &col_idx in &delta_cols {
            let Some(value) = row.values[col_idx].filter(in_cap) else {
                continue;
            };
            let t = norm.apply(value.abs()).clamp(0.15, 1.0);
            let background = base.blend_with_white(t);
            let text = if background.luminance() > 0.6 {
                Rgb::BLACK
            } else {
                Rgb::WHITE
            };
            styled.rows[row_idx][col_idx + 2].css = cell_css(background, text);
        }
    }

    styled
}

/// Separator rule drawn above the first row of each new metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparatorStyle {
    pub color: String,
    pub width: String,
    pub line: String,
}

impl Default for SeparatorStyle {
    fn default() -> Self {
        Self {
            color: "#ffffff".to_string(),
            width: "10px".to_string(),
            line: "solid".to_string(),
        }
    }
}

/// Add a `border-top` to every cell of rows where the metric changes
pub fn add_metric_separators(mut styled: StyledTable, separator: &SeparatorStyle) -> StyledTable {
    let rule = format!(
        "border-top: {} {} {};",
        separator.width, separator.line, separator.color
    );
    let mut prev: Option<&str> = None;
    let mut boundaries = Vec::new();
    for (idx, metric) in styled.row_metrics.iter().enumerate() {
        let metric = metric.as_str();
        if prev.is_some_and(|p| p != metric) {
            boundaries.push(idx);
        }
        prev = Some(metric);
    }
    for idx in boundaries {
        for cell in &mut styled.rows[idx] {
            if cell.css.is_empty() {
                cell.css = rule.clone();
            } else {
                cell.css = format!("{} {}", cell.css, rule);
            }
        }
    }
    styled
}
