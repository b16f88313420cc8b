//! Serializable figure descriptions.
//!
//! Builders produce a [`Figure`]; [`crate::render`] turns it into SVG and the
//! artifact store persists it as JSON so it can be re-rendered later.

use perfscope_core::Rgb;
use serde::{Deserialize, Serialize};

/// How x values are interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxisKind {
    Linear,
    /// Epoch seconds, labeled as wall-clock time
    Time,
    /// Integer positions `0..n`, labeled with the given names
    Category { labels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub title: String,
    pub kind: AxisKind,
    /// Appended to every tick label, e.g. `ms` or ` Hz`
    #[serde(default)]
    pub tick_suffix: String,
    /// Fixed lower bound; data range when unset
    #[serde(default)]
    pub min: Option<f64>,
    /// Fixed upper bound; data range when unset
    #[serde(default)]
    pub max: Option<f64>,
}

impl Axis {
    pub fn new<S: Into<String>>(title: S, kind: AxisKind) -> Self {
        Self {
            title: title.into(),
            kind,
            tick_suffix: String::new(),
            min: None,
            max: None,
        }
    }

    pub fn linear<S: Into<String>>(title: S) -> Self {
        Self::new(title, AxisKind::Linear)
    }

    pub fn time<S: Into<String>>(title: S) -> Self {
        Self::new(title, AxisKind::Time)
    }

    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.tick_suffix = suffix.into();
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineShape {
    Linear,
    /// Horizontal then vertical steps
    StepHv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSymbol {
    Circle,
    TriangleUp,
    TriangleDown,
}

/// One group of a violin trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolinGroup {
    pub label: String,
    pub values: Vec<f64>,
}

/// A drawable series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trace {
    Candlestick {
        name: String,
        x: Vec<f64>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        color: Rgb,
        fill_opacity: f64,
        /// Candle width in x units
        period: f64,
    },
    Line {
        name: String,
        x: Vec<f64>,
        y: Vec<Option<f64>>,
        color: Rgb,
        width: u32,
        shape: LineShape,
        show_legend: bool,
    },
    Markers {
        name: String,
        x: Vec<f64>,
        y: Vec<f64>,
        color: Rgb,
        size: u32,
        symbol: MarkerSymbol,
        /// Plotted against the secondary y axis
        secondary: bool,
    },
    Violin {
        name: String,
        groups: Vec<ViolinGroup>,
        color: Rgb,
        fill_opacity: f64,
        jitter: f64,
        show_box: bool,
        show_mean: bool,
        show_points: bool,
    },
}

fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn merge(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (a, None) => a,
        (None, b) => b,
    }
}

impl Trace {
    pub fn name(&self) -> &str {
        match self {
            Trace::Candlestick { name, .. }
            | Trace::Line { name, .. }
            | Trace::Markers { name, .. }
            | Trace::Violin { name, .. } => name,
        }
    }

    /// Candlesticks are never listed in legends
    pub fn show_legend(&self) -> bool {
        match self {
            Trace::Candlestick { .. } => false,
            Trace::Line { show_legend, .. } => *show_legend,
            Trace::Markers { .. } | Trace::Violin { .. } => true,
        }
    }

    pub fn is_secondary(&self) -> bool {
        matches!(self, Trace::Markers { secondary: true, .. })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Trace::Candlestick { x, .. } | Trace::Line { x, .. } | Trace::Markers { x, .. } => {
                x.is_empty()
            }
            Trace::Violin { groups, .. } => groups.iter().all(|g| g.values.is_empty()),
        }
    }

    pub fn x_extent(&self) -> Option<(f64, f64)> {
        match self {
            Trace::Candlestick { x, period, .. } => {
                extent(x.iter().copied()).map(|(lo, hi)| (lo - period / 2.0, hi + period / 2.0))
            }
            Trace::Line { x, .. } | Trace::Markers { x, .. } => extent(x.iter().copied()),
            Trace::Violin { groups, .. } if !groups.is_empty() => {
                Some((-0.5, groups.len() as f64 - 0.5))
            }
            Trace::Violin { .. } => None,
        }
    }

    pub fn y_extent(&self) -> Option<(f64, f64)> {
        match self {
            Trace::Candlestick { high, low, .. } => {
                extent(high.iter().chain(low.iter()).copied())
            }
            Trace::Line { y, .. } => extent(y.iter().flatten().copied()),
            Trace::Markers { y, .. } => extent(y.iter().copied()),
            Trace::Violin { groups, .. } => {
                extent(groups.iter().flat_map(|g| g.values.iter().copied()))
            }
        }
    }
}

/// One plotting area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub title: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    #[serde(default)]
    pub secondary_y: Option<Axis>,
    pub traces: Vec<Trace>,
    pub show_legend: bool,
}

impl Panel {
    pub fn new<S: Into<String>>(title: S, x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            title: title.into(),
            x_axis,
            y_axis,
            secondary_y: None,
            traces: Vec::new(),
            show_legend: true,
        }
    }

    pub fn has_secondary_y(&self) -> bool {
        self.traces.iter().any(Trace::is_secondary)
    }

    pub fn x_extent(&self) -> Option<(f64, f64)> {
        self.traces
            .iter()
            .map(Trace::x_extent)
            .fold(None, merge)
    }

    /// Data extent of the primary or secondary y axis
    pub fn y_extent(&self, secondary: bool) -> Option<(f64, f64)> {
        self.traces
            .iter()
            .filter(|t| t.is_secondary() == secondary)
            .map(Trace::y_extent)
            .fold(None, merge)
    }
}

/// A titled row of panels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    pub panels: Vec<Panel>,
    /// All panels use the union of their primary y ranges
    #[serde(default)]
    pub shared_y: bool,
}

impl Figure {
    pub fn single<S: Into<String>>(title: S, panel: Panel) -> Self {
        Self {
            title: title.into(),
            panels: vec![panel],
            shared_y: false,
        }
    }

    /// Primary y extent over every panel
    pub fn y_extent(&self) -> Option<(f64, f64)> {
        self.panels
            .iter()
            .map(|p| p.y_extent(false))
            .fold(None, merge)
    }
}
