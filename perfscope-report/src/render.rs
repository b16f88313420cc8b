//! SVG rendering of [`Figure`] descriptions with plotters.

use anyhow::{Context, Result};
use perfscope_core::{Rgb, Timestamp};
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::figure::{Axis, AxisKind, Figure, LineShape, MarkerSymbol, Panel, Trace, ViolinGroup};
use crate::violin::{kde, quartiles};

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Fraction of a candle period covered by its body
const CANDLE_BODY: f64 = 0.7;

/// Largest half width of a violin, in category units
const VIOLIN_HALF_WIDTH: f64 = 0.4;

/// Grid points of each violin outline
const KDE_POINTS: usize = 64;

/// Seed of the point jitter, fixed so renders are reproducible
const JITTER_SEED: u64 = 0x5eed;

/// Half width, in seconds, of a time axis holding a single instant
const TIME_FLAT_HALF_SPAN: f64 = 60.0;

fn color(c: Rgb) -> RGBColor {
    RGBColor(c.r, c.g, c.b)
}

/// Render a figure to an SVG document
pub fn render_svg(figure: &Figure, width: u32, height: u32) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;
        let body = if figure.title.is_empty() {
            root.clone()
        } else {
            root.titled(&figure.title, ("sans-serif", 24))?
        };

        let shared = if figure.shared_y {
            figure.y_extent()
        } else {
            None
        };

        if !figure.panels.is_empty() {
            let areas = body.split_evenly((1, figure.panels.len()));
            for (panel, area) in figure.panels.iter().zip(areas.iter()) {
                draw_panel(area, panel, shared)
                    .with_context(|| format!("Failed to draw panel '{}'", panel.title))?;
            }
        }
        root.present()?;
    }
    debug!(title = %figure.title, bytes = svg.len(), "Rendered figure");
    Ok(svg)
}

/// Widen a data extent into a drawable range, honoring fixed axis bounds
fn axis_range(axis: &Axis, extent: Option<(f64, f64)>, pad: bool) -> (f64, f64) {
    let (mut lo, mut hi) = extent.unwrap_or((0.0, 1.0));
    if pad {
        let margin = (hi - lo) * 0.05;
        lo -= margin;
        hi += margin;
    }
    if let Some(min) = axis.min {
        lo = min;
    }
    if let Some(max) = axis.max {
        hi = max;
    }
    if hi <= lo {
        let half = match axis.kind {
            AxisKind::Time => TIME_FLAT_HALF_SPAN,
            _ if lo == 0.0 => 1.0,
            _ => lo.abs() * 0.1,
        };
        (lo - half, hi + half)
    } else {
        (lo, hi)
    }
}

fn tick_label(axis: &Axis, value: f64) -> String {
    let text = match &axis.kind {
        AxisKind::Linear => format_number(value),
        AxisKind::Time => Timestamp::from_epoch_secs_f64(value)
            .map(|ts| ts.datetime().format("%H:%M").to_string())
            .unwrap_or_default(),
        AxisKind::Category { labels } => {
            let nearest = value.round();
            if (value - nearest).abs() > 0.05 || nearest < 0.0 {
                return String::new();
            }
            return labels.get(nearest as usize).cloned().unwrap_or_default();
        }
    };
    format!("{}{}", text, axis.tick_suffix)
}

fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude == 0.0 || (0.01..10_000.0).contains(&magnitude) {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        format!("{:.1e}", value)
    }
}

/// Linear map from the secondary y range onto the primary one
#[derive(Debug, Clone, Copy)]
struct SecondaryMap {
    from: (f64, f64),
    to: (f64, f64),
}

impl SecondaryMap {
    fn apply(&self, v: f64) -> f64 {
        let t = (v - self.from.0) / (self.from.1 - self.from.0);
        self.to.0 + t * (self.to.1 - self.to.0)
    }
}

fn draw_panel(area: &Area<'_>, panel: &Panel, shared_y: Option<(f64, f64)>) -> Result<()> {
    let (x0, x1) = axis_range(&panel.x_axis, panel.x_extent(), false);
    let y_extent = shared_y.or_else(|| panel.y_extent(false));
    let (y0, y1) = axis_range(&panel.y_axis, y_extent, true);

    let secondary_axis = panel
        .secondary_y
        .clone()
        .unwrap_or_else(|| Axis::linear("Replicas"));
    let has_secondary = panel.has_secondary_y();
    let (s0, s1) = axis_range(&secondary_axis, panel.y_extent(true), true);
    let secondary = SecondaryMap {
        from: (s0, s1),
        to: (y0, y1),
    };

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .right_y_label_area_size(if has_secondary { 50 } else { 0 });
    if !panel.title.is_empty() {
        builder.caption(&panel.title, ("sans-serif", 16));
    }
    let mut chart = builder
        .build_cartesian_2d(x0..x1, y0..y1)?
        .set_secondary_coord(x0..x1, s0..s1);

    let x_fmt = |v: &f64| tick_label(&panel.x_axis, *v);
    let y_fmt = |v: &f64| tick_label(&panel.y_axis, *v);
    let x_labels = match &panel.x_axis.kind {
        AxisKind::Category { labels } => labels.len() * 4 + 1,
        _ => 8,
    };
    chart
        .configure_mesh()
        .x_desc(panel.x_axis.title.as_str())
        .y_desc(panel.y_axis.title.as_str())
        .x_labels(x_labels)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt)
        .light_line_style(WHITE)
        .draw()?;

    if has_secondary {
        let s_fmt = |v: &f64| tick_label(&secondary_axis, *v);
        chart
            .configure_secondary_axes()
            .y_desc(secondary_axis.title.as_str())
            .y_label_formatter(&s_fmt)
            .draw()?;
    }

    let mut labeled = false;
    for trace in &panel.traces {
        if trace.is_empty() {
            continue;
        }
        let legend = panel.show_legend && trace.show_legend();
        labeled |= legend;
        match trace {
            Trace::Candlestick { .. } => draw_candles(&mut chart, trace, x1 - x0)?,
            Trace::Line { .. } => draw_line(&mut chart, trace, legend)?,
            Trace::Markers { .. } => draw_markers(&mut chart, trace, legend, secondary)?,
            Trace::Violin { .. } => draw_violin(&mut chart, trace, legend)?,
        }
    }

    if labeled {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(("sans-serif", 12))
            .draw()?;
    }
    Ok(())
}

type Chart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_candles(chart: &mut Chart<'_, '_>, trace: &Trace, x_span: f64) -> Result<()> {
    let Trace::Candlestick {
        x,
        open,
        high,
        low,
        close,
        color: c,
        fill_opacity,
        period,
        ..
    } = trace
    else {
        return Ok(());
    };

    let plot_width = chart.plotting_area().dim_in_pixel().0 as f64;
    let body_px = ((period / x_span) * plot_width * CANDLE_BODY).max(1.0) as u32;
    let rgb = color(*c);
    let fill = ShapeStyle {
        color: rgb.mix(*fill_opacity),
        filled: true,
        stroke_width: 1,
    };
    let outline = rgb.stroke_width(1);

    let candles: Vec<_> = (0..x.len())
        .filter_map(|i| {
            Some((
                *x.get(i)?,
                *open.get(i)?,
                *high.get(i)?,
                *low.get(i)?,
                *close.get(i)?,
            ))
        })
        .collect();

    chart.draw_series(
        candles
            .iter()
            .map(|&(x, o, h, l, c)| CandleStick::new(x, o, h, l, c, fill, fill, body_px)),
    )?;
    chart.draw_series(
        candles
            .iter()
            .map(|&(x, o, h, l, c)| CandleStick::new(x, o, h, l, c, outline, outline, body_px)),
    )?;
    Ok(())
}

/// Contiguous runs of present points, with step shapes expanded
fn line_segments(x: &[f64], y: &[Option<f64>], shape: LineShape) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    for (xv, yv) in x.iter().zip(y) {
        match yv {
            Some(yv) if yv.is_finite() => {
                if shape == LineShape::StepHv {
                    if let Some(&(_, prev_y)) = current.last() {
                        current.push((*xv, prev_y));
                    }
                }
                current.push((*xv, *yv));
            }
            _ => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn draw_line(chart: &mut Chart<'_, '_>, trace: &Trace, legend: bool) -> Result<()> {
    let Trace::Line {
        name,
        x,
        y,
        color: c,
        width,
        shape,
        ..
    } = trace
    else {
        return Ok(());
    };

    let rgb = color(*c);
    let width = *width;
    for (i, segment) in line_segments(x, y, *shape).into_iter().enumerate() {
        let anno = chart.draw_series(LineSeries::new(segment, rgb.stroke_width(width)))?;
        if legend && i == 0 {
            anno.label(name.as_str()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], rgb.stroke_width(width))
            });
        }
    }
    Ok(())
}

fn draw_markers(
    chart: &mut Chart<'_, '_>,
    trace: &Trace,
    legend: bool,
    secondary: SecondaryMap,
) -> Result<()> {
    let Trace::Markers {
        name,
        x,
        y,
        color: c,
        size,
        symbol,
        secondary: on_secondary,
    } = trace
    else {
        return Ok(());
    };

    let rgb = color(*c);
    let size = *size as i32;
    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(_, v)| v.is_finite())
        .map(|(x, v)| {
            let v = if *on_secondary { secondary.apply(*v) } else { *v };
            (*x, v)
        })
        .collect();

    let anno = match symbol {
        MarkerSymbol::Circle => {
            let anno = chart.draw_series(
                points
                    .iter()
                    .map(|p| Circle::new(*p, size / 2, rgb.filled())),
            )?;
            if legend {
                anno.legend(move |(x, y)| Circle::new((x + 10, y), size / 2, rgb.filled()));
            }
            anno
        }
        MarkerSymbol::TriangleUp => {
            let anno = chart.draw_series(
                points
                    .iter()
                    .map(|p| TriangleMarker::new(*p, size / 2, rgb.filled())),
            )?;
            if legend {
                anno.legend(move |(x, y)| TriangleMarker::new((x + 10, y), size / 2, rgb.filled()));
            }
            anno
        }
        MarkerSymbol::TriangleDown => {
            let half = size / 2;
            let anno = chart.draw_series(points.iter().map(|p| {
                EmptyElement::at(*p)
                    + Polygon::new(vec![(-half, -half), (half, -half), (0, half)], rgb.filled())
            }))?;
            if legend {
                anno.legend(move |(x, y)| {
                    Polygon::new(
                        vec![(x + 10 - half, y - half), (x + 10 + half, y - half), (x + 10, y + half)],
                        rgb.filled(),
                    )
                });
            }
            anno
        }
    };
    if legend {
        anno.label(name.as_str());
    }
    Ok(())
}

/// Outline of one violin centered on `center`, scaled so the widest point is `half_width`
fn violin_outline(values: &[f64], center: f64, half_width: f64) -> Vec<(f64, f64)> {
    let density = kde(values, KDE_POINTS);
    let peak = density.iter().map(|(_, d)| *d).fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        return Vec::new();
    }
    let right = density
        .iter()
        .map(|(y, d)| (center + d / peak * half_width, *y));
    let left = density
        .iter()
        .rev()
        .map(|(y, d)| (center - d / peak * half_width, *y));
    right.chain(left).collect()
}

fn draw_violin(chart: &mut Chart<'_, '_>, trace: &Trace, legend: bool) -> Result<()> {
    let Trace::Violin {
        name,
        groups,
        color: c,
        fill_opacity,
        jitter,
        show_box,
        show_mean,
        show_points,
    } = trace
    else {
        return Ok(());
    };

    let rgb = color(*c);
    let fill = ShapeStyle {
        color: rgb.mix(*fill_opacity),
        filled: true,
        stroke_width: 1,
    };
    let mut rng = StdRng::seed_from_u64(JITTER_SEED);

    for (i, ViolinGroup { values, .. }) in groups.iter().enumerate() {
        if values.is_empty() {
            continue;
        }
        let center = i as f64;

        let outline = violin_outline(values, center, VIOLIN_HALF_WIDTH);
        if !outline.is_empty() {
            let anno = chart.draw_series(std::iter::once(Polygon::new(outline.clone(), fill)))?;
            if legend && i == 0 {
                anno.label(name.as_str())
                    .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], fill));
            }
            chart.draw_series(std::iter::once(PathElement::new(outline, rgb.stroke_width(1))))?;
        }

        if *show_box {
            if let Some((q1, median, q3)) = quartiles(values) {
                let w = VIOLIN_HALF_WIDTH / 4.0;
                chart.draw_series(std::iter::once(Rectangle::new(
                    [(center - w, q1), (center + w, q3)],
                    WHITE.mix(0.8).filled(),
                )))?;
                chart.draw_series(std::iter::once(Rectangle::new(
                    [(center - w, q1), (center + w, q3)],
                    rgb.stroke_width(1),
                )))?;
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(center - w, median), (center + w, median)],
                    rgb.stroke_width(2),
                )))?;
            }
        }

        if *show_mean {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let w = VIOLIN_HALF_WIDTH * 0.75;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(center - w, mean), (center + w, mean)],
                BLACK.stroke_width(1),
            )))?;
        }

        if *show_points {
            let spread = jitter * VIOLIN_HALF_WIDTH;
            let points: Vec<(f64, f64)> = values
                .iter()
                .map(|v| {
                    let dx = if spread > 0.0 {
                        rng.random_range(-spread..=spread)
                    } else {
                        0.0
                    };
                    (center + dx, *v)
                })
                .collect();
            chart.draw_series(
                points
                    .into_iter()
                    .map(|p| Circle::new(p, 2, rgb.mix(0.5).filled())),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_segments_split_on_gaps() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [Some(1.0), Some(2.0), None, Some(3.0), Some(0.0)];

        let linear = line_segments(&x, &y, LineShape::Linear);
        assert_eq!(linear, vec![vec![(0.0, 1.0), (1.0, 2.0)], vec![(3.0, 3.0), (4.0, 0.0)]]);

        let step = line_segments(&x, &y, LineShape::StepHv);
        assert_eq!(step[0], vec![(0.0, 1.0), (1.0, 1.0), (1.0, 2.0)]);
        assert_eq!(step[1], vec![(3.0, 3.0), (4.0, 3.0), (4.0, 0.0)]);
    }

    #[test]
    fn test_tick_labels() {
        let rps = Axis::linear("RPS").with_suffix(" Hz");
        assert_eq!(tick_label(&rps, 20.0), "20 Hz");
        assert_eq!(tick_label(&rps, 2.5), "2.5 Hz");

        let runs = Axis::new(
            "Run",
            AxisKind::Category {
                labels: vec!["WVA".into(), "HPA".into()],
            },
        );
        assert_eq!(tick_label(&runs, 1.0), "HPA");
        assert_eq!(tick_label(&runs, 0.5), "");
        assert_eq!(tick_label(&runs, 7.0), "");

        let time = Axis::time("Time");
        assert_eq!(tick_label(&time, 3_600.0 * 10.0 + 60.0 * 5.0), "10:05");
    }

    #[test]
    fn test_axis_range_handles_flat_data() {
        let axis = Axis::linear("y");
        let (lo, hi) = axis_range(&axis, Some((2.0, 2.0)), false);
        assert_relative_eq!(lo, 1.8);
        assert_relative_eq!(hi, 2.2);
        assert_eq!(axis_range(&axis, None, false), (0.0, 1.0));
        assert_eq!(axis_range(&axis.with_min(0.0), Some((5.0, 15.0)), true).0, 0.0);
    }

    #[test]
    fn test_single_instant_time_axis() {
        let instant = 1_700_000_000.0;
        let (lo, hi) = axis_range(&Axis::time("Time"), Some((instant, instant)), false);
        assert_eq!(lo, instant - 60.0);
        assert_eq!(hi, instant + 60.0);
    }

    #[test]
    fn test_secondary_map() {
        let map = SecondaryMap {
            from: (0.0, 10.0),
            to: (100.0, 200.0),
        };
        assert_eq!(map.apply(5.0), 150.0);
    }
}
