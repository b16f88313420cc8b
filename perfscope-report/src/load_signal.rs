//! Illustration of a stepped benchmark load profile.

use perfscope_core::Palette;

use crate::figure::{Axis, Figure, LineShape, Panel, Trace};

/// Parameters of [`plot_load_signal_static`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSignal {
    pub rps_per_instance: f64,
    /// Instance count of each step
    pub instances_over_time: Vec<u32>,
    /// Step length in minutes
    pub time_step: f64,
    /// Reverse the profile to show a ramp down
    pub scale_up: bool,
}

impl Default for LoadSignal {
    fn default() -> Self {
        Self {
            rps_per_instance: 1.5,
            instances_over_time: (0..=8).collect(),
            time_step: 5.0,
            scale_up: true,
        }
    }
}

impl LoadSignal {
    /// `(minutes, rps)` points; the last two steps are idle
    pub fn points(&self) -> Vec<(f64, f64)> {
        let mut y: Vec<f64> = self
            .instances_over_time
            .iter()
            .map(|n| f64::from(*n) * self.rps_per_instance)
            .collect();
        let len = y.len();
        for value in y.iter_mut().skip(len.saturating_sub(2)) {
            *value = 0.0;
        }
        if !self.scale_up {
            y.reverse();
        }
        y.into_iter()
            .enumerate()
            .map(|(i, y)| (-self.time_step + i as f64 * self.time_step, y))
            .collect()
    }
}

/// Step line of requests per second over time
pub fn plot_load_signal_static(signal: &LoadSignal, palette: &Palette) -> Figure {
    let (x, y): (Vec<f64>, Vec<Option<f64>>) =
        signal.points().into_iter().map(|(x, y)| (x, Some(y))).unzip();

    let mut panel = Panel::new(
        "",
        Axis::linear("Time (minutes)"),
        Axis::linear("RPS").with_suffix(" Hz"),
    );
    panel.show_legend = false;
    panel.traces.push(Trace::Line {
        name: "RPS".to_string(),
        x,
        y,
        color: palette.distribution,
        width: 2,
        shape: LineShape::StepHv,
        show_legend: false,
    });
    Figure::single("Load Signal", panel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ramp_up() {
        let points = LoadSignal::default().points();
        assert_eq!(points.len(), 9);
        assert_eq!(points[0], (-5.0, 0.0));
        assert_eq!(points[1], (0.0, 1.5));
        assert_eq!(points[6], (25.0, 9.0));
        // Last two steps are idle
        assert_eq!(points[7], (30.0, 0.0));
        assert_eq!(points[8], (35.0, 0.0));
    }

    #[test]
    fn test_ramp_down_reverses_values_only() {
        let signal = LoadSignal {
            rps_per_instance: 2.0,
            instances_over_time: vec![1, 2, 3, 4],
            time_step: 1.0,
            scale_up: false,
        };
        let points = signal.points();
        assert_eq!(points, vec![(-1.0, 0.0), (0.0, 0.0), (1.0, 4.0), (2.0, 2.0)]);
    }

    #[test]
    fn test_short_profiles_are_all_idle() {
        let signal = LoadSignal {
            instances_over_time: vec![3],
            ..Default::default()
        };
        assert_eq!(signal.points(), vec![(-5.0, 0.0)]);
    }

    #[test]
    fn test_figure_axes() {
        let figure = plot_load_signal_static(&LoadSignal::default(), &Palette::default());
        let panel = &figure.panels[0];
        assert_eq!(panel.x_axis.title, "Time (minutes)");
        assert_eq!(panel.y_axis.tick_suffix, " Hz");
        assert!(matches!(
            panel.traces[0],
            Trace::Line { shape: LineShape::StepHv, .. }
        ));
    }
}
