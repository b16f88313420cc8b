//! Side-by-side composition of figures.

use perfscope_core::{PerfError, PerfResult};

use crate::figure::Figure;

/// Lay out named figures in one row, in the given order.
///
/// Each figure contributes its panels. Only panels of the figure at the
/// 1-based `legend_master` position show a legend. Every panel's x axis is
/// titled with its figure's name when it had a title. With `shared_y` all
/// panels use one primary y range and only the first keeps its y title.
pub fn figures_to_single_row(
    figures: Vec<(String, Figure)>,
    shared_y: bool,
    legend_master: usize,
) -> PerfResult<Figure> {
    if figures.is_empty() {
        return Err(PerfError::validation("No figures to combine"));
    }

    let mut panels = Vec::new();
    for (position, (name, figure)) in figures.into_iter().enumerate() {
        let column = position + 1;
        for mut panel in figure.panels {
            panel.title.clear();
            panel.show_legend = column == legend_master;
            if !panel.x_axis.title.is_empty() {
                panel.x_axis.title = name.clone();
            }
            if shared_y && column != 1 {
                panel.y_axis.title.clear();
            }
            panels.push(panel);
        }
    }

    Ok(Figure {
        title: String::new(),
        panels,
        shared_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::{Axis, Panel};

    fn figure(title: &str, x_title: &str) -> Figure {
        Figure::single(title, Panel::new(title, Axis::time(x_title), Axis::linear("ITL (ms)")))
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(figures_to_single_row(Vec::new(), true, 1).is_err());
    }

    #[test]
    fn test_titles_and_legend() {
        let combined = figures_to_single_row(
            vec![
                ("WVA".to_string(), figure("ITL - WVA", "Time")),
                ("HPA".to_string(), figure("ITL - HPA", "")),
                ("KEDA".to_string(), figure("ITL - KEDA", "Time")),
            ],
            true,
            2,
        )
        .unwrap();

        assert!(combined.shared_y);
        let panels = &combined.panels;
        assert_eq!(panels.len(), 3);
        assert_eq!(panels[0].x_axis.title, "WVA");
        assert_eq!(panels[1].x_axis.title, "");
        assert_eq!(panels[2].x_axis.title, "KEDA");
        assert_eq!(panels[0].y_axis.title, "ITL (ms)");
        assert_eq!(panels[2].y_axis.title, "");
        let legends: Vec<bool> = panels.iter().map(|p| p.show_legend).collect();
        assert_eq!(legends, vec![false, true, false]);
    }

    #[test]
    fn test_unshared_keeps_y_titles() {
        let combined = figures_to_single_row(
            vec![
                ("a".to_string(), figure("a", "Time")),
                ("b".to_string(), figure("b", "Time")),
            ],
            false,
            1,
        )
        .unwrap();
        assert_eq!(combined.panels[1].y_axis.title, "ITL (ms)");
    }
}
