//! Styled comparison tables as standalone HTML.

use perfscope_core::style::{
    add_metric_separators, format_per_metric_colormap, format_per_run_color, format_with_units,
    SeparatorStyle, DELTA_CAP,
};
use perfscope_core::{MetricColormaps, Palette, RunTable, StyledTable, TableFormat};
use serde::{Deserialize, Serialize};

/// How table cells are colored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePolicy {
    /// Diverging gradient per column
    #[default]
    Diverging,
    /// One colormap per metric on the delta columns
    PerMetric,
    /// One color per run on the delta columns
    PerRun,
}

impl std::str::FromStr for StylePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diverging" => Ok(StylePolicy::Diverging),
            "per-metric" | "per_metric" => Ok(StylePolicy::PerMetric),
            "per-run" | "per_run" => Ok(StylePolicy::PerRun),
            other => Err(format!("Unknown style policy: {}", other)),
        }
    }
}

/// Apply a coloring policy plus metric separators
pub fn style_table(
    table: &RunTable,
    policy: StylePolicy,
    format: &TableFormat,
    palette: &Palette,
    colormaps: &MetricColormaps,
) -> StyledTable {
    let styled = match policy {
        StylePolicy::Diverging => format_with_units(table, format),
        StylePolicy::PerMetric => format_per_metric_colormap(table, format, colormaps),
        StylePolicy::PerRun => format_per_run_color(table, format, palette, DELTA_CAP),
    };
    add_metric_separators(styled, &SeparatorStyle::default())
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a styled table as a complete HTML document
pub fn to_html(table: &StyledTable, title: &str) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", html_escape(title)));
    out.push_str("<style>\n");
    out.push_str("table {border-collapse: collapse; font-family: sans-serif;}\n");
    out.push_str("th, td {padding: 4px 8px; text-align: right;}\n");
    for (selector, declarations) in &table.table_styles {
        out.push_str(&format!("{} {{{}}}\n", selector, declarations));
    }
    out.push_str("</style>\n</head>\n<body>\n<table>\n<thead>\n<tr>\n");
    for header in &table.headers {
        out.push_str(&format!("<th>{}</th>\n", html_escape(header)));
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in &table.rows {
        out.push_str("<tr>\n");
        for cell in row {
            if cell.css.is_empty() {
                out.push_str(&format!("<td>{}</td>\n", html_escape(&cell.text)));
            } else {
                out.push_str(&format!(
                    "<td style=\"{}\">{}</td>\n",
                    html_escape(&cell.css),
                    html_escape(&cell.text)
                ));
            }
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    out
}
