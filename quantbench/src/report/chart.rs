// Copyright (c) 2025 Pratik Barhate
// Licensed under the MIT License. See the LICENSE file in the project root for more information.

//! SVG bar charts for comparing metrics across model variants.

use crate::error::{Error, Result};
use std::fmt::Write;
use std::path::Path;
use tracing::info;

/// Bar width in category units; series `i` is shifted right by `i * BAR_WIDTH`.
pub const BAR_WIDTH: f64 = 0.35;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 100.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";
const PALETTE: [&str; 6] = [
    "#3498db", "#2ecc71", "#e74c3c", "#9b59b6", "#f39c12", "#1abc9c",
];

#[derive(Clone, Debug, PartialEq)]
pub enum BarSeries {
    /// One value per category.
    Single(Vec<f64>),
    /// One row of values per series, drawn side by side.
    Grouped {
        values: Vec<Vec<f64>>,
        legend: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct BarChart {
    pub categories: Vec<String>,
    pub series: BarSeries,
    pub x_label: String,
    pub y_label: String,
    pub title: String,
}

/// Placement of one bar, in category units along x.
#[derive(Clone, Debug, PartialEq)]
pub struct Bar {
    pub category: usize,
    pub series: usize,
    pub center: f64,
    pub value: f64,
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

impl BarChart {
    fn rows(&self) -> Vec<&[f64]> {
        match &self.series {
            BarSeries::Single(values) => vec![values.as_slice()],
            BarSeries::Grouped { values, .. } => values.iter().map(|v| v.as_slice()).collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(Error::InvalidInput("chart has no categories".into()));
        }
        let rows = self.rows();
        if rows.is_empty() {
            return Err(Error::InvalidInput("chart has no series".into()));
        }
        for row in &rows {
            if row.len() != self.categories.len() {
                return Err(Error::InvalidInput(format!(
                    "series has {} values for {} categories",
                    row.len(),
                    self.categories.len()
                )));
            }
        }
        if let BarSeries::Grouped { legend, .. } = &self.series {
            if legend.len() != rows.len() {
                return Err(Error::InvalidInput(format!(
                    "{} legend labels for {} series",
                    legend.len(),
                    rows.len()
                )));
            }
        }
        Ok(())
    }

    /// Every bar, grouped by category and ordered by series within a group.
    pub fn bars(&self) -> Result<Vec<Bar>> {
        self.validate()?;
        let rows = self.rows();
        let mut bars = Vec::with_capacity(rows.len() * self.categories.len());
        for category in 0..self.categories.len() {
            for (series, row) in rows.iter().enumerate() {
                bars.push(Bar {
                    category,
                    series,
                    center: category as f64 + series as f64 * BAR_WIDTH,
                    value: row[category],
                });
            }
        }
        Ok(bars)
    }

    /// Tick position under each category, centred on its group of bars.
    pub fn ticks(&self) -> Result<Vec<f64>> {
        self.validate()?;
        let offset = (self.rows().len() - 1) as f64 * BAR_WIDTH / 2.0;
        Ok((0..self.categories.len())
            .map(|c| c as f64 + offset)
            .collect())
    }

    /// Renders the chart as a standalone SVG document.
    pub fn render_svg(&self) -> Result<String> {
        let bars = self.bars()?;
        let ticks = self.ticks()?;
        let series_count = self.rows().len();

        let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        let x_min = -BAR_WIDTH;
        let x_max = (self.categories.len() - 1) as f64 + series_count as f64 * BAR_WIDTH;
        let y_min = bars.iter().map(|b| b.value).fold(0f64, f64::min);
        let mut y_max = bars.iter().map(|b| b.value).fold(0f64, f64::max) * 1.1;
        if y_max <= y_min {
            y_max = y_min + 1.0;
        }
        let px = |u: f64| MARGIN_LEFT + (u - x_min) / (x_max - x_min) * plot_width;
        let py = |v: f64| MARGIN_TOP + plot_height - (v - y_min) / (y_max - y_min) * plot_height;
        let unit = plot_width / (x_max - x_min);

        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"#,
            w = CHART_WIDTH,
            h = CHART_HEIGHT
        );
        let _ = write!(
            svg,
            r#"<rect width="{}" height="{}" fill="white"/>"#,
            CHART_WIDTH, CHART_HEIGHT
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
            CHART_WIDTH / 2.0,
            COLOR_TEXT,
            escape_xml(&self.title)
        );

        for i in 0..=5 {
            let value = y_min + (i as f64 / 5.0) * (y_max - y_min);
            let y = py(value);
            let _ = write!(
                svg,
                r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
                MARGIN_LEFT,
                y,
                MARGIN_LEFT + plot_width,
                y,
                COLOR_GRID
            );
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.2}</text>"#,
                MARGIN_LEFT - 10.0,
                y + 4.0,
                COLOR_TEXT,
                value
            );
        }

        let baseline = py(0.0);
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
            MARGIN_LEFT,
            baseline,
            MARGIN_LEFT + plot_width,
            baseline,
            COLOR_AXIS
        );
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
            MARGIN_LEFT,
            MARGIN_TOP,
            MARGIN_LEFT,
            MARGIN_TOP + plot_height,
            COLOR_AXIS
        );

        for bar in &bars {
            let top = py(bar.value.max(0.0));
            let height = (py(bar.value.min(0.0)) - top).abs();
            let _ = write!(
                svg,
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                px(bar.center - BAR_WIDTH / 2.0),
                top,
                BAR_WIDTH * unit,
                height,
                PALETTE[bar.series % PALETTE.len()]
            );
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
                px(bar.center),
                top - 5.0,
                COLOR_TEXT,
                bar.value
            );
        }

        for (tick, category) in ticks.iter().zip(&self.categories) {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
                px(*tick),
                MARGIN_TOP + plot_height + 20.0,
                COLOR_TEXT,
                escape_xml(category)
            );
        }

        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
            MARGIN_LEFT + plot_width / 2.0,
            MARGIN_TOP + plot_height + 50.0,
            COLOR_TEXT,
            escape_xml(&self.x_label)
        );
        let _ = write!(
            svg,
            r#"<text x="20" y="{y}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {y})">{}</text>"#,
            COLOR_TEXT,
            escape_xml(&self.y_label),
            y = CHART_HEIGHT / 2.0
        );

        if let BarSeries::Grouped { legend, .. } = &self.series {
            let mut legend_x = MARGIN_LEFT;
            for (i, label) in legend.iter().enumerate() {
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/>"#,
                    legend_x,
                    CHART_HEIGHT - 30.0,
                    PALETTE[i % PALETTE.len()]
                );
                let _ = write!(
                    svg,
                    r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
                    legend_x + 18.0,
                    CHART_HEIGHT - 20.0,
                    COLOR_TEXT,
                    escape_xml(label)
                );
                legend_x += 140.0;
            }
        }

        svg.push_str("</svg>");
        Ok(svg)
    }

    /// Writes the rendered chart to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render_svg()?)?;
        info!("Chart :: wrote '{}' to {}", self.title, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped() -> BarChart {
        BarChart {
            categories: vec!["base".into(), "sim".into(), "quant".into()],
            series: BarSeries::Grouped {
                values: vec![vec![91.5, 91.5, 90.75], vec![2.5, 2.5, 0.75]],
                legend: vec!["accuracy".into(), "size (MB)".into()],
            },
            x_label: "model".into(),
            y_label: "value".into(),
            title: "Accuracy & size".into(),
        }
    }

    #[test]
    fn test_grouped_bar_offsets() {
        let bars = grouped().bars().unwrap();
        assert_eq!(bars.len(), 6);
        assert_eq!(bars[0].center, 0.0);
        assert_eq!(bars[1].center, BAR_WIDTH);
        assert_eq!(bars[2].center, 1.0);
        assert_eq!(bars[3].center, 1.0 + BAR_WIDTH);
        assert_eq!((bars[5].category, bars[5].series), (2, 1));
        assert_eq!(bars[5].value, 0.75);
    }

    #[test]
    fn test_ticks_are_centred() {
        let ticks = grouped().ticks().unwrap();
        for (tick, expected) in ticks.iter().zip([0.175, 1.175, 2.175]) {
            assert!((tick - expected).abs() < 1e-12);
        }

        let single = BarChart {
            series: BarSeries::Single(vec![1.0, 2.0, 3.0]),
            ..grouped()
        };
        assert_eq!(single.ticks().unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_svg_has_annotations_and_legend() {
        let svg = grouped().render_svg().unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<rect").count(), 1 + 6 + 2);
        assert!(svg.contains(">91.5</text>"));
        assert!(svg.contains(">0.75</text>"));
        assert!(svg.contains(">size (MB)</text>"));
        assert!(svg.contains("Accuracy &amp; size"));
    }

    #[test]
    fn test_single_series_has_no_legend() {
        let chart = BarChart {
            series: BarSeries::Single(vec![3.0, 0.0, 1.5]),
            ..grouped()
        };
        let svg = chart.render_svg().unwrap();
        assert_eq!(svg.matches("<rect").count(), 1 + 3);
        assert!(!svg.contains("accuracy"));
    }

    #[test]
    fn test_length_mismatches() {
        let short = BarChart {
            series: BarSeries::Single(vec![1.0]),
            ..grouped()
        };
        assert!(matches!(short.render_svg(), Err(Error::InvalidInput(_))));

        let missing_legend = BarChart {
            series: BarSeries::Grouped {
                values: vec![vec![1.0, 2.0, 3.0]],
                legend: vec![],
            },
            ..grouped()
        };
        assert!(matches!(missing_legend.bars(), Err(Error::InvalidInput(_))));

        let empty = BarChart {
            categories: vec![],
            series: BarSeries::Single(vec![]),
            ..grouped()
        };
        assert!(matches!(empty.ticks(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_all_zero_values_render() {
        let chart = BarChart {
            series: BarSeries::Single(vec![0.0, 0.0, 0.0]),
            ..grouped()
        };
        let svg = chart.render_svg().unwrap();
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.svg");
        grouped().save(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            grouped().render_svg().unwrap()
        );
    }
}
