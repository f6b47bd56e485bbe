//! Chart rendering for research dossiers and slides, drawn with plotters
//! onto its SVG backend so no system fonts are needed.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_svg::SVGBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const SIZE: (u32, u32) = (800, 450);
pub const DEFAULT_PALETTE: [&str; 5] = ["#2563EB", "#F59E0B", "#10B981", "#EF4444", "#8B5CF6"];

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Pie,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default, alias = "type", alias = "chart_type")]
    pub kind: ChartKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, alias = "data")]
    pub values: Vec<f64>,
    /// Second line series drawn over a line chart (trendlines).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Vec<f64>>,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_points(mut self, labels: Vec<String>, values: Vec<f64>) -> Self {
        self.labels = labels;
        self.values = values;
        self
    }

    pub fn with_overlay(mut self, overlay: Vec<f64>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn is_renderable(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }

    fn label(&self, idx: usize) -> String {
        self.labels.get(idx).cloned().unwrap_or_default()
    }
}

pub trait ChartRenderer: Send + Sync {
    /// Render `spec` into `path`, colored from `palette` (falls back to the
    /// default palette when empty).
    fn render(&self, spec: &ChartSpec, palette: &[String], path: &Path) -> Result<PathBuf>;
}

pub struct SvgCharts;

impl ChartRenderer for SvgCharts {
    fn render(&self, spec: &ChartSpec, palette: &[String], path: &Path) -> Result<PathBuf> {
        let svg = render_svg(spec, palette)?;
        std::fs::write(path, svg)?;
        Ok(path.to_path_buf())
    }
}

fn chart_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
    Error::backend("plotters", err)
}

/// `#RRGGBB` to a plotters color.
pub fn hex_color(hex: &str) -> Option<RGBColor> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let channel = |at: usize| u8::from_str_radix(hex.get(at..at + 2)?, 16).ok();
    Some(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

fn colors(palette: &[String]) -> Vec<RGBColor> {
    let parsed: Vec<RGBColor> = palette.iter().filter_map(|c| hex_color(c)).collect();
    if parsed.is_empty() {
        DEFAULT_PALETTE.iter().filter_map(|c| hex_color(c)).collect()
    } else {
        parsed
    }
}

/// Value range that always includes zero and never collapses.
fn value_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(0.0_f64, f64::min);
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if (max - min).abs() < f64::EPSILON {
        (min, min + 1.0)
    } else {
        let pad = (max - min) * 0.1;
        (if min < 0.0 { min - pad } else { min }, max + pad)
    }
}

pub fn render_svg(spec: &ChartSpec, palette: &[String]) -> Result<String> {
    if !spec.is_renderable() {
        return Err(Error::InvalidInput(format!(
            "chart '{}' has no finite values",
            spec.title
        )));
    }
    let colors = colors(palette);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        match spec.kind {
            ChartKind::Bar => bar_chart(&root, spec, &colors)?,
            ChartKind::Line => line_chart(&root, spec, &colors)?,
            ChartKind::Pie => pie_chart(&root, spec, &colors)?,
        }
        root.present().map_err(chart_err)?;
    }
    Ok(svg)
}

fn bar_chart(root: &Area<'_>, spec: &ChartSpec, colors: &[RGBColor]) -> Result<()> {
    let (min, max) = value_range(&spec.values);
    let count = spec.values.len();
    let mut chart = ChartBuilder::on(root)
        .caption(&spec.title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d((0..count).into_segmented(), min..max)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(count)
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(idx) => spec.label(*idx),
            _ => String::new(),
        })
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(spec.values.iter().enumerate().map(|(idx, value)| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(idx), 0.0), (SegmentValue::Exact(idx + 1), *value)],
                colors[idx % colors.len()].filled(),
            );
            bar.set_margin(0, 0, 8, 8);
            bar
        }))
        .map_err(chart_err)?;
    Ok(())
}

fn line_chart(root: &Area<'_>, spec: &ChartSpec, colors: &[RGBColor]) -> Result<()> {
    let overlay = spec.overlay.as_deref().unwrap_or_default();
    let mut all = spec.values.clone();
    all.extend(overlay.iter().copied().filter(|v| v.is_finite()));
    let (min, max) = value_range(&all);
    let last = spec.values.len().max(overlay.len()).saturating_sub(1).max(1);

    let mut chart = ChartBuilder::on(root)
        .caption(&spec.title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..last, min..max)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_labels(6)
        .x_label_formatter(&|idx| spec.label(*idx))
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            spec.values.iter().enumerate().map(|(idx, v)| (idx, *v)),
            colors[0].stroke_width(2),
        ))
        .map_err(chart_err)?;
    if !overlay.is_empty() {
        chart
            .draw_series(LineSeries::new(
                overlay
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.is_finite())
                    .map(|(idx, v)| (idx, *v)),
                colors[1 % colors.len()].stroke_width(2),
            ))
            .map_err(chart_err)?;
    }
    Ok(())
}

/// Wedge outline from `start` to `end` radians, one vertex per degree.
fn wedge(center: (i32, i32), radius: f64, start: f64, end: f64) -> Vec<(i32, i32)> {
    let steps = (((end - start).to_degrees()).ceil() as usize).max(1);
    let mut points = vec![center];
    points.extend((0..=steps).map(|step| {
        let angle = start + (end - start) * step as f64 / steps as f64;
        (
            center.0 + (radius * angle.cos()).round() as i32,
            center.1 + (radius * angle.sin()).round() as i32,
        )
    }));
    points
}

fn pie_chart(root: &Area<'_>, spec: &ChartSpec, colors: &[RGBColor]) -> Result<()> {
    let area = root.titled(&spec.title, ("sans-serif", 20)).map_err(chart_err)?;
    let center = (280, 200);
    let radius = 150.0;
    let total: f64 = spec.values.iter().filter(|v| **v > 0.0).sum();
    if total <= 0.0 {
        area.draw(&Circle::new(center, radius as i32, RGBColor(0xE5, 0xE7, 0xEB).filled()))
            .map_err(chart_err)?;
        return Ok(());
    }

    let mut angle = -std::f64::consts::FRAC_PI_2;
    for (row, (idx, value)) in spec.values.iter().enumerate().filter(|(_, v)| **v > 0.0).enumerate() {
        let share = value / total;
        let color = colors[idx % colors.len()];
        let end = angle + share * std::f64::consts::TAU;
        area.draw(&Polygon::new(wedge(center, radius, angle, end), color.filled()))
            .map_err(chart_err)?;
        angle = end;

        let y = 60 + 24 * row as i32;
        area.draw(&Rectangle::new([(520, y), (534, y + 14)], color.filled()))
            .map_err(chart_err)?;
        area.draw(&Text::new(
            format!("{} ({:.0}%)", spec.label(idx), share * 100.0),
            (542, y),
            ("sans-serif", 13).into_font().color(&BLACK),
        ))
        .map_err(chart_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_chart_uses_palette_and_labels() {
        let spec = ChartSpec::new(ChartKind::Bar, "Costs and fees")
            .with_points(vec!["Rent".into(), "Staff".into()], vec![10.0, 20.0]);
        let svg = render_svg(&spec, &["#112233".to_string()]).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Costs and fees"));
        assert!(svg.contains("Rent"));
        assert!(svg.contains("Staff"));
        assert!(svg.matches("#112233").count() >= 2);
    }

    #[test]
    fn line_chart_draws_overlay() {
        let spec = ChartSpec::new(ChartKind::Line, "Interest")
            .with_points(vec!["a".into(), "b".into(), "c".into()], vec![1.0, 3.0, 2.0])
            .with_overlay(vec![1.5, 2.0, 2.5]);
        let svg = render_svg(&spec, &["#AA0000".to_string(), "#00AA00".to_string()]).unwrap();
        assert!(svg.contains("<polyline"));
        assert!(svg.contains("#AA0000"));
        assert!(svg.contains("#00AA00"));
    }

    #[test]
    fn pie_and_empty_specs() {
        let pie = ChartSpec::new(ChartKind::Pie, "Split")
            .with_points(vec!["x".into(), "y".into()], vec![1.0, 3.0]);
        let svg = render_svg(&pie, &[]).unwrap();
        assert!(svg.contains("y (75%)"));
        assert!(svg.contains("<polygon"));
        assert!(render_svg(&ChartSpec::new(ChartKind::Bar, "empty"), &[]).is_err());
    }

    #[test]
    fn palette_parsing_falls_back_to_defaults() {
        assert_eq!(hex_color("#10b981"), Some(RGBColor(0x10, 0xB9, 0x81)));
        assert_eq!(hex_color("blue"), None);
        assert_eq!(colors(&["nope".to_string()]).len(), DEFAULT_PALETTE.len());
        let (min, max) = value_range(&[-10.0, 10.0]);
        assert!(min < -10.0 && max > 10.0);
    }

    #[test]
    fn visualization_data_shape_deserializes() {
        let spec: ChartSpec = serde_json::from_value(serde_json::json!({
            "type": "pie", "title": "Use of funds", "labels": ["R&D"], "data": [60.0]
        }))
        .unwrap();
        assert_eq!(spec.kind, ChartKind::Pie);
        assert_eq!(spec.values, vec![60.0]);
    }

    #[test]
    fn renderer_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.svg");
        let spec = ChartSpec::new(ChartKind::Bar, "t").with_points(vec![], vec![1.0]);
        SvgCharts.render(&spec, &[], &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("<rect"));
    }
}
