//! Side-by-side comparison figures for one analyzed group.
//!
//! One panel per label view over the same 2D embedding: ground-truth injury
//! subtypes first, then remapped subject identities, then one panel per
//! clustering result. Drawing is generic over the `plotters` backend so the
//! same figure renders to an SVG string and to a PNG file.

use crate::analysis::PipelineResult;
use crate::cmap::{ColorMap, rank_labels};
use crate::config::RunConfig;
use crate::data::EvaluationGroup;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

const PANEL_WIDTH: u32 = 320;
const FIGURE_HEIGHT: u32 = 380;
const POINT_SIZE: i32 = 3;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("figure rendering failed: {0}")]
    Backend(String),
}

fn backend_err(error: impl Display) -> RenderError {
    RenderError::Backend(error.to_string())
}

/// The figure pixel size for a result with the given number of clusterings.
pub fn figure_size(result: &PipelineResult) -> (u32, u32) {
    let panels = 2 + result.clusterings.len() as u32;
    (PANEL_WIDTH * panels, FIGURE_HEIGHT)
}

/// Renders the comparison figure into an SVG document held in memory.
pub fn render_figure_svg(
    group: &EvaluationGroup,
    result: &PipelineResult,
    config: &RunConfig,
) -> Result<String, RenderError> {
    let mut document = String::new();
    {
        let root = SVGBackend::with_string(&mut document, figure_size(result)).into_drawing_area();
        draw_figure(&root, group, result, config)?;
        root.present().map_err(backend_err)?;
    }
    Ok(document)
}

/// Renders the comparison figure into a PNG file at `path`.
pub fn render_figure_png(
    path: &Path,
    group: &EvaluationGroup,
    result: &PipelineResult,
    config: &RunConfig,
) -> Result<(), RenderError> {
    let root = BitMapBackend::new(path, figure_size(result)).into_drawing_area();
    draw_figure(&root, group, result, config)?;
    root.present().map_err(backend_err)
}

struct Panel {
    colors: Vec<RGBColor>,
    x_label: String,
    y_label: String,
}

fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    group: &EvaluationGroup,
    result: &PipelineResult,
    config: &RunConfig,
) -> Result<(), RenderError> {
    root.fill(&WHITE).map_err(backend_err)?;
    let title = format!(
        "Relevance Clusters; data: {}, model: {}, fold: {}, {} labels: group {}",
        config.data_description(),
        config.model,
        config.fold,
        config.analysis_groups,
        group.label
    );
    let titled = root.titled(&title, ("sans-serif", 16)).map_err(backend_err)?;

    let panels = build_panels(group, result, config);
    let areas = titled.split_evenly((1, panels.len()));
    for (area, panel) in areas.iter().zip(&panels) {
        draw_panel(area, panel, &result.embedding)?;
    }
    Ok(())
}

fn build_panels(
    group: &EvaluationGroup,
    result: &PipelineResult,
    config: &RunConfig,
) -> Vec<Panel> {
    let injury = group.injury_classes();
    let injury_distinct: BTreeSet<usize> = injury.iter().copied().collect();
    let injury_values: Vec<f64> = injury.iter().map(|&v| v as f64).collect();

    // Subject identifiers are sparse; remap them to consecutive ranks so few-
    // color maps stay readable. A capacity overflow is logged, not fatal.
    let (subject_ranks, subject_distinct) = rank_labels(&group.subject_classes());
    config.cmap_subject.check_capacity(subject_distinct);
    // Subject hues sample the map at rank/count, so the top of the ramp is
    // never handed out.
    let subject_colors = subject_ranks
        .iter()
        .map(|&rank| {
            config
                .cmap_subject
                .color_at(rank as f64 / subject_distinct as f64)
        })
        .collect();

    let mut panels = vec![
        Panel {
            colors: range_colors(config.cmap_injury, &injury_values),
            x_label: format!("{} GT injury labels", injury_distinct.len()),
            y_label: format!("n={} samples", group.len()),
        },
        Panel {
            colors: subject_colors,
            x_label: format!("{subject_distinct} GT subject labels"),
            y_label: String::new(),
        },
    ];
    for labels in &result.clusterings {
        let distinct: BTreeSet<usize> = labels.iter().copied().collect();
        let values: Vec<f64> = labels.iter().map(|&v| v as f64).collect();
        panels.push(Panel {
            colors: range_colors(config.cmap_clustering, &values),
            x_label: format!("k={} SpRAy clusters", distinct.len()),
            y_label: String::new(),
        });
    }
    panels
}

fn range_colors(map: ColorMap, values: &[f64]) -> Vec<RGBColor> {
    let (vmin, vmax) = value_range(values);
    values
        .iter()
        .map(|&value| map.scatter_color(value, vmin, vmax))
        .collect()
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    embedding: &ndarray::Array2<f64>,
) -> Result<(), RenderError> {
    let (x_range, y_range) = padded_ranges(embedding);
    let mut chart = ChartBuilder::on(area)
        .margin(8)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(x_range, y_range)
        .map_err(backend_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_labels(0)
        .x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .draw()
        .map_err(backend_err)?;

    chart
        .draw_series(
            embedding
                .rows()
                .into_iter()
                .zip(&panel.colors)
                .map(|(point, color)| {
                    Circle::new((point[0], point[1]), POINT_SIZE, color.filled())
                }),
        )
        .map_err(backend_err)?;
    Ok(())
}

/// Axis ranges covering the embedding with a 5% margin. Degenerate or empty
/// extents fall back to a small symmetric window.
fn padded_ranges(embedding: &ndarray::Array2<f64>) -> (Range<f64>, Range<f64>) {
    let column_range = |column: usize| {
        let mut low = f64::INFINITY;
        let mut high = f64::NEG_INFINITY;
        if embedding.ncols() > column {
            for &value in embedding.column(column) {
                low = low.min(value);
                high = high.max(value);
            }
        }
        if !low.is_finite() || !high.is_finite() {
            low = 0.0;
            high = 0.0;
        }
        let pad = ((high - low) * 0.05).max(1e-3);
        (low - pad)..(high + pad)
    };
    (column_range(0), column_range(1))
}

fn value_range(values: &[f64]) -> (f64, f64) {
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    for &value in values {
        low = low.min(value);
        high = high.max(value);
    }
    if low.is_finite() && high.is_finite() {
        (low, high)
    } else {
        (0.0, 0.0)
    }
}
