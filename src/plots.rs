// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! PNG charts for evaluation reports
//!
//! Text is rendered with a TrueType font located at runtime and registered as
//! `sans-serif`. The lookup order is an explicit path, then `BIOMED_PLOT_FONT`,
//! then a few common system locations. When no font is found every chart fails
//! with [`PipelineError::Plot`]; callers decide whether that is fatal.

use crate::error::{PipelineError, Result};
use crate::metrics::{MultiLabelMetrics, PrCurve};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{register_font, FontStyle};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable naming a `.ttf` file to render chart text with
pub const FONT_ENV: &str = "BIOMED_PLOT_FONT";

const FONT_FAMILY: &str = "sans-serif";

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Cell edge for grid charts, in pixels
const CELL: u32 = 320;

/// Font registered with plotters; unset until a lookup succeeds
static FONT: OnceLock<PathBuf> = OnceLock::new();

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

pub(crate) fn font_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::env::var_os(FONT_ENV).map(PathBuf::from))
        .chain(FONT_CANDIDATES.iter().map(PathBuf::from))
        .collect()
}

fn load_font(candidates: Vec<PathBuf>) -> std::result::Result<PathBuf, String> {
    for candidate in candidates {
        let Ok(bytes) = std::fs::read(&candidate) else {
            continue;
        };
        // plotters keeps registered fonts for the life of the process
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        match register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
            Ok(()) => {
                tracing::debug!("Chart font: {}", candidate.display());
                return Ok(candidate);
            }
            Err(_) => tracing::warn!("Ignoring unreadable font {}", candidate.display()),
        }
    }
    Err(format!("no usable TrueType font found (set {} to a .ttf file)", FONT_ENV))
}

fn resolve_font(cache: &OnceLock<PathBuf>, candidates: Vec<PathBuf>) -> std::result::Result<PathBuf, String> {
    if let Some(path) = cache.get() {
        return Ok(path.clone());
    }
    let path = load_font(candidates)?;
    Ok(cache.get_or_init(|| path).clone())
}

/// Register the chart font once per process
///
/// A failed lookup is retried on the next call; once a font is registered,
/// later `explicit` paths are ignored.
pub fn ensure_font(explicit: Option<&Path>) -> std::result::Result<PathBuf, String> {
    resolve_font(&FONT, font_candidates(explicit))
}

fn render(path: &Path, font: Option<&Path>, draw: impl FnOnce(&Path) -> DrawResult) -> Result<()> {
    let artifact = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    ensure_font(font).map_err(|reason| PipelineError::Plot {
        artifact: artifact.clone(),
        reason,
    })?;
    draw(path).map_err(|e| PipelineError::Plot {
        artifact,
        reason: e.to_string(),
    })
}

fn grid_shape(n: usize) -> (usize, usize) {
    let cols = (n as f64).sqrt().ceil().max(1.0) as usize;
    let rows = n.div_ceil(cols).max(1);
    (rows, cols)
}

/// Bar chart of F1 per label
pub fn f1_per_class(path: &Path, title: &str, metrics: &MultiLabelMetrics, font: Option<&Path>) -> Result<()> {
    render(path, font, |path| {
        let labels: Vec<&str> = metrics.per_class.iter().map(|c| c.label.as_str()).collect();
        let n = labels.len().max(1);
        let width = (120 * n as u32).max(640);

        let root = BitMapBackend::new(path, (width, 480)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, (FONT_FAMILY, 22))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(50)
            .build_cartesian_2d((0..n as u32).into_segmented(), 0.0..1.05f64)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n)
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => labels.get(*i as usize).map(|l| l.to_string()).unwrap_or_default(),
                _ => String::new(),
            })
            .y_desc("F1 score")
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.7).filled())
                .margin(12)
                .data(metrics.per_class.iter().enumerate().map(|(i, c)| (i as u32, c.f1_score))),
        )?;

        root.present()?;
        Ok(())
    })
}

/// One 2x2 confusion matrix per label, rows actual and columns predicted
pub fn confusion_matrices(path: &Path, title: &str, metrics: &MultiLabelMetrics, font: Option<&Path>) -> Result<()> {
    render(path, font, |path| {
        let (rows, cols) = grid_shape(metrics.per_class.len());
        let root = BitMapBackend::new(path, (CELL * cols as u32, CELL * rows as u32 + 40)).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, (FONT_FAMILY, 22))?;

        let centered = TextStyle::from((FONT_FAMILY, 16).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
        let names = [["TN", "FP"], ["FN", "TP"]];

        for (area, class) in root.split_evenly((rows, cols)).iter().zip(&metrics.per_class) {
            let grid = class.confusion.grid();
            let peak = grid.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;

            let mut chart = ChartBuilder::on(area)
                .caption(&class.label, (FONT_FAMILY, 16))
                .margin(20)
                .build_cartesian_2d(0.0..2.0f64, 0.0..2.0f64)?;

            // actual-negative row on top
            chart.draw_series(grid.iter().enumerate().flat_map(|(r, row)| {
                row.iter().enumerate().map(move |(c, &count)| {
                    let x = c as f64;
                    let y = 1.0 - r as f64;
                    let shade = 0.1 + 0.8 * count as f64 / peak;
                    Rectangle::new([(x, y), (x + 1.0, y + 1.0)], BLUE.mix(shade).filled())
                })
            }))?;
            chart.draw_series(grid.iter().enumerate().flat_map(|(r, row)| {
                let centered = centered.clone();
                row.iter().enumerate().map(move |(c, &count)| {
                    Text::new(
                        format!("{} {}", names[r][c], count),
                        (c as f64 + 0.5, 1.5 - r as f64),
                        centered.clone(),
                    )
                })
            }))?;
        }

        root.present()?;
        Ok(())
    })
}

/// Precision-recall curve per label, captioned with its average precision
pub fn precision_recall(path: &Path, title: &str, curves: &[(String, PrCurve)], font: Option<&Path>) -> Result<()> {
    render(path, font, |path| {
        let (rows, cols) = grid_shape(curves.len());
        let root = BitMapBackend::new(path, (CELL * cols as u32, CELL * rows as u32 + 40)).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, (FONT_FAMILY, 22))?;

        for (area, (label, curve)) in root.split_evenly((rows, cols)).iter().zip(curves) {
            let caption = match curve.average_precision {
                Some(ap) => format!("{} (AP={:.2})", label, ap),
                None => format!("{} (no positives)", label),
            };

            let mut chart = ChartBuilder::on(area)
                .caption(caption, (FONT_FAMILY, 16))
                .margin(10)
                .x_label_area_size(30)
                .y_label_area_size(35)
                .build_cartesian_2d(0.0..1.0f64, 0.0..1.05f64)?;

            chart
                .configure_mesh()
                .x_labels(5)
                .y_labels(5)
                .x_desc("Recall")
                .y_desc("Precision")
                .draw()?;

            if !curve.points.is_empty() {
                let start = std::iter::once((0.0, 1.0));
                chart.draw_series(LineSeries::new(
                    start.chain(curve.points.iter().map(|p| (p.recall, p.precision))),
                    &RED,
                ))?;
            }
        }

        root.present()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(4), (2, 2));
        assert_eq!(grid_shape(5), (2, 3));
        assert_eq!(grid_shape(0), (1, 1));
    }

    #[test]
    fn test_failed_font_lookup_is_retried() {
        let cache = OnceLock::new();
        let missing = PathBuf::from("/nonexistent/fonts/missing.ttf");

        assert!(resolve_font(&cache, vec![missing.clone()]).is_err());
        assert!(cache.get().is_none());

        let Some(font) = font_candidates(None).into_iter().find(|p| p.is_file()) else {
            eprintln!("no system font available; skipping");
            return;
        };
        assert_eq!(resolve_font(&cache, vec![missing.clone(), font.clone()]).unwrap(), font);
        // cached from now on
        assert_eq!(resolve_font(&cache, vec![missing]).unwrap(), font);
    }

    #[test]
    fn test_explicit_font_comes_first() {
        let explicit = Path::new("/opt/fonts/custom.ttf");
        let candidates = font_candidates(Some(explicit));
        assert_eq!(candidates[0], explicit);
        assert!(candidates.len() > FONT_CANDIDATES.len());
    }
}
