//! Chart collaborator — renders dataset visuals to PNG files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collab::dataset::Dataset;
use crate::error::ChartError;

const CHART_SIZE: (u32, u32) = (800, 600);

/// What to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartSpec {
    Histogram { column: String },
    Bar { column: String },
    Scatter { x: String, y: String },
    Heatmap { row: String, col: String },
}

impl ChartSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Histogram { .. } => "histogram",
            Self::Bar { .. } => "bar",
            Self::Scatter { .. } => "scatter",
            Self::Heatmap { .. } => "heatmap",
        }
    }

    /// Default title when the user does not supply one.
    pub fn default_title(&self) -> String {
        match self {
            Self::Histogram { column } => format!("Distribution of {column}"),
            Self::Bar { column } => format!("Counts of {column}"),
            Self::Scatter { x, y } => format!("{y} by {x}"),
            Self::Heatmap { row, col } => format!("{row} × {col}"),
        }
    }
}

/// A rendered chart on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedChart {
    pub path: PathBuf,
    pub title: String,
    pub kind: String,
}

/// Renders charts for the chart-builder wizard and the report generator.
#[async_trait]
pub trait ChartEngine: Send + Sync {
    async fn render(
        &self,
        ds: &Dataset,
        spec: &ChartSpec,
        title: Option<&str>,
        out_dir: &Path,
    ) -> Result<RenderedChart, ChartError>;
}

/// plotters-backed implementation.
pub struct PlottersChartEngine;

impl PlottersChartEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlottersChartEngine {
    fn default() -> Self {
        Self::new()
    }
}

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn draw_histogram(path: &Path, title: &str, column: &str, values: &[f64]) -> DrawResult {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };
    const BINS: usize = 10;
    let mut counts = [0u32; BINS];
    for v in values {
        let idx = (((v - min) / span) * BINS as f64).floor() as usize;
        counts[idx.min(BINS - 1)] += 1;
    }
    let y_max = counts.iter().copied().max().unwrap_or(1).max(1);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(min..max, 0u32..y_max + 1)?;
    chart
        .configure_mesh()
        .x_desc(column)
        .y_desc("Count")
        .draw()?;
    let bin_width = span / BINS as f64;
    chart.draw_series(counts.iter().enumerate().map(|(i, &c)| {
        let x0 = min + i as f64 * bin_width;
        Rectangle::new([(x0, 0), (x0 + bin_width, c)], BLUE.mix(0.5).filled())
    }))?;
    root.present()?;
    Ok(())
}

fn draw_bar(path: &Path, title: &str, column: &str, entries: &[(String, u64)]) -> DrawResult {
    let y_max = entries.iter().map(|(_, c)| *c).max().unwrap_or(1).max(1);
    let labels: Vec<String> = entries.iter().map(|(l, _)| l.clone()).collect();

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(40)
        .build_cartesian_2d(0usize..entries.len(), 0u64..y_max + 1)?;
    chart
        .configure_mesh()
        .x_desc(column)
        .y_desc("Count")
        .x_labels(entries.len())
        .x_label_formatter(&|i| labels.get(*i).cloned().unwrap_or_default())
        .draw()?;
    chart.draw_series(entries.iter().enumerate().map(|(i, (_, c))| {
        Rectangle::new([(i, 0), (i + 1, *c)], GREEN.mix(0.6).filled())
    }))?;
    root.present()?;
    Ok(())
}

fn draw_scatter(
    path: &Path,
    title: &str,
    x_name: &str,
    y_name: &str,
    pairs: &[(f64, f64)],
) -> DrawResult {
    let x_min = pairs.iter().map(|(x, _)| *x).fold(f64::INFINITY, f64::min);
    let x_max = pairs.iter().map(|(x, _)| *x).fold(f64::NEG_INFINITY, f64::max);
    let y_min = pairs.iter().map(|(_, y)| *y).fold(f64::INFINITY, f64::min);
    let y_max = pairs.iter().map(|(_, y)| *y).fold(f64::NEG_INFINITY, f64::max);
    let pad = |lo: f64, hi: f64| {
        let span = if hi > lo { hi - lo } else { 1.0 };
        (lo - span * 0.05, hi + span * 0.05)
    };
    let (x_lo, x_hi) = pad(x_min, x_max);
    let (y_lo, y_hi) = pad(y_min, y_max);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    chart.configure_mesh().x_desc(x_name).y_desc(y_name).draw()?;
    chart.draw_series(
        pairs
            .iter()
            .map(|(x, y)| Circle::new((*x, *y), 4, BLUE.mix(0.7).filled())),
    )?;
    root.present()?;
    Ok(())
}

fn draw_heatmap(
    path: &Path,
    title: &str,
    row_labels: &[String],
    col_labels: &[String],
    counts: &[Vec<u64>],
) -> DrawResult {
    let max = counts.iter().flatten().copied().max().unwrap_or(1).max(1);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(0usize..col_labels.len(), 0usize..row_labels.len())?;
    let rows = row_labels.to_vec();
    let cols = col_labels.to_vec();
    chart
        .configure_mesh()
        .x_labels(cols.len())
        .y_labels(rows.len())
        .x_label_formatter(&|i| cols.get(*i).cloned().unwrap_or_default())
        .y_label_formatter(&|i| rows.get(*i).cloned().unwrap_or_default())
        .draw()?;
    chart.draw_series(counts.iter().enumerate().flat_map(|(ri, row)| {
        row.iter().enumerate().map(move |(ci, &c)| {
            let intensity = c as f64 / max as f64;
            Rectangle::new(
                [(ci, ri), (ci + 1, ri + 1)],
                HSLColor(0.6, 0.8, 1.0 - 0.6 * intensity).filled(),
            )
        })
    }))?;
    root.present()?;
    Ok(())
}

#[async_trait]
impl ChartEngine for PlottersChartEngine {
    async fn render(
        &self,
        ds: &Dataset,
        spec: &ChartSpec,
        title: Option<&str>,
        out_dir: &Path,
    ) -> Result<RenderedChart, ChartError> {
        tokio::fs::create_dir_all(out_dir).await?;
        let title = title
            .map(str::to_string)
            .unwrap_or_else(|| spec.default_title());
        let path = out_dir.join(format!("{}_{}.png", spec.kind(), Uuid::new_v4()));

        let result: DrawResult = match spec {
            ChartSpec::Histogram { column } => {
                let values = ds
                    .numeric(column)
                    .map_err(|_| ChartError::NoData(column.clone()))?;
                if values.is_empty() {
                    return Err(ChartError::NoData(column.clone()));
                }
                draw_histogram(&path, &title, column, &values)
            }
            ChartSpec::Bar { column } => {
                let values = ds
                    .values(column)
                    .map_err(|_| ChartError::NoData(column.clone()))?;
                let mut entries: Vec<(String, u64)> = Vec::new();
                for v in values.iter().flatten() {
                    match entries.iter_mut().find(|(l, _)| l == v) {
                        Some((_, c)) => *c += 1,
                        None => entries.push((v.clone(), 1)),
                    }
                }
                if entries.is_empty() {
                    return Err(ChartError::NoData(column.clone()));
                }
                draw_bar(&path, &title, column, &entries)
            }
            ChartSpec::Scatter { x, y } => {
                let pairs = ds
                    .paired_numeric(x, y)
                    .map_err(|_| ChartError::NoData(format!("{x}/{y}")))?;
                if pairs.is_empty() {
                    return Err(ChartError::NoData(format!("{x}/{y}")));
                }
                draw_scatter(&path, &title, x, y, &pairs)
            }
            ChartSpec::Heatmap { row, col } => {
                let (row_labels, col_labels, counts) = ds
                    .cross_counts(row, col)
                    .map_err(|_| ChartError::NoData(format!("{row}/{col}")))?;
                if counts.is_empty() {
                    return Err(ChartError::NoData(format!("{row}/{col}")));
                }
                draw_heatmap(&path, &title, &row_labels, &col_labels, &counts)
            }
        };

        result.map_err(|e| ChartError::RenderFailed {
            kind: spec.kind().to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(path = %path.display(), kind = spec.kind(), "Chart rendered");
        Ok(RenderedChart {
            path,
            title,
            kind: spec.kind().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::dataset::{CsvDatasetLoader, DatasetLoader};
    use std::io::Write;

    async fn sample_dataset() -> Dataset {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(b"Gender,Score\nM,70\nF,65\nM,80\nF,72\nM,68\n")
            .unwrap();
        CsvDatasetLoader::new().load(file.path()).await.unwrap()
    }

    #[tokio::test]
    async fn renders_histogram_to_png() {
        let ds = sample_dataset().await;
        let dir = tempfile::tempdir().unwrap();
        let engine = PlottersChartEngine::new();
        let chart = match engine
            .render(
                &ds,
                &ChartSpec::Histogram {
                    column: "Score".into(),
                },
                None,
                dir.path(),
            )
            .await
        {
            Ok(chart) => chart,
            // Headless machines without system fonts cannot draw captions.
            Err(ChartError::RenderFailed { .. }) => return,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert!(chart.path.exists());
        assert_eq!(chart.kind, "histogram");
        assert_eq!(chart.title, "Distribution of Score");
    }

    #[tokio::test]
    async fn custom_title_wins() {
        let ds = sample_dataset().await;
        let dir = tempfile::tempdir().unwrap();
        let engine = PlottersChartEngine::new();
        let chart = match engine
            .render(
                &ds,
                &ChartSpec::Bar {
                    column: "Gender".into(),
                },
                Some("Participants by gender"),
                dir.path(),
            )
            .await
        {
            Ok(chart) => chart,
            Err(ChartError::RenderFailed { .. }) => return,
            Err(e) => panic!("unexpected error: {e}"),
        };
        assert_eq!(chart.title, "Participants by gender");
    }

    #[tokio::test]
    async fn text_column_cannot_be_histogrammed() {
        let ds = sample_dataset().await;
        let dir = tempfile::tempdir().unwrap();
        let engine = PlottersChartEngine::new();
        let err = engine
            .render(
                &ds,
                &ChartSpec::Histogram {
                    column: "Gender".into(),
                },
                None,
                dir.path(),
            )
            .await;
        assert!(matches!(err, Err(ChartError::NoData(_))));
    }
}
