//! Collaborator interfaces consumed by the workflow engine, with default
//! implementations. The engine depends only on the traits.

pub mod charts;
pub mod dataset;
pub mod document;
pub mod sampler;
pub mod stats;

pub use charts::{ChartEngine, ChartSpec, PlottersChartEngine, RenderedChart};
pub use dataset::{Column, ColumnType, CsvDatasetLoader, Dataset, DatasetLoader, Schema};
pub use document::{
    DocumentEngine, GeneratedDocument, ManuscriptSettings, MarkdownDocumentEngine, ReportInput,
};
pub use stats::{AnalysisOutcome, BuiltinStatsEngine, StatsEngine, TwoGroupMethod};
