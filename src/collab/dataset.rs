//! Dataset loader collaborator — loads and cleans tabular files, exposing
//! a cached schema the wizards validate selections against.
//!
//! Sessions keep only the file path between turns; each step that needs
//! data reloads through this trait and re-checks the cached schema.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, StatsError};

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Text,
}

/// One column of the cached schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    /// Number of distinct non-missing values.
    pub distinct: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType, distinct: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            distinct,
        }
    }
}

/// The cached schema of a loaded dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn numeric_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.ty == ColumnType::Numeric)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// A loaded, cleaned dataset. Column-major; `None` is a missing cell.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub schema: Schema,
    pub row_count: usize,
    columns: Vec<Vec<Option<String>>>,
}

impl Dataset {
    fn column_index(&self, name: &str) -> Result<usize, DatasetError> {
        self.schema
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DatasetError::ColumnNotFound(name.to_string()))
    }

    /// Raw cell values of a column.
    pub fn values(&self, name: &str) -> Result<&[Option<String>], DatasetError> {
        let idx = self.column_index(name)?;
        Ok(&self.columns[idx])
    }

    /// Distinct non-missing values, in first-appearance order.
    pub fn distinct_values(&self, name: &str) -> Result<Vec<String>, DatasetError> {
        let values = self.values(name)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for v in values.iter().flatten() {
            if seen.insert(v.clone()) {
                out.push(v.clone());
            }
        }
        Ok(out)
    }

    /// Non-missing values of a numeric column, parsed.
    pub fn numeric(&self, name: &str) -> Result<Vec<f64>, StatsError> {
        let idx = self
            .schema
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| StatsError::ColumnNotFound(name.to_string()))?;
        if self.schema.columns[idx].ty != ColumnType::Numeric {
            return Err(StatsError::NotNumeric {
                column: name.to_string(),
            });
        }
        Ok(self.columns[idx]
            .iter()
            .flatten()
            .filter_map(|v| v.parse::<f64>().ok())
            .collect())
    }

    /// Values of `value_col` split by the groups of `group_col`, in group
    /// first-appearance order. Rows missing either cell are dropped.
    pub fn grouped_numeric(
        &self,
        group_col: &str,
        value_col: &str,
    ) -> Result<Vec<(String, Vec<f64>)>, StatsError> {
        let groups = self
            .values(group_col)
            .map_err(|_| StatsError::ColumnNotFound(group_col.to_string()))?;
        let value_idx = self
            .schema
            .columns
            .iter()
            .position(|c| c.name == value_col)
            .ok_or_else(|| StatsError::ColumnNotFound(value_col.to_string()))?;
        let values = &self.columns[value_idx];

        let mut out: Vec<(String, Vec<f64>)> = Vec::new();
        for (g, v) in groups.iter().zip(values.iter()) {
            let (Some(g), Some(v)) = (g, v) else { continue };
            let Ok(v) = v.parse::<f64>() else { continue };
            match out.iter_mut().find(|(name, _)| name == g) {
                Some((_, bucket)) => bucket.push(v),
                None => out.push((g.clone(), vec![v])),
            }
        }
        Ok(out)
    }

    /// Paired non-missing numeric values of two columns.
    pub fn paired_numeric(&self, a: &str, b: &str) -> Result<Vec<(f64, f64)>, StatsError> {
        let col_a = self
            .values(a)
            .map_err(|_| StatsError::ColumnNotFound(a.to_string()))?;
        let col_b = self
            .values(b)
            .map_err(|_| StatsError::ColumnNotFound(b.to_string()))?;
        Ok(col_a
            .iter()
            .zip(col_b.iter())
            .filter_map(|(x, y)| {
                let x = x.as_ref()?.parse::<f64>().ok()?;
                let y = y.as_ref()?.parse::<f64>().ok()?;
                Some((x, y))
            })
            .collect())
    }

    /// Complete-case rows across `names`, parsed numeric. Used by
    /// regression and reliability.
    pub fn complete_rows(&self, names: &[String]) -> Result<Vec<Vec<f64>>, StatsError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            indices.push(
                self.schema
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| StatsError::ColumnNotFound(name.clone()))?,
            );
        }
        let mut rows = Vec::new();
        'rows: for r in 0..self.row_count {
            let mut row = Vec::with_capacity(indices.len());
            for &idx in &indices {
                match self.columns[idx][r].as_ref().and_then(|v| v.parse::<f64>().ok()) {
                    Some(v) => row.push(v),
                    None => continue 'rows,
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Category counts of a pair of columns: `(row_labels, col_labels,
    /// counts[row][col])`. Missing cells drop the row.
    #[allow(clippy::type_complexity)]
    pub fn cross_counts(
        &self,
        row_col: &str,
        col_col: &str,
    ) -> Result<(Vec<String>, Vec<String>, Vec<Vec<u64>>), StatsError> {
        let rows = self
            .values(row_col)
            .map_err(|_| StatsError::ColumnNotFound(row_col.to_string()))?;
        let cols = self
            .values(col_col)
            .map_err(|_| StatsError::ColumnNotFound(col_col.to_string()))?;

        let mut row_labels: Vec<String> = Vec::new();
        let mut col_labels: Vec<String> = Vec::new();
        let mut cells: Vec<(usize, usize)> = Vec::new();
        for (r, c) in rows.iter().zip(cols.iter()) {
            let (Some(r), Some(c)) = (r, c) else { continue };
            let ri = match row_labels.iter().position(|l| l == r) {
                Some(i) => i,
                None => {
                    row_labels.push(r.clone());
                    row_labels.len() - 1
                }
            };
            let ci = match col_labels.iter().position(|l| l == c) {
                Some(i) => i,
                None => {
                    col_labels.push(c.clone());
                    col_labels.len() - 1
                }
            };
            cells.push((ri, ci));
        }
        let mut counts = vec![vec![0u64; col_labels.len()]; row_labels.len()];
        for (ri, ci) in cells {
            counts[ri][ci] += 1;
        }
        Ok((row_labels, col_labels, counts))
    }
}

/// Loads and cleans a tabular file.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Dataset, DatasetError>;
}

/// CSV-backed loader. Cleaning applied on load:
/// - headers trimmed; blank headers become `Column{i}`;
/// - duplicate headers disambiguated with a `.N` suffix;
/// - rows with every cell empty are dropped;
/// - `NA`, `N/A`, `null`, `NaN` and empty cells become missing.
pub struct CsvDatasetLoader;

impl CsvDatasetLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvDatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_missing(cell: &str) -> bool {
    let t = cell.trim();
    t.is_empty() || matches!(t.to_ascii_lowercase().as_str(), "na" | "n/a" | "null" | "nan")
}

fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.into_iter().enumerate() {
        let base = if h.trim().is_empty() {
            format!("Column{}", i + 1)
        } else {
            h.trim().to_string()
        };
        if !out.contains(&base) {
            out.push(base);
            continue;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}.{n}");
            if !out.contains(&candidate) {
                out.push(candidate);
                break;
            }
            n += 1;
        }
    }
    out
}

#[async_trait]
impl DatasetLoader for CsvDatasetLoader {
    async fn load(&self, path: &Path) -> Result<Dataset, DatasetError> {
        if !path.exists() {
            return Err(DatasetError::FileNotFound(path.display().to_string()));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if ext != "csv" && ext != "tsv" && ext != "txt" {
            return Err(DatasetError::UnsupportedFormat(ext));
        }

        let raw = tokio::fs::read(path).await?;
        let delimiter = if ext == "tsv" { b'\t' } else { b',' };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(raw.as_slice());

        let headers = dedupe_headers(
            reader
                .headers()
                .map_err(|e| DatasetError::ParseFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?
                .iter()
                .map(str::to_string)
                .collect(),
        );
        if headers.is_empty() {
            return Err(DatasetError::Empty(path.display().to_string()));
        }

        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        let mut row_count = 0usize;
        for record in reader.records() {
            let record = record.map_err(|e| DatasetError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            if record.iter().all(is_missing) {
                continue;
            }
            for (i, col) in columns.iter_mut().enumerate() {
                let cell = record.get(i).unwrap_or_default();
                col.push(if is_missing(cell) {
                    None
                } else {
                    Some(cell.trim().to_string())
                });
            }
            row_count += 1;
        }
        if row_count == 0 {
            return Err(DatasetError::Empty(path.display().to_string()));
        }

        let schema = Schema {
            columns: headers
                .iter()
                .zip(columns.iter())
                .map(|(name, values)| {
                    let non_missing: Vec<&String> = values.iter().flatten().collect();
                    let numeric = !non_missing.is_empty()
                        && non_missing.iter().all(|v| v.parse::<f64>().is_ok());
                    let distinct = non_missing.iter().collect::<HashSet<_>>().len();
                    Column::new(
                        name.clone(),
                        if numeric {
                            ColumnType::Numeric
                        } else {
                            ColumnType::Text
                        },
                        distinct,
                    )
                })
                .collect(),
        };

        tracing::debug!(
            path = %path.display(),
            rows = row_count,
            columns = schema.columns.len(),
            "Dataset loaded"
        );

        Ok(Dataset {
            path: path.to_path_buf(),
            schema,
            row_count,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn load_csv(contents: &str) -> Dataset {
        let mut file = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        CsvDatasetLoader::new().load(file.path()).await.unwrap()
    }

    #[tokio::test]
    async fn loads_and_infers_types() {
        let ds = load_csv("Gender,Score\nM,70\nF,65\nM,80\n").await;
        assert_eq!(ds.row_count, 3);
        assert_eq!(ds.schema.column("Gender").unwrap().ty, ColumnType::Text);
        assert_eq!(ds.schema.column("Score").unwrap().ty, ColumnType::Numeric);
        assert_eq!(ds.schema.column("Gender").unwrap().distinct, 2);
        assert_eq!(ds.numeric("Score").unwrap(), vec![70.0, 65.0, 80.0]);
    }

    #[tokio::test]
    async fn duplicate_headers_get_suffixes() {
        let ds = load_csv("Score,Score,Score\n1,2,3\n").await;
        assert_eq!(ds.schema.names(), ["Score", "Score.1", "Score.2"]);
    }

    #[tokio::test]
    async fn blank_rows_dropped_and_missing_cells_none() {
        let ds = load_csv("A,B\n1,x\n,,\nNA,y\n2,\n").await;
        assert_eq!(ds.row_count, 3);
        assert_eq!(ds.values("A").unwrap()[1], None);
        assert_eq!(ds.values("B").unwrap()[2], None);
    }

    #[tokio::test]
    async fn grouped_numeric_keeps_first_appearance_order() {
        let ds = load_csv("G,V\nB,1\nA,2\nB,3\nC,4\n").await;
        let groups = ds.grouped_numeric("G", "V").unwrap();
        let names: Vec<_> = groups.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(names, ["B", "A", "C"]);
        assert_eq!(groups[0].1, vec![1.0, 3.0]);
    }

    #[tokio::test]
    async fn missing_file_and_bad_format_are_structured_failures() {
        let loader = CsvDatasetLoader::new();
        let err = loader.load(Path::new("/nonexistent/file.csv")).await;
        assert!(matches!(err, Err(DatasetError::FileNotFound(_))));

        let mut file = tempfile::NamedTempFile::with_suffix(".parquet").unwrap();
        file.write_all(b"junk").unwrap();
        let err = loader.load(file.path()).await;
        assert!(matches!(err, Err(DatasetError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn cross_counts_tallies_pairs() {
        let ds = load_csv("G,H\nM,Y\nM,N\nF,Y\nM,Y\n").await;
        let (rows, cols, counts) = ds.cross_counts("G", "H").unwrap();
        assert_eq!(rows, ["M", "F"]);
        assert_eq!(cols, ["Y", "N"]);
        assert_eq!(counts, vec![vec![2, 1], vec![1, 0]]);
    }
}
