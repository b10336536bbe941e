//! Feature tables: named numeric columns over time-ordered rows

use crate::error::{Result, TrendlabError};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::{
    Column, CsvReadOptions, CsvWriter, DataFrame, DataType, NamedFrom, SerReader, SerWriter,
    Series,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Normalize a column heading: lower case, spaces replaced by underscores
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Table of named `f64` columns. Rows are time ordered, missing values are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl FeatureTable {
    /// Create a table from column names and a row-major matrix
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if columns.len() != data.ncols() {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", data.ncols()),
            });
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TrendlabError::DataError(format!("duplicate column '{}'", name)));
            }
        }
        Ok(Self { columns, data })
    }

    /// Create a table from `(name, values)` pairs of equal length
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());
        for (name, col) in columns {
            let name = name.into();
            if col.len() != n_rows {
                return Err(TrendlabError::ShapeError {
                    expected: format!("{} rows in '{}'", n_rows, name),
                    actual: format!("{} rows", col.len()),
                });
            }
            names.push(name);
            values.push(col);
        }
        let data = Array2::from_shape_fn((n_rows, names.len()), |(r, c)| values[c][r]);
        Self::new(names, data)
    }

    /// Convert a polars DataFrame. String columns (dates, tickers) are skipped,
    /// nulls become `NaN`.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut columns = Vec::new();
        for name in df.get_column_names() {
            let column = df.column(name.as_str())?;
            if column.dtype() == &DataType::String {
                debug!(column = %name, "Skipping non-numeric column");
                continue;
            }
            let values: Vec<f64> = column
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            columns.push((normalize_column_name(name.as_str()), values));
        }
        Self::from_columns(columns)
    }

    /// Convert into a polars DataFrame
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .enumerate()
            .map(|(j, name)| Series::new(name.as_str().into(), self.data.column(j).to_vec()).into())
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    /// Load a CSV file; headings are normalized
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| TrendlabError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(100))
            .into_reader_with_file_handle(file)
            .finish()?;

        let table = Self::from_dataframe(&df)?;
        debug!(path = %path.display(), rows = table.nrows(), cols = table.ncols(), "Loaded feature table");
        Ok(table)
    }

    /// Write the table as CSV with a header row
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Rename every column with `normalize_column_name`
    pub fn normalize_headings(&mut self) -> Result<()> {
        let renamed: Vec<String> = self.columns.iter().map(|c| normalize_column_name(c)).collect();
        let mut seen = HashSet::new();
        for name in &renamed {
            if !seen.insert(name.as_str()) {
                return Err(TrendlabError::DataError(format!(
                    "normalized headings collide on '{}'",
                    name
                )));
            }
        }
        self.columns = renamed;
        Ok(())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TrendlabError::FeatureNotFound(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.column_index(name)?;
        Ok(self.data.column(idx))
    }

    /// Add a column, replacing any existing column of the same name
    pub fn add_column(&mut self, name: impl Into<String>, values: Array1<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.nrows() {
            return Err(TrendlabError::ShapeError {
                expected: format!("{} values for '{}'", self.nrows(), name),
                actual: format!("{} values", values.len()),
            });
        }
        if let Ok(idx) = self.column_index(&name) {
            self.data.column_mut(idx).assign(&values);
            return Ok(());
        }
        self.data.push_column(values.view())?;
        self.columns.push(name);
        Ok(())
    }

    /// Drop the named columns; every name must exist
    pub fn remove_columns(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.column_index(name)?;
        }
        let keep: Vec<usize> = (0..self.ncols())
            .filter(|&j| !names.contains(&self.columns[j].as_str()))
            .collect();
        self.data = self.data.select(Axis(1), &keep);
        self.columns = keep.iter().map(|&j| self.columns[j].clone()).collect();
        Ok(())
    }

    /// Copy the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> FeatureTable {
        FeatureTable {
            columns: self.columns.clone(),
            data: self.data.select(Axis(0), rows),
        }
    }

    /// Remove every row holding at least one `NaN`
    pub fn drop_missing(&mut self) -> usize {
        let keep: Vec<usize> = self
            .data
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(i, _)| i)
            .collect();
        let dropped = self.nrows() - keep.len();
        if dropped > 0 {
            self.data = self.data.select(Axis(0), &keep);
        }
        dropped
    }

    /// Names of every column except `target`
    pub fn feature_columns(&self, target: &str) -> Vec<String> {
        self.columns.iter().filter(|c| c.as_str() != target).cloned().collect()
    }

    /// Split into a feature matrix (all columns but `target`) and the target vector
    pub fn x_y(&self, target: &str) -> Result<(Array2<f64>, Array1<f64>)> {
        let target_idx = self.column_index(target)?;
        let feature_idx: Vec<usize> = (0..self.ncols()).filter(|&j| j != target_idx).collect();
        let x = self.data.select(Axis(1), &feature_idx);
        let y = self.data.column(target_idx).to_owned();
        Ok((x, y))
    }
}
