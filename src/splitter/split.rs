//! Train/test splits and the model inputs derived from them

use crate::data::FeatureTable;
use crate::error::{Result, TrendlabError};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

/// What an estimator consumes for one side of a split
#[derive(Debug, Clone, Copy)]
pub struct ModelInput<'a> {
    /// Flat feature rows `(n, n_features)`
    pub rows: ArrayView2<'a, f64>,
    /// Look-back windows `(n, seq_len, n_features)`
    pub windows: Option<ArrayView3<'a, f64>>,
    /// Target of the preceding row, aligned with `rows`
    pub previous: Option<ArrayView1<'a, f64>>,
}

impl<'a> ModelInput<'a> {
    /// Input made of flat rows only
    pub fn from_rows(rows: ArrayView2<'a, f64>) -> Self {
        Self {
            rows,
            windows: None,
            previous: None,
        }
    }

    pub fn with_windows(mut self, windows: ArrayView3<'a, f64>) -> Self {
        self.windows = Some(windows);
        self
    }

    pub fn with_previous(mut self, previous: ArrayView1<'a, f64>) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    pub fn n_features(&self) -> usize {
        self.rows.ncols()
    }

    /// Sequence windows, required by recurrent models
    pub fn require_windows(&self) -> Result<ArrayView3<'a, f64>> {
        self.windows
            .ok_or_else(|| TrendlabError::InvalidInput("sequence windows are required".to_string()))
    }

    /// Previous labels, required by the persistence baseline
    pub fn require_previous(&self) -> Result<ArrayView1<'a, f64>> {
        self.previous
            .ok_or_else(|| TrendlabError::InvalidInput("previous labels are required".to_string()))
    }

    /// Keep only the given rows
    pub fn select(&self, rows: &[usize]) -> OwnedModelInput {
        OwnedModelInput {
            rows: self.rows.select(Axis(0), rows),
            windows: self.windows.map(|w| w.select(Axis(0), rows)),
            previous: self.previous.map(|p| p.select(Axis(0), rows)),
        }
    }
}

/// Owned counterpart of [`ModelInput`], produced by row selection
#[derive(Debug, Clone)]
pub struct OwnedModelInput {
    pub rows: Array2<f64>,
    pub windows: Option<Array3<f64>>,
    pub previous: Option<Array1<f64>>,
}

impl OwnedModelInput {
    pub fn view(&self) -> ModelInput<'_> {
        ModelInput {
            rows: self.rows.view(),
            windows: self.windows.as_ref().map(|w| w.view()),
            previous: self.previous.as_ref().map(|p| p.view()),
        }
    }
}

#[derive(Debug, Clone)]
struct Side {
    table: FeatureTable,
    indices: Vec<usize>,
    x: Array2<f64>,
    y: Array1<f64>,
    windows: Array3<f64>,
    previous: Array1<f64>,
}

impl Side {
    fn input(&self) -> ModelInput<'_> {
        ModelInput::from_rows(self.x.view())
            .with_windows(self.windows.view())
            .with_previous(self.previous.view())
    }
}

/// One chronological train/test pair
#[derive(Debug, Clone)]
pub struct Split {
    fold: usize,
    target: String,
    feature_columns: Vec<String>,
    seq_len: usize,
    train: Side,
    test: Side,
}

/// Source data shared by every split of one table
pub(crate) struct SplitSource<'a> {
    pub table: &'a FeatureTable,
    pub target: &'a str,
    pub feature_columns: &'a [String],
    pub x: &'a Array2<f64>,
    pub y: &'a Array1<f64>,
    pub seq_len: usize,
}

impl SplitSource<'_> {
    fn side(&self, indices: Vec<usize>) -> Side {
        let n_features = self.x.ncols();
        let mut windows = Array3::zeros((indices.len(), self.seq_len, n_features));
        for (i, &t) in indices.iter().enumerate() {
            for k in 0..self.seq_len {
                // rows before the start repeat row 0
                let row = (t + k + 1).saturating_sub(self.seq_len);
                windows.slice_mut(s![i, k, ..]).assign(&self.x.row(row));
            }
        }

        let previous = indices
            .iter()
            .map(|&t| self.y[t.saturating_sub(1)])
            .collect();

        Side {
            table: self.table.select_rows(&indices),
            x: self.x.select(Axis(0), &indices),
            y: self.y.select(Axis(0), &indices),
            windows,
            previous,
            indices,
        }
    }

    pub fn split(&self, train: Vec<usize>, test: Vec<usize>, fold: usize) -> Result<Split> {
        if train.is_empty() || test.is_empty() {
            return Err(TrendlabError::InsufficientData(format!(
                "fold {} has {} training and {} test rows",
                fold,
                train.len(),
                test.len()
            )));
        }
        Ok(Split {
            fold,
            target: self.target.to_string(),
            feature_columns: self.feature_columns.to_vec(),
            seq_len: self.seq_len,
            train: self.side(train),
            test: self.side(test),
        })
    }
}

impl Split {
    pub fn fold(&self) -> usize {
        self.fold
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn train(&self) -> &FeatureTable {
        &self.train.table
    }

    pub fn test(&self) -> &FeatureTable {
        &self.test.table
    }

    /// Row indices of the training subset in the source table
    pub fn train_indices(&self) -> &[usize] {
        &self.train.indices
    }

    /// Row indices of the test subset in the source table
    pub fn test_indices(&self) -> &[usize] {
        &self.test.indices
    }

    pub fn x_train(&self) -> &Array2<f64> {
        &self.train.x
    }

    pub fn y_train(&self) -> &Array1<f64> {
        &self.train.y
    }

    pub fn x_test(&self) -> &Array2<f64> {
        &self.test.x
    }

    pub fn y_test(&self) -> &Array1<f64> {
        &self.test.y
    }

    pub fn train_input(&self) -> ModelInput<'_> {
        self.train.input()
    }

    pub fn test_input(&self) -> ModelInput<'_> {
        self.test.input()
    }
}
