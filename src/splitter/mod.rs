//! Chronological data splitting
//!
//! [`DataSplitter`] cuts a [`FeatureTable`] into a train/test pair
//! ([`DataSplitter::split_simple`]) or into cross-validation folds
//! ([`DataSplitter::split_cross_validation`]). Row order is never shuffled.

mod split;

pub use split::{ModelInput, OwnedModelInput, Split};

use crate::data::FeatureTable;
use crate::error::{Result, TrendlabError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use split::SplitSource;
use std::ops::Range;
use tracing::debug;

/// Default look-back of sequence windows
pub const DEFAULT_SEQ_LEN: usize = 21;

/// Default number of cross-validation folds
pub const DEFAULT_NB_SPLITS: usize = 5;

/// How cross-validation folds are laid out over the chronological blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FoldStrategy {
    /// `nb_splits` blocks; each fold tests one block and trains on all others
    #[default]
    Blocked,
    /// `nb_splits + 1` blocks; fold `i` tests block `i + 1` after training on
    /// every preceding block
    Expanding,
    /// Like `Expanding`, training on at most `window` preceding blocks
    Rolling { window: usize },
}

/// Train/test row indices of one fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub fold: usize,
}

/// Contiguous blocks covering `0..n`, larger blocks first
pub fn chronological_blocks(n: usize, nb_blocks: usize) -> Vec<Range<usize>> {
    let base = n / nb_blocks;
    let remainder = n % nb_blocks;
    let mut start = 0;
    (0..nb_blocks)
        .map(|i| {
            let size = if i < remainder { base + 1 } else { base };
            let block = start..start + size;
            start += size;
            block
        })
        .collect()
}

impl FoldStrategy {
    /// Lay out fold indices for `n` rows
    pub fn folds(&self, n: usize, nb_splits: usize) -> Result<Vec<FoldIndices>> {
        if nb_splits < 2 {
            return Err(TrendlabError::invalid_parameter(
                "nb_splits",
                nb_splits,
                "must be at least 2",
            ));
        }

        let folds = match *self {
            FoldStrategy::Blocked => {
                let blocks = chronological_blocks(n, nb_splits);
                blocks
                    .iter()
                    .enumerate()
                    .map(|(fold, test)| FoldIndices {
                        train: blocks
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| *i != fold)
                            .flat_map(|(_, b)| b.clone())
                            .collect(),
                        test: test.clone().collect(),
                        fold,
                    })
                    .collect()
            }
            FoldStrategy::Expanding => Self::forward_folds(n, nb_splits, nb_splits),
            FoldStrategy::Rolling { window } => {
                if window == 0 {
                    return Err(TrendlabError::invalid_parameter(
                        "window",
                        window,
                        "must be at least 1",
                    ));
                }
                Self::forward_folds(n, nb_splits, window)
            }
        };
        Ok(folds)
    }

    fn forward_folds(n: usize, nb_splits: usize, window: usize) -> Vec<FoldIndices> {
        let blocks = chronological_blocks(n, nb_splits + 1);
        (0..nb_splits)
            .map(|fold| {
                let first = (fold + 1).saturating_sub(window);
                FoldIndices {
                    train: blocks[first..=fold].iter().flat_map(|b| b.clone()).collect(),
                    test: blocks[fold + 1].clone().collect(),
                    fold,
                }
            })
            .collect()
    }
}

/// Splits one feature table for a given target column
#[derive(Debug, Clone)]
pub struct DataSplitter {
    table: FeatureTable,
    target: String,
    seq_len: usize,
    strategy: FoldStrategy,
    nb_splits: usize,
    feature_columns: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
}

impl DataSplitter {
    /// Create a splitter. The target column must exist and hold no `NaN`.
    pub fn new(table: FeatureTable, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        let (x, y) = Self::decompose(&table, &target)?;
        Ok(Self {
            feature_columns: table.feature_columns(&target),
            table,
            target,
            seq_len: DEFAULT_SEQ_LEN,
            strategy: FoldStrategy::default(),
            nb_splits: DEFAULT_NB_SPLITS,
            x,
            y,
        })
    }

    fn decompose(table: &FeatureTable, target: &str) -> Result<(Array2<f64>, Array1<f64>)> {
        let (x, y) = table.x_y(target)?;
        if let Some(row) = y.iter().position(|v| v.is_nan()) {
            return Err(TrendlabError::DataError(format!(
                "target '{}' is missing at row {}",
                target, row
            )));
        }
        Ok((x, y))
    }

    /// Set the sequence window length (at least 1)
    pub fn with_seq_len(mut self, seq_len: usize) -> Result<Self> {
        if seq_len == 0 {
            return Err(TrendlabError::invalid_parameter("seq_len", seq_len, "must be at least 1"));
        }
        self.seq_len = seq_len;
        Ok(self)
    }

    pub fn with_strategy(mut self, strategy: FoldStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Number of folds used by [`DataSplitter::folds`]
    pub fn with_nb_splits(mut self, nb_splits: usize) -> Self {
        self.nb_splits = nb_splits;
        self
    }

    /// Point the splitter at another target column of the same table. The
    /// previous target column is dropped so it never becomes a feature.
    pub fn with_target(mut self, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        if target == self.target {
            return Ok(self);
        }
        self.table.column_index(&target)?;
        self.table.remove_columns(&[self.target.as_str()])?;
        let (x, y) = Self::decompose(&self.table, &target)?;
        self.feature_columns = self.table.feature_columns(&target);
        self.target = target;
        self.x = x;
        self.y = y;
        Ok(self)
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn strategy(&self) -> FoldStrategy {
        self.strategy
    }

    pub fn nb_splits(&self) -> usize {
        self.nb_splits
    }

    pub fn len(&self) -> usize {
        self.table.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn source(&self) -> SplitSource<'_> {
        SplitSource {
            table: &self.table,
            target: &self.target,
            feature_columns: &self.feature_columns,
            x: &self.x,
            y: &self.y,
            seq_len: self.seq_len,
        }
    }

    /// First `floor(n * train_fraction)` rows train, the rest test
    pub fn split_simple(&self, train_fraction: f64) -> Result<Split> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(TrendlabError::InvalidFraction {
                fraction: train_fraction,
            });
        }
        let n = self.len();
        let n_train = (n as f64 * train_fraction).floor() as usize;
        debug!(rows = n, train = n_train, test = n - n_train, "Simple split");

        self.source()
            .split((0..n_train).collect(), (n_train..n).collect(), 0)
    }

    /// Cross-validation folds laid out by the configured strategy
    pub fn split_cross_validation(&self, nb_splits: usize) -> Result<Vec<Split>> {
        let folds = self.strategy.folds(self.len(), nb_splits)?;
        let source = self.source();
        folds
            .into_iter()
            .map(|f| {
                debug!(fold = f.fold, train = f.train.len(), test = f.test.len(), "Cross-validation fold");
                source.split(f.train, f.test, f.fold)
            })
            .collect()
    }

    /// Folds with the configured `nb_splits`
    pub fn folds(&self) -> Result<Vec<Split>> {
        self.split_cross_validation(self.nb_splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, s};

    fn table(n: usize) -> FeatureTable {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        FeatureTable::from_columns(vec![("x", x), ("target", y)]).unwrap()
    }

    #[test]
    fn test_blocks_larger_first() {
        let blocks = chronological_blocks(10, 3);
        assert_eq!(blocks, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_split_simple_counts() {
        let splitter = DataSplitter::new(table(10), "target").unwrap();
        let split = splitter.split_simple(0.7).unwrap();
        assert_eq!(split.train_indices(), &[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(split.test_indices(), &[7, 8, 9]);
        assert_eq!(split.x_test().column(0), array![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_split_simple_rejects_bad_fraction() {
        let splitter = DataSplitter::new(table(10), "target").unwrap();
        assert!(matches!(
            splitter.split_simple(1.0),
            Err(TrendlabError::InvalidFraction { .. })
        ));
        assert!(matches!(
            splitter.split_simple(0.05),
            Err(TrendlabError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_missing_target_rejected() {
        let mut t = table(4);
        t.add_column("label", array![0.0, f64::NAN, 1.0, 1.0]).unwrap();
        assert!(matches!(
            DataSplitter::new(t.clone(), "label"),
            Err(TrendlabError::DataError(_))
        ));
        assert!(matches!(
            DataSplitter::new(t, "nope"),
            Err(TrendlabError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_blocked_folds_cover_every_row_once() {
        let splitter = DataSplitter::new(table(23), "target").unwrap();
        let folds = splitter.split_cross_validation(5).unwrap();
        assert_eq!(folds.len(), 5);

        let mut tested: Vec<usize> = folds.iter().flat_map(|f| f.test_indices().to_vec()).collect();
        tested.sort_unstable();
        assert_eq!(tested, (0..23).collect::<Vec<_>>());

        for f in &folds {
            assert!(f.test_indices().iter().all(|i| !f.train_indices().contains(i)));
            assert_eq!(f.train_indices().len() + f.test_indices().len(), 23);
        }
    }

    #[test]
    fn test_expanding_and_rolling_folds() {
        let folds = FoldStrategy::Expanding.folds(12, 3).unwrap();
        assert_eq!(folds[0].train, (0..3).collect::<Vec<_>>());
        assert_eq!(folds[2].train, (0..9).collect::<Vec<_>>());
        assert_eq!(folds[2].test, (9..12).collect::<Vec<_>>());

        let folds = FoldStrategy::Rolling { window: 1 }.folds(12, 3).unwrap();
        assert_eq!(folds[2].train, (6..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_nb_splits_validated() {
        let splitter = DataSplitter::new(table(10), "target").unwrap();
        assert!(matches!(
            splitter.split_cross_validation(1),
            Err(TrendlabError::InvalidParameter { .. })
        ));
        assert!(matches!(
            splitter.split_cross_validation(11),
            Err(TrendlabError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_windows_left_padded() {
        let splitter = DataSplitter::new(table(6), "target")
            .unwrap()
            .with_seq_len(3)
            .unwrap();
        let split = splitter.split_simple(0.5).unwrap();
        let windows = split.train_input().require_windows().unwrap();
        assert_eq!(windows.shape(), &[3, 3, 1]);
        assert_eq!(windows.slice(s![0, .., 0]), array![0.0, 0.0, 0.0]);
        assert_eq!(windows.slice(s![2, .., 0]), array![0.0, 1.0, 2.0]);

        let test_windows = split.test_input().require_windows().unwrap();
        assert_eq!(test_windows.slice(s![0, .., 0]), array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_retarget_drops_previous_target() {
        let mut t = table(6);
        t.add_column("label", array![1.0, 1.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        let splitter = DataSplitter::new(t, "target").unwrap();
        assert_eq!(splitter.feature_columns(), &["x", "label"]);

        let splitter = splitter.with_target("label").unwrap();
        assert_eq!(splitter.target(), "label");
        assert_eq!(splitter.feature_columns(), &["x"]);
        assert!(!splitter.table().has_column("target"));
        let split = splitter.split_simple(0.5).unwrap();
        assert_eq!(split.x_train().ncols(), 1);
        assert_eq!(split.y_test(), &array![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_retarget_unknown_column_fails() {
        let splitter = DataSplitter::new(table(4), "target").unwrap();
        assert!(matches!(
            splitter.with_target("nope"),
            Err(TrendlabError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_previous_labels() {
        let splitter = DataSplitter::new(table(4), "target").unwrap();
        let split = splitter.split_simple(0.5).unwrap();
        let previous = split.test_input().require_previous().unwrap();
        assert_eq!(previous, array![1.0, 0.0]);
        assert_eq!(split.train_input().require_previous().unwrap()[0], 0.0);
    }
}
