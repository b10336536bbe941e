//! Integration test: chronological splitting

mod common;

use std::collections::BTreeSet;
use trendlab::error::TrendlabError;
use trendlab::splitter::{DataSplitter, FoldStrategy};

#[test]
fn test_simple_split_is_chronological_and_complete() {
    let splitter = DataSplitter::new(common::noisy_table(101), "target").unwrap();
    let split = splitter.split_simple(0.7).unwrap();

    let train = split.train_indices();
    let test = split.test_indices();
    assert_eq!(train.len(), 70);
    assert_eq!(train.len() + test.len(), 101);
    assert!(train.windows(2).all(|w| w[0] < w[1]));
    assert!(test.windows(2).all(|w| w[0] < w[1]));
    assert!(train.last().unwrap() < test.first().unwrap());
    assert_eq!(split.x_train().nrows(), 70);
    assert_eq!(split.feature_columns(), &["a", "b"]);
}

#[test]
fn test_invalid_fraction() {
    let splitter = DataSplitter::new(common::noisy_table(20), "target").unwrap();
    for fraction in [0.0, 1.0, -0.5, 1.5] {
        assert!(matches!(
            splitter.split_simple(fraction),
            Err(TrendlabError::InvalidFraction { .. })
        ));
    }
}

#[test]
fn test_blocked_folds_test_every_row_once() {
    let splitter = DataSplitter::new(common::noisy_table(103), "target").unwrap();
    let folds = splitter.split_cross_validation(5).unwrap();
    assert_eq!(folds.len(), 5);

    let mut tested = Vec::new();
    for split in &folds {
        let train: BTreeSet<usize> = split.train_indices().iter().copied().collect();
        assert!(split.test_indices().iter().all(|i| !train.contains(i)));
        assert_eq!(train.len() + split.test_indices().len(), 103);
        tested.extend_from_slice(split.test_indices());
    }
    tested.sort_unstable();
    assert_eq!(tested, (0..103).collect::<Vec<_>>());
}

#[test]
fn test_expanding_folds_train_on_the_past() {
    let splitter = DataSplitter::new(common::noisy_table(60), "target")
        .unwrap()
        .with_strategy(FoldStrategy::Expanding);
    let folds = splitter.split_cross_validation(3).unwrap();
    assert_eq!(folds.len(), 3);
    for split in &folds {
        assert!(split.train_indices().last().unwrap() < split.test_indices().first().unwrap());
    }
    assert!(folds[0].train_indices().len() < folds[2].train_indices().len());
}

#[test]
fn test_windows_follow_the_rows() {
    let splitter = DataSplitter::new(common::noisy_table(40), "target")
        .unwrap()
        .with_seq_len(4)
        .unwrap();
    let split = splitter.split_simple(0.5).unwrap();
    let windows = split.test_input().require_windows().unwrap();
    assert_eq!(windows.shape(), &[20, 4, 2]);
    // the last step of each window is the row itself
    for (i, row) in split.x_test().rows().into_iter().enumerate() {
        assert_eq!(windows.slice(ndarray::s![i, 3, ..]), row);
    }
}
