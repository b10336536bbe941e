//! Class balancing by SMOTE oversampling
//!
//! Minority-class rows are interpolated towards one of their `k` nearest
//! same-class neighbours until every class matches the majority count. The
//! synthetic rows are appended after the original ones, which keep their
//! order.

use super::table::FeatureTable;
use crate::error::{Result, TrendlabError};
use ndarray::{Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::info;

/// Distance and row index, ordered by distance
#[derive(Debug, Clone, Copy)]
struct Neighbor(f64, usize);

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// SMOTE settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoteConfig {
    #[serde(default = "default_k_neighbors")]
    pub k_neighbors: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_k_neighbors() -> usize {
    5
}

impl Default for SmoteConfig {
    fn default() -> Self {
        Self {
            k_neighbors: default_k_neighbors(),
            seed: None,
        }
    }
}

impl SmoteConfig {
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Up to `k` nearest rows of `rows` to `rows[point]`, itself excluded
fn nearest(rows: &Array2<f64>, point: usize, k: usize) -> Vec<usize> {
    let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
    let origin = rows.row(point);
    for (i, row) in rows.outer_iter().enumerate() {
        if i == point {
            continue;
        }
        let d = distance(origin, row);
        if heap.len() < k {
            heap.push(Neighbor(d, i));
        } else if heap.peek().is_some_and(|far| d < far.0) {
            heap.pop();
            heap.push(Neighbor(d, i));
        }
    }
    // sorted so the draw below does not depend on heap layout
    let mut found: Vec<Neighbor> = heap.into_vec();
    found.sort_by(|a, b| a.cmp(b).then(a.1.cmp(&b.1)));
    found.into_iter().map(|n| n.1).collect()
}

/// Oversample every minority class of `target` up to the majority count.
///
/// The target must hold integral class values and no column may be missing.
/// Every column other than the target is interpolated.
pub fn smote_balance(table: &FeatureTable, target: &str, config: &SmoteConfig) -> Result<FeatureTable> {
    let target_idx = table.column_index(target)?;
    let data = table.data();
    if data.iter().any(|v| v.is_nan()) {
        return Err(TrendlabError::DataError(
            "smote needs a table without missing values".to_string(),
        ));
    }

    let mut classes: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, &label) in data.column(target_idx).iter().enumerate() {
        if label.fract() != 0.0 {
            return Err(TrendlabError::InvalidInput(format!(
                "smote needs integral class labels, got {} at row {}",
                label, row
            )));
        }
        classes.entry(label as i64).or_default().push(row);
    }
    if classes.len() < 2 {
        return Err(TrendlabError::InsufficientData(
            "smote needs at least two classes".to_string(),
        ));
    }
    let majority = classes.values().map(Vec::len).max().unwrap_or(0);

    let mut rng = match config.seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    let mut synthetic: Vec<f64> = Vec::new();
    let mut generated = 0;
    for (&class, rows) in &classes {
        let missing = majority - rows.len();
        if missing == 0 {
            continue;
        }
        if rows.len() < 2 {
            return Err(TrendlabError::InsufficientData(format!(
                "class {} has a single row, smote needs two",
                class
            )));
        }
        let members = data.select(Axis(0), rows);
        let k = config.k_neighbors.max(1).min(rows.len() - 1);
        for _ in 0..missing {
            let point = rng.gen_range(0..members.nrows());
            let neighbors = nearest(&members, point, k);
            let neighbor = neighbors[rng.gen_range(0..neighbors.len())];
            let gap: f64 = rng.gen();
            let origin = members.row(point);
            let toward = members.row(neighbor);
            synthetic.extend(
                origin
                    .iter()
                    .zip(toward.iter())
                    .enumerate()
                    .map(|(j, (&a, &b))| if j == target_idx { class as f64 } else { a + gap * (b - a) }),
            );
        }
        generated += missing;
    }

    let extra = Array2::from_shape_vec((generated, table.ncols()), synthetic)?;
    let stacked = ndarray::concatenate(Axis(0), &[data.view(), extra.view()])?;
    let balanced = FeatureTable::new(table.columns().to_vec(), stacked)?;
    info!(
        target,
        rows = table.nrows(),
        synthetic = generated,
        classes = classes.len(),
        "Balanced classes with smote"
    );
    Ok(balanced)
}
