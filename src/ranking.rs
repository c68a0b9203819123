//! Initial ranking of a distance matrix and the reciprocal-neighbour test.
//!
//! Each row is ordered ascending by distance with ties broken by ascending
//! column index, which makes the ordering total and reproducible. NaN
//! distances sort after every number. Only the
//! prefix the re-ranking reads is kept: `depth` columns per row instead of the
//! full permutation.

use std::cmp::Ordering;

use rayon::prelude::*;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use log::{debug, info};

#[inline]
fn by_distance(row: &[f64]) -> impl Fn(&usize, &usize) -> Ordering + '_ {
    move |&a, &b| {
        row[a].total_cmp(&row[b]).then_with(|| a.cmp(&b))
    }
}

/// Full ascending argsort of `row`.
pub fn argsort(row: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..row.len()).collect();
    idx.sort_unstable_by(by_distance(row));
    idx
}

/// The `k` smallest entries of `row`, ascending. `k` is clamped to the row length.
pub fn argsort_prefix(row: &[f64], k: usize) -> Vec<usize> {
    let k = k.min(row.len());
    if k == 0 {
        return Vec::new();
    }
    let mut idx: Vec<usize> = (0..row.len()).collect();
    if k < idx.len() {
        idx.select_nth_unstable_by(k - 1, by_distance(row));
        idx.truncate(k);
    }
    idx.sort_unstable_by(by_distance(row));
    idx
}

/// Truncated per-row ranking of a square distance matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitialRanking {
    depth: usize,
    ranks: Vec<Vec<usize>>,
}

impl InitialRanking {
    /// Rank every row of `d`, keeping the first `depth` columns.
    pub fn from_distance(d: &DenseMatrix<f64>, depth: usize) -> Self {
        let (rows, cols) = d.shape();
        let depth = depth.min(cols);
        info!("Ranking {} rows (depth {})", rows, depth);

        let ranks: Vec<Vec<usize>> = (0..rows)
            .into_par_iter()
            .map(|i| {
                let row: Vec<f64> = (0..cols).map(|j| *d.get((i, j))).collect();
                argsort_prefix(&row, depth)
            })
            .collect();

        debug!("Initial ranking ready: {} rows x {} columns", rows, depth);
        Self { depth, ranks }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Stored ranking prefix of row `i`.
    pub fn row(&self, i: usize) -> &[usize] {
        &self.ranks[i]
    }

    /// First `k` ranked columns of row `i` (fewer if the prefix is shorter).
    pub fn top(&self, i: usize, k: usize) -> &[usize] {
        let row = &self.ranks[i];
        &row[..k.min(row.len())]
    }

    /// k-reciprocal set of `i`: entries `j` of the top-(k+1) list of `i` whose
    /// own top-(k+1) list contains `i`. Returned in ranking order.
    pub fn k_reciprocal(&self, i: usize, k: usize) -> Vec<usize> {
        self.top(i, k + 1)
            .iter()
            .copied()
            .filter(|&j| self.top(j, k + 1).contains(&i))
            .collect()
    }
}
