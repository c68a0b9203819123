//! # Jaccard distance fusion
//!
//! Weighted-neighbour rows `V[i]` are L1-normalised membership vectors, so the
//! weighted intersection of two rows is `Σ_j min(V[a][j], V[b][j])` and the
//! union is `2 - intersection`. The Jaccard distance is therefore
//! `1 - min / (2 - min)`.
//!
//! The intersection is accumulated through an inverted index over the columns
//! of `V`: for each non-zero `(i, j)` only the rows that are non-zero in column
//! `j` are touched, so the cost follows `nnz(V)` instead of `A²`.

use rayon::prelude::*;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::CsMat;

use crate::distance::from_rows;

use log::{debug, info, trace};

/// Column → non-zero `(row, weight)` lists of a CSR matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvertedIndex {
    columns: Vec<Vec<(usize, f64)>>,
}

impl InvertedIndex {
    pub fn build(v: &CsMat<f64>) -> Self {
        let (rows, cols) = v.shape();
        let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); cols];
        for r in 0..rows {
            if let Some(row) = v.outer_view(r) {
                for (j, &w) in row.iter() {
                    if w != 0.0 {
                        columns[j].push((r, w));
                    }
                }
            }
        }
        trace!("Inverted index built over {} columns", cols);
        Self { columns }
    }

    /// Rows with a non-zero weight in column `j`, ascending.
    pub fn column(&self, j: usize) -> &[(usize, f64)] {
        &self.columns[j]
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn nnz(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }
}

/// Jaccard distance between every query row `i < n_query` and every gallery
/// row `r ≥ n_query`. Returns `n_query` rows of `A - n_query` entries.
pub fn jaccard_distance(v: &CsMat<f64>, index: &InvertedIndex, n_query: usize) -> Vec<Vec<f64>> {
    let (all, _) = v.shape();
    let n_gallery = all - n_query;
    info!("Jaccard distance for {} queries x {} gallery items", n_query, n_gallery);

    (0..n_query)
        .into_par_iter()
        .map(|i| {
            let mut temp_min = vec![0.0f64; n_gallery];
            if let Some(row) = v.outer_view(i) {
                for (j, &w_ij) in row.iter() {
                    for &(r, w_rj) in index.column(j) {
                        if r >= n_query {
                            temp_min[r - n_query] += w_ij.min(w_rj);
                        }
                    }
                }
            }
            temp_min
                .into_iter()
                .map(|t| 1.0 - t / (2.0 - t))
                .collect()
        })
        .collect()
}

/// `(1-λ)·jaccard + λ·base` over the query×gallery block of `base`.
pub fn fuse(
    jaccard: Vec<Vec<f64>>,
    base: &DenseMatrix<f64>,
    n_query: usize,
    lambda: f64,
) -> DenseMatrix<f64> {
    let (_, all) = base.shape();
    let n_gallery = all - n_query;
    debug!("Fusing Jaccard and original distance with lambda={}", lambda);

    let rows: Vec<Vec<f64>> = jaccard
        .into_par_iter()
        .enumerate()
        .map(|(i, jac)| {
            jac.into_iter()
                .enumerate()
                .map(|(g, d_j)| (1.0 - lambda) * d_j + lambda * *base.get((i, n_query + g)))
                .collect()
        })
        .collect();

    from_rows(rows, n_query, n_gallery)
}
