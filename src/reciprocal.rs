//! # K-reciprocal neighbour expansion
//!
//! For every item `i` of the combined query+gallery set:
//!
//! 1. `R(i)`: the members `j` of the top-(k1+1) list of `i` whose own
//!    top-(k1+1) list contains `i` (`i` itself is normally the first one).
//! 2. Expansion: for each candidate `c ∈ R(i)` compute `R(c)` at the smaller
//!    candidate radius; if more than two thirds of `R(c)` already lies in
//!    `R(i)`, merge all of `R(c)` into the expansion set.
//! 3. Weights: `w_j = exp(-D_norm[i][j])` over the deduplicated expansion
//!    set, normalised to sum to one.
//!
//! The result is the weighted-neighbour matrix `V`, stored as CSR because each
//! row only has a handful of entries. A row whose expansion set is empty (this
//! only happens when more than `k1+1` items are exact duplicates of each
//! other) stays all-zero.

use rayon::prelude::*;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

use crate::error::{RerankError, Result};
use crate::ranking::InitialRanking;

use log::{debug, info, trace, warn};

/// Expanded reciprocal set of `i`, sorted by column and deduplicated.
pub fn expansion_set(ranking: &InitialRanking, i: usize, k1: usize, radius: usize) -> Vec<usize> {
    let base = ranking.k_reciprocal(i, k1);
    let mut expansion = base.clone();

    for &candidate in &base {
        let candidate_set = ranking.k_reciprocal(candidate, radius);
        let shared = candidate_set.iter().filter(|c| base.contains(c)).count();
        // |R(c) ∩ R(i)| > 2/3 |R(c)|, in integers
        if 3 * shared > 2 * candidate_set.len() {
            expansion.extend_from_slice(&candidate_set);
        }
    }

    expansion.sort_unstable();
    expansion.dedup();
    expansion
}

/// Normalised `exp(-d)` weights of one row over `columns`.
///
/// Returns `None` when the set is empty or the weights do not sum to a
/// positive finite value.
pub fn row_weights(normalised: &DenseMatrix<f64>, i: usize, columns: &[usize]) -> Option<Vec<(usize, f64)>> {
    if columns.is_empty() {
        return None;
    }
    let raw: Vec<(usize, f64)> = columns
        .iter()
        .map(|&j| (j, (-*normalised.get((i, j))).exp()))
        .collect();
    let total: f64 = raw.iter().map(|&(_, w)| w).sum();
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }
    Some(raw.into_iter().map(|(j, w)| (j, w / total)).collect())
}

/// Build the weighted-neighbour matrix `V` (`A×A`, CSR).
///
/// * `normalised` - row-max normalised all-pairs distance matrix
/// * `ranking` - initial ranking of the same matrix, depth at least `k1 + 1`
/// * `k1` - reciprocal neighbourhood size
/// * `radius` - neighbourhood size of the candidate test
pub fn weighted_neighbours(
    normalised: &DenseMatrix<f64>,
    ranking: &InitialRanking,
    k1: usize,
    radius: usize,
) -> Result<CsMat<f64>> {
    let (n, cols) = normalised.shape();
    if n != ranking.len() {
        return Err(RerankError::ShapeMismatch {
            what: "initial ranking vs. distance matrix",
            expected: (n, cols),
            found: (ranking.len(), ranking.depth()),
        });
    }
    info!("Expanding k-reciprocal sets for {} items (k1={}, radius={})", n, k1, radius);

    let rows: Vec<Option<Vec<(usize, f64)>>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let set = expansion_set(ranking, i, k1, radius);
            trace!("Item {} expansion set has {} members", i, set.len());
            row_weights(normalised, i, &set)
        })
        .collect();

    let mut triplets: TriMat<f64> = TriMat::new((n, cols));
    let mut empty_rows = 0usize;
    for (i, row) in rows.into_iter().enumerate() {
        match row {
            Some(entries) => {
                for (j, w) in entries {
                    triplets.add_triplet(i, j, w);
                }
            }
            None => {
                debug!("Item {} has no reciprocal neighbours, row left empty", i);
                empty_rows += 1;
            }
        }
    }

    if empty_rows > 0 {
        warn!("{} of {} items have an empty k-reciprocal set", empty_rows, n);
    }

    let v: CsMat<f64> = triplets.to_csr();
    debug!(
        "Weighted-neighbour matrix {}x{} with {} non-zeros ({:.2} per row)",
        n,
        cols,
        v.nnz(),
        v.nnz() as f64 / n.max(1) as f64
    );
    Ok(v)
}
