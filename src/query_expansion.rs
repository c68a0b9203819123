//! Local query expansion: replace each row of `V` by the mean of the rows of
//! its `k2` nearest neighbours (the item itself included, as it ranks first).

use std::collections::BTreeMap;

use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use crate::ranking::InitialRanking;

use log::{debug, info};

/// Mean of the rows `members` of `v`, as sorted `(column, value)` pairs.
fn mean_of_rows(v: &CsMat<f64>, members: &[usize]) -> Vec<(usize, f64)> {
    let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
    for &r in members {
        if let Some(row) = v.outer_view(r) {
            for (j, &w) in row.iter() {
                *acc.entry(j).or_insert(0.0) += w;
            }
        }
    }
    let count = members.len().max(1) as f64;
    acc.into_iter()
        .filter(|&(_, w)| w != 0.0)
        .map(|(j, w)| (j, w / count))
        .collect()
}

/// Smooth `v` over each item's top-`k2` neighbours. `k2 == 1` returns `v` unchanged.
pub fn local_query_expansion(v: &CsMat<f64>, ranking: &InitialRanking, k2: usize) -> CsMat<f64> {
    if k2 <= 1 {
        debug!("k2={}, skipping local query expansion", k2);
        return v.clone();
    }
    let (n, cols) = v.shape();
    info!("Local query expansion over {} rows (k2={})", n, k2);

    let rows: Vec<Vec<(usize, f64)>> = (0..n)
        .into_par_iter()
        .map(|i| mean_of_rows(v, ranking.top(i, k2)))
        .collect();

    let mut triplets: TriMat<f64> = TriMat::new((n, cols));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, w) in row {
            triplets.add_triplet(i, j, w);
        }
    }
    let expanded: CsMat<f64> = triplets.to_csr();
    debug!("Expanded matrix has {} non-zeros (was {})", expanded.nnz(), v.nnz());
    expanded
}
