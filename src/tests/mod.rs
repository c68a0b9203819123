mod test_rerank;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::CsMat;

use crate::config::DistanceMetric;
use crate::distance::{row_normalise, self_distance};
use crate::features::LabelledItem;

pub(crate) fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One query at (8, 4) and gallery A=(3, 4), B=(3, 1), C=(1, 7).
///
/// Squared distances from the query are 25, 34 and 58, so A is the raw
/// nearest neighbour, but B shares the query's reciprocal neighbourhood.
pub fn flip_query() -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&vec![vec![8.0, 4.0]]).unwrap()
}

pub fn flip_gallery() -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&vec![vec![3.0, 4.0], vec![3.0, 1.0], vec![1.0, 7.0]]).unwrap()
}

/// Query followed by gallery, as one 4×2 matrix.
pub fn flip_all() -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&vec![
        vec![8.0, 4.0],
        vec![3.0, 4.0],
        vec![3.0, 1.0],
        vec![1.0, 7.0],
    ])
    .unwrap()
}

/// Row-max normalised all-pairs distance of [`flip_all`].
pub fn flip_normalised() -> DenseMatrix<f64> {
    row_normalise(&self_distance(&flip_all(), DistanceMetric::Euclidean).unwrap())
}

/// `n` identical two-dimensional vectors.
pub fn duplicates(n: usize) -> DenseMatrix<f64> {
    DenseMatrix::from_2d_vec(&vec![vec![1.0, 2.0]; n]).unwrap()
}

/// Gaussian-ish clusters: `per_cluster` jittered copies of `clusters` centres
/// spread along the diagonal.
pub fn clustered(clusters: usize, per_cluster: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(clusters * per_cluster);
    for c in 0..clusters {
        for _ in 0..per_cluster {
            rows.push(
                (0..dim)
                    .map(|d| (c * 10 + d) as f64 + rng.random_range(-0.5..0.5))
                    .collect(),
            );
        }
    }
    rows
}

pub fn items(prefix: &str, labels: &[(i64, i64)]) -> Vec<LabelledItem> {
    labels
        .iter()
        .enumerate()
        .map(|(i, &(pid, cam))| LabelledItem::new(format!("{prefix}{i}"), pid, cam))
        .collect()
}

pub fn dense_rows(m: &DenseMatrix<f64>) -> Vec<Vec<f64>> {
    let (rows, cols) = m.shape();
    (0..rows).map(|i| (0..cols).map(|j| *m.get((i, j))).collect()).collect()
}

/// Sparse rows as `(column, value)` lists.
pub fn sparse_rows(v: &CsMat<f64>) -> Vec<Vec<(usize, f64)>> {
    (0..v.rows())
        .map(|i| {
            v.outer_view(i)
                .map(|row| row.iter().map(|(j, &w)| (j, w)).collect())
                .unwrap_or_default()
        })
        .collect()
}

pub fn row_sum(row: &[(usize, f64)]) -> f64 {
    row.iter().map(|&(_, w)| w).sum()
}
