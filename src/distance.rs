//! # Distance Matrix Builder
//!
//! Pairwise distances between two feature sets (`m×n`) or within one set
//! (`n×n`), in one of two modes:
//!
//! - **Euclidean** (default): squared distance via the norm expansion
//!   `D[i][j] = ||x_i||² + ||y_j||² - 2·x_i·y_j`. Cancellation can leave tiny
//!   negatives, so every entry is clamped to `≥ 0`.
//! - **Cosine**: rows are normalised to unit length first (zero rows stay zero)
//!   and `D[i][j] = 1 - x_i·y_j`, clamped to `[0, 2]`.
//!
//! An optional [`FeatureTransform`] is applied to every row before either mode,
//! which is how an externally learned metric (e.g. a Mahalanobis projection)
//! plugs in.
//!
//! The all-pairs builder computes the upper triangle only, mirrors it, and
//! writes an exact `0.0` on the diagonal.
//!
//! ```
//! use reid_rerank::config::DistanceMetric;
//! use reid_rerank::distance::self_distance;
//! use smartcore::linalg::basic::arrays::{Array, Array2};
//! use smartcore::linalg::basic::matrix::DenseMatrix;
//!
//! let x = DenseMatrix::from_2d_vec(&vec![vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
//! let d = self_distance(&x, DistanceMetric::Euclidean).unwrap();
//! assert_eq!(*d.get((0, 1)), 25.0);
//! assert_eq!(*d.get((1, 1)), 0.0);
//! ```

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::DistanceMetric;
use crate::error::{RerankError, Result};

use log::{debug, info, trace};

/// A feature-space mapping applied before distances are taken.
pub trait FeatureTransform: Send + Sync {
    /// Map one feature vector. Implementations reject vectors of the wrong length.
    fn transform(&self, x: &[f64]) -> Result<Vec<f64>>;
}

/// Linear map `x ↦ L·x` with `L` of shape `out_dim × in_dim`.
///
/// A learned Mahalanobis metric `M = Lᵀ L` reduces to plain Euclidean distance
/// after this projection.
#[derive(Clone, Debug)]
pub struct LinearTransform {
    matrix: DenseMatrix<f64>,
}

impl LinearTransform {
    pub fn new(matrix: DenseMatrix<f64>) -> Result<Self> {
        let (rows, cols) = matrix.shape();
        if rows == 0 || cols == 0 {
            return Err(RerankError::EmptyInput("projection matrix"));
        }
        Ok(Self { matrix })
    }

    pub fn in_dim(&self) -> usize {
        self.matrix.shape().1
    }

    pub fn out_dim(&self) -> usize {
        self.matrix.shape().0
    }
}

impl FeatureTransform for LinearTransform {
    fn transform(&self, x: &[f64]) -> Result<Vec<f64>> {
        let (out_dim, in_dim) = self.matrix.shape();
        if x.len() != in_dim {
            return Err(RerankError::DimensionMismatch { expected: in_dim, found: x.len() });
        }
        Ok((0..out_dim)
            .map(|r| (0..in_dim).map(|c| *self.matrix.get((r, c)) * x[c]).sum())
            .collect())
    }
}

/// Metric plus optional transform: the complete description of how two
/// feature sets are compared.
#[derive(Clone, Default)]
pub struct PairwiseDistance {
    pub metric: DistanceMetric,
    transform: Option<Arc<dyn FeatureTransform>>,
}

impl fmt::Debug for PairwiseDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairwiseDistance")
            .field("metric", &self.metric)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl PairwiseDistance {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric, transform: None }
    }

    pub fn with_transform(mut self, transform: Arc<dyn FeatureTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Rows of `x`, transformed if a transform is configured.
    fn prepare(&self, x: &DenseMatrix<f64>) -> Result<Vec<Vec<f64>>> {
        let rows = matrix_rows(x);
        match &self.transform {
            Some(t) => {
                trace!("Applying feature transform to {} rows", rows.len());
                rows.par_iter().map(|r| t.transform(r)).collect()
            }
            None => Ok(rows),
        }
    }

    /// `m×n` distances between the rows of `x` and the rows of `y`.
    pub fn between(&self, x: &DenseMatrix<f64>, y: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
        let xs = self.prepare(x)?;
        let ys = self.prepare(y)?;
        distance_from_rows(&xs, &ys, self.metric)
    }

    /// `n×n` symmetric distances within the rows of `x`.
    pub fn all_pairs(&self, x: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
        let xs = self.prepare(x)?;
        self_distance_from_rows(&xs, self.metric)
    }
}

/// `m×n` distance matrix between the rows of `x` and `y`.
pub fn pairwise_distance(
    x: &DenseMatrix<f64>,
    y: &DenseMatrix<f64>,
    metric: DistanceMetric,
) -> Result<DenseMatrix<f64>> {
    distance_from_rows(&matrix_rows(x), &matrix_rows(y), metric)
}

/// `n×n` distance matrix within the rows of `x`; symmetric, zero diagonal.
pub fn self_distance(x: &DenseMatrix<f64>, metric: DistanceMetric) -> Result<DenseMatrix<f64>> {
    self_distance_from_rows(&matrix_rows(x), metric)
}

/// Divide every row by its maximum. Rows whose maximum is not positive become zero.
pub fn row_normalise(d: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (rows, cols) = d.shape();
    let normalised: Vec<Vec<f64>> = (0..rows)
        .into_par_iter()
        .map(|i| {
            let row: Vec<f64> = (0..cols).map(|j| *d.get((i, j))).collect();
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max > 0.0 && max.is_finite() {
                row.into_iter().map(|v| v / max).collect()
            } else {
                trace!("Row {} has non-positive maximum {}, normalised to zero", i, max);
                vec![0.0; cols]
            }
        })
        .collect();
    from_rows(normalised, rows, cols)
}

/// Copy the rows of a dense matrix out as owned vectors.
pub fn matrix_rows(x: &DenseMatrix<f64>) -> Vec<Vec<f64>> {
    let (rows, _) = x.shape();
    (0..rows)
        .map(|i| x.get_row(i).iterator(0).copied().collect())
        .collect()
}

/// Build a row-major dense matrix from rows of equal length `cols`.
pub(crate) fn from_rows(rows: Vec<Vec<f64>>, nrows: usize, cols: usize) -> DenseMatrix<f64> {
    let mut flat = Vec::with_capacity(nrows * cols);
    for row in rows {
        flat.extend(row);
    }
    DenseMatrix::from_iterator(flat.into_iter(), nrows, cols, 0)
}

fn check_rows(rows: &[Vec<f64>], what: &'static str) -> Result<usize> {
    let first = rows.first().ok_or(RerankError::EmptyInput(what))?;
    let dim = first.len();
    if dim == 0 {
        return Err(RerankError::EmptyInput("feature vector"));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
        return Err(RerankError::DimensionMismatch { expected: dim, found: bad.len() });
    }
    Ok(dim)
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn squared_norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum()
}

/// Unit-normalise a row; zero rows are returned unchanged.
fn unit(a: &[f64]) -> Vec<f64> {
    let n = squared_norm(a).sqrt();
    if n > 1e-15 {
        a.iter().map(|x| x / n).collect()
    } else {
        a.to_vec()
    }
}

#[inline]
fn entry(metric: DistanceMetric, a: &[f64], b: &[f64], na: f64, nb: f64) -> f64 {
    match metric {
        DistanceMetric::Euclidean => (na + nb - 2.0 * dot(a, b)).max(0.0),
        DistanceMetric::Cosine => (1.0 - dot(a, b)).clamp(0.0, 2.0),
    }
}

/// Rows ready for the inner-product formula plus their squared norms.
fn normalise_for(metric: DistanceMetric, rows: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let prepared: Vec<Vec<f64>> = match metric {
        DistanceMetric::Euclidean => rows.to_vec(),
        DistanceMetric::Cosine => rows.par_iter().map(|r| unit(r)).collect(),
    };
    let norms = prepared.iter().map(|r| squared_norm(r)).collect();
    (prepared, norms)
}

fn distance_from_rows(
    xs: &[Vec<f64>],
    ys: &[Vec<f64>],
    metric: DistanceMetric,
) -> Result<DenseMatrix<f64>> {
    let dx = check_rows(xs, "query features")?;
    let dy = check_rows(ys, "gallery features")?;
    if dx != dy {
        return Err(RerankError::DimensionMismatch { expected: dx, found: dy });
    }
    let (m, n) = (xs.len(), ys.len());
    info!("Computing {} distance matrix {}x{} (d={})", metric, m, n, dx);

    let (xs, xn) = normalise_for(metric, xs);
    let (ys, yn) = normalise_for(metric, ys);

    let rows: Vec<Vec<f64>> = (0..m)
        .into_par_iter()
        .map(|i| (0..n).map(|j| entry(metric, &xs[i], &ys[j], xn[i], yn[j])).collect())
        .collect();

    debug!("Distance matrix {}x{} built", m, n);
    Ok(from_rows(rows, m, n))
}

fn self_distance_from_rows(xs: &[Vec<f64>], metric: DistanceMetric) -> Result<DenseMatrix<f64>> {
    let d = check_rows(xs, "features")?;
    let n = xs.len();
    info!("Computing all-pairs {} distance matrix {}x{} (d={})", metric, n, n, d);

    let (xs, norms) = normalise_for(metric, xs);

    // upper triangle, row i holds columns i+1..n
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| entry(metric, &xs[i], &xs[j], norms[i], norms[j]))
                .collect()
        })
        .collect();

    let mut rows = vec![vec![0.0; n]; n];
    for (i, tail) in upper.iter().enumerate() {
        for (offset, &v) in tail.iter().enumerate() {
            let j = i + 1 + offset;
            rows[i][j] = v;
            rows[j][i] = v;
        }
    }

    debug!("All-pairs distance matrix {}x{} built", n, n);
    Ok(from_rows(rows, n, n))
}
