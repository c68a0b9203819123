//! Feature collections: identifier-keyed vectors and labelled query/gallery items.
//!
//! Features are produced by an external embedding model; this module only
//! stores them and lays them out as row-major matrices in the order of a
//! query or gallery list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{RerankError, Result};

use log::{debug, info};

/// One query or gallery entry: identifier plus ground-truth labels.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelledItem {
    pub id: String,
    pub pid: i64,
    pub cam: i64,
}

impl LabelledItem {
    pub fn new(id: impl Into<String>, pid: i64, cam: i64) -> Self {
        Self { id: id.into(), pid, cam }
    }
}

/// Person ids of `items`, in order.
pub fn person_ids(items: &[LabelledItem]) -> Vec<i64> {
    items.iter().map(|it| it.pid).collect()
}

/// Camera ids of `items`, in order.
pub fn camera_ids(items: &[LabelledItem]) -> Vec<i64> {
    items.iter().map(|it| it.cam).collect()
}

/// Identifier → feature vector map with a fixed dimensionality.
#[derive(Clone, Debug, Default)]
pub struct FeatureStore {
    dim: Option<usize>,
    vectors: HashMap<String, Vec<f64>>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `vector` under `id`. The first vector fixes the dimensionality.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f64>) -> Result<()> {
        let id = id.into();
        if vector.is_empty() {
            return Err(RerankError::EmptyInput("feature vector"));
        }
        match self.dim {
            Some(expected) if expected != vector.len() => {
                return Err(RerankError::DimensionMismatch { expected, found: vector.len() });
            }
            None => self.dim = Some(vector.len()),
            _ => {}
        }
        if self.vectors.contains_key(&id) {
            return Err(RerankError::DuplicateIdentifier(id));
        }
        self.vectors.insert(id, vector);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Row-major matrix with one row per item, in the order of `items`.
    pub fn gather(&self, items: &[LabelledItem]) -> Result<DenseMatrix<f64>> {
        if items.is_empty() {
            return Err(RerankError::EmptyInput("item list"));
        }
        let dim = self.dim.ok_or(RerankError::EmptyInput("feature store"))?;

        let mut flat = Vec::with_capacity(items.len() * dim);
        for item in items {
            let v = self
                .vectors
                .get(&item.id)
                .ok_or_else(|| RerankError::UnknownIdentifier(item.id.clone()))?;
            flat.extend_from_slice(v);
        }
        debug!("Gathered {} feature rows of dimension {}", items.len(), dim);
        Ok(DenseMatrix::from_iterator(flat.into_iter(), items.len(), dim, 0))
    }
}

impl FeatureStore {
    /// Build a store from `(id, vector)` pairs, failing on the first pair
    /// `insert` would reject.
    pub fn try_from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f64>)>,
    {
        let mut store = FeatureStore::new();
        for (id, v) in iter {
            store.insert(id, v)?;
        }
        info!("FeatureStore built with {} vectors", store.len());
        Ok(store)
    }
}

/// Stack two matrices with equal column counts vertically (`top` rows first).
pub fn stack_rows(top: &DenseMatrix<f64>, bottom: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
    let (m, d) = top.shape();
    let (n, d2) = bottom.shape();
    if d != d2 {
        return Err(RerankError::DimensionMismatch { expected: d, found: d2 });
    }
    let mut flat = Vec::with_capacity((m + n) * d);
    for src in [top, bottom] {
        let rows = src.shape().0;
        for i in 0..rows {
            flat.extend((0..d).map(|j| *src.get((i, j))));
        }
    }
    Ok(DenseMatrix::from_iterator(flat.into_iter(), m + n, d, 0))
}
