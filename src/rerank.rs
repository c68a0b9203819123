//! k-reciprocal re-ranking pipeline.
//!
//! `ReRankerBuilder` collects the configuration, validates it once in
//! `build()`, and yields a `ReRanker` whose methods are pure functions of
//! their inputs:
//!
//! ```text
//! features ──► all-pairs distance ──► row-max normalisation ──► initial ranking
//!                                                │                    │
//!                                                ▼                    ▼
//!                             k-reciprocal expansion (V) ──► local query expansion
//!                                                                     │
//!                                                                     ▼
//!                                  query×gallery ◄── fusion ◄── Jaccard distance
//! ```
//!
//! ```
//! use reid_rerank::rerank::ReRankerBuilder;
//! use smartcore::linalg::basic::arrays::Array;
//! use smartcore::linalg::basic::matrix::DenseMatrix;
//!
//! let query = DenseMatrix::from_2d_vec(&vec![vec![8.0, 4.0]]).unwrap();
//! let gallery =
//!     DenseMatrix::from_2d_vec(&vec![vec![3.0, 4.0], vec![3.0, 1.0], vec![1.0, 7.0]]).unwrap();
//!
//! let reranker = ReRankerBuilder::new().with_k1(2).with_k2(1).with_lambda(0.3).build().unwrap();
//! let final_dist = reranker.rerank(&query, &gallery).unwrap();
//! assert_eq!(final_dist.shape(), (1, 3));
//! ```

use std::sync::Arc;

use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::{CandidateRadius, DistanceMetric, FusionBase, RerankParams};
use crate::distance::{row_normalise, FeatureTransform, PairwiseDistance};
use crate::error::{RerankError, Result};
use crate::features::stack_rows;
use crate::jaccard::{fuse, jaccard_distance, InvertedIndex};
use crate::query_expansion::local_query_expansion;
use crate::ranking::InitialRanking;
use crate::reciprocal::weighted_neighbours;

use log::{debug, info, trace};

/// Configures and validates a [`ReRanker`].
#[derive(Clone, Debug, Default)]
pub struct ReRankerBuilder {
    params: RerankParams,
    distance: PairwiseDistance,
}

impl ReRankerBuilder {
    pub fn new() -> Self {
        debug!("Creating ReRankerBuilder with default parameters");
        Self::default()
    }

    /// Replace all re-ranking parameters at once.
    pub fn with_params(mut self, params: RerankParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_k1(mut self, k1: usize) -> Self {
        self.params.k1 = k1;
        self
    }

    pub fn with_k2(mut self, k2: usize) -> Self {
        self.params.k2 = k2;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.params.lambda = lambda;
        self
    }

    pub fn with_candidate_radius(mut self, rule: CandidateRadius) -> Self {
        self.params.candidate_radius = rule;
        self
    }

    pub fn with_fusion_base(mut self, base: FusionBase) -> Self {
        self.params.fusion_base = base;
        self
    }

    /// Metric used when re-ranking starts from feature vectors.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance.metric = metric;
        self
    }

    /// Metric and transform together, replacing both.
    pub fn with_distance(mut self, distance: PairwiseDistance) -> Self {
        self.distance = distance;
        self
    }

    /// Transform applied to features before the metric.
    pub fn with_transform(mut self, transform: Arc<dyn FeatureTransform>) -> Self {
        self.distance = self.distance.with_transform(transform);
        self
    }

    /// Validate the configuration. No computation happens before this succeeds.
    pub fn build(self) -> Result<ReRanker> {
        self.params.validate()?;
        info!(
            "ReRanker ready: k1={}, k2={}, lambda={}, metric={}, transform={}",
            self.params.k1,
            self.params.k2,
            self.params.lambda,
            self.distance.metric,
            self.distance.has_transform()
        );
        Ok(ReRanker { params: self.params, distance: self.distance })
    }
}

/// Validated k-reciprocal re-ranker.
#[derive(Clone, Debug)]
pub struct ReRanker {
    params: RerankParams,
    distance: PairwiseDistance,
}

impl ReRanker {
    pub fn params(&self) -> &RerankParams {
        &self.params
    }

    pub fn distance(&self) -> &PairwiseDistance {
        &self.distance
    }

    /// Re-rank from feature vectors: rows of `query` against rows of `gallery`.
    ///
    /// Returns the `m×n` fused distance; lower is a better match.
    pub fn rerank(&self, query: &DenseMatrix<f64>, gallery: &DenseMatrix<f64>) -> Result<DenseMatrix<f64>> {
        let (m, _) = query.shape();
        let (n, _) = gallery.shape();
        if m == 0 {
            return Err(RerankError::EmptyInput("query set"));
        }
        if n == 0 {
            return Err(RerankError::EmptyInput("gallery set"));
        }
        let all = stack_rows(query, gallery)?;
        let all_pairs = self.distance.all_pairs(&all)?;
        self.rerank_distance(&all_pairs, m)
    }

    /// Re-rank from a precomputed all-pairs distance over `n_query` queries
    /// followed by the gallery items.
    pub fn rerank_distance(&self, all_pairs: &DenseMatrix<f64>, n_query: usize) -> Result<DenseMatrix<f64>> {
        let (rows, cols) = all_pairs.shape();
        if rows != cols {
            return Err(RerankError::ShapeMismatch {
                what: "all-pairs distance matrix",
                expected: (rows, rows),
                found: (rows, cols),
            });
        }
        if n_query == 0 {
            return Err(RerankError::EmptyInput("query set"));
        }
        if n_query >= rows {
            return Err(RerankError::EmptyInput("gallery set"));
        }

        let RerankParams { k1, k2, lambda, fusion_base, .. } = self.params;
        let radius = self.params.candidate_radius();
        info!(
            "Starting re-ranking: {} queries, {} gallery items, k1={}, k2={}, radius={}",
            n_query,
            rows - n_query,
            k1,
            k2,
            radius
        );

        // normalised once, before any row is expanded
        let normalised = row_normalise(all_pairs);
        let depth = (k1 + 1).max(k2);
        let ranking = InitialRanking::from_distance(&normalised, depth);

        let v = weighted_neighbours(&normalised, &ranking, k1, radius)?;
        let v = local_query_expansion(&v, &ranking, k2);
        drop(ranking);

        let index = InvertedIndex::build(&v);
        trace!("Inverted index holds {} entries", index.nnz());
        let jaccard = jaccard_distance(&v, &index, n_query);

        let base = match fusion_base {
            FusionBase::Normalised => &normalised,
            FusionBase::Raw => all_pairs,
        };
        let final_dist = fuse(jaccard, base, n_query, lambda);

        info!("Re-ranking completed: {:?} final distance matrix", final_dist.shape());
        Ok(final_dist)
    }
}

/// One-shot re-ranking with explicit parameters and the default Euclidean metric.
pub fn k_reciprocal_rerank(
    query: &DenseMatrix<f64>,
    gallery: &DenseMatrix<f64>,
    params: &RerankParams,
) -> Result<DenseMatrix<f64>> {
    ReRankerBuilder::new()
        .with_params(params.clone())
        .build()?
        .rerank(query, gallery)
}
