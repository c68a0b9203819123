//! # reid-rerank
//!
//! k-reciprocal re-ranking with Jaccard distance fusion for person
//! re-identification, plus mAP/CMC evaluation.
//!
//! Given embedding vectors for a query set and a gallery set, the initial
//! ranking comes from a plain pairwise distance. Re-ranking then looks at the
//! *mutual* neighbourhood structure of the combined set: two images that keep
//! appearing in each other's nearest-neighbour lists most likely show the same
//! person, even when their raw distance is not the smallest. Each item is
//! encoded as a weighted vector over its expanded k-reciprocal neighbours, the
//! weighted Jaccard distance between those vectors is computed through an
//! inverted index, and the result is linearly blended with the original
//! distance.
//!
//! Modules, leaf first:
//!
//! - [`distance`]: squared-Euclidean and cosine distance matrices
//! - [`ranking`]: truncated argsort and the reciprocal-neighbour test
//! - [`reciprocal`]: expanded k-reciprocal sets and the weighted-neighbour matrix
//! - [`query_expansion`]: local query expansion over the top-k2 neighbours
//! - [`jaccard`]: inverted index, Jaccard distance, fusion
//! - [`rerank`]: the configured pipeline (`ReRankerBuilder` → `ReRanker`)
//! - [`evaluation`]: mAP, CMC protocols and the evaluation report
//!
//! ```
//! use reid_rerank::config::EvalParams;
//! use reid_rerank::evaluation::Evaluator;
//! use reid_rerank::features::LabelledItem;
//! use reid_rerank::rerank::ReRankerBuilder;
//! use smartcore::linalg::basic::matrix::DenseMatrix;
//!
//! let query = DenseMatrix::from_2d_vec(&vec![vec![0.0, 1.0], vec![5.0, 5.0]]).unwrap();
//! let gallery = DenseMatrix::from_2d_vec(&vec![
//!     vec![0.1, 1.1],
//!     vec![5.2, 4.9],
//!     vec![9.0, 0.0],
//! ])
//! .unwrap();
//!
//! let reranker = ReRankerBuilder::new().with_k1(2).with_k2(1).build().unwrap();
//! let distmat = reranker.rerank(&query, &gallery).unwrap();
//!
//! let q = vec![LabelledItem::new("q0", 1, 0), LabelledItem::new("q1", 2, 0)];
//! let g = vec![
//!     LabelledItem::new("g0", 1, 1),
//!     LabelledItem::new("g1", 2, 1),
//!     LabelledItem::new("g2", 3, 1),
//! ];
//! let report = Evaluator::new(EvalParams::default()).unwrap().evaluate(&distmat, &q, &g).unwrap();
//! assert!((report.mean_ap - 1.0).abs() < 1e-12);
//! assert!((report.top1() - 1.0).abs() < 1e-12);
//! ```

pub mod config;
pub mod distance;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod jaccard;
pub mod query_expansion;
pub mod ranking;
pub mod reciprocal;
pub mod rerank;

pub use config::{CandidateRadius, DistanceMetric, EvalParams, FusionBase, RerankParams};
pub use error::{RerankError, Result};
pub use evaluation::{EvaluationReport, Evaluator, Protocol};
pub use rerank::{ReRanker, ReRankerBuilder};

#[cfg(test)]
mod tests;
