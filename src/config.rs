//! Typed configuration for re-ranking and evaluation.
//!
//! Every knob has a documented default and a `validate()` that fails fast, so
//! a malformed configuration is rejected before any matrix is built. The
//! structs derive `serde` traits so callers can embed them in their own
//! configuration files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RerankError, Result};
use crate::evaluation::Protocol;

use log::debug;

/// Default neighbourhood size for the k-reciprocal sets.
pub const DEFAULT_K1: usize = 20;
/// Default local query expansion width.
pub const DEFAULT_K2: usize = 6;
/// Default weight of the original distance in the fused distance.
pub const DEFAULT_LAMBDA: f64 = 0.3;
/// Default CMC reporting cutoffs (1-based ranks).
pub const DEFAULT_CMC_TOPK: [usize; 3] = [1, 5, 10];
/// Default length of the stored CMC curve.
pub const DEFAULT_CMC_MAX_RANK: usize = 100;
/// Default seed of the single-gallery-shot sampler.
pub const DEFAULT_EVAL_SEED: u64 = 1;

/// Distance used to compare feature vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance `||x||² + ||y||² - 2 x·y`.
    #[default]
    Euclidean,
    /// `1 - cos(x, y)` on unit-normalised vectors.
    Cosine,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = RerankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(RerankError::invalid(
                "metric",
                format!("`{other}` is not one of euclidean, cosine"),
            )),
        }
    }
}

/// Radius used when testing whether a candidate's own reciprocal set should be
/// merged into the expansion set.
///
/// Two rounding rules for "half of k1" are in circulation; both are kept
/// selectable so results can be reproduced against either.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRadius {
    /// `round(k1 / 2)` with ties to even: 1 → 0, 3 → 2, 5 → 2, 20 → 10.
    #[default]
    HalfRoundEven,
    /// `(k1 + 1) / 2` in integer arithmetic: 1 → 1, 3 → 2, 5 → 3, 20 → 10.
    HalfRoundUp,
}

impl CandidateRadius {
    pub fn radius(self, k1: usize) -> usize {
        match self {
            CandidateRadius::HalfRoundEven => (k1 as f64 / 2.0).round_ties_even() as usize,
            CandidateRadius::HalfRoundUp => (k1 + 1) / 2,
        }
    }
}

/// Which distance the Jaccard term is fused with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionBase {
    /// Row-max normalised distance; keeps the fused distance in `[0, 1]`.
    /// This is the matrix the reference k-reciprocal implementation fuses with.
    #[default]
    Normalised,
    /// The distance matrix exactly as it was passed in.
    Raw,
}

/// Parameters of k-reciprocal re-ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankParams {
    pub k1: usize,
    pub k2: usize,
    pub lambda: f64,
    #[serde(default)]
    pub candidate_radius: CandidateRadius,
    #[serde(default)]
    pub fusion_base: FusionBase,
}

impl Default for RerankParams {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            k2: DEFAULT_K2,
            lambda: DEFAULT_LAMBDA,
            candidate_radius: CandidateRadius::default(),
            fusion_base: FusionBase::default(),
        }
    }
}

// float fields compare approximately, integer fields exactly
impl PartialEq for RerankParams {
    fn eq(&self, other: &Self) -> bool {
        self.k1 == other.k1
            && self.k2 == other.k2
            && approx::relative_eq!(self.lambda, other.lambda)
            && self.candidate_radius == other.candidate_radius
            && self.fusion_base == other.fusion_base
    }
}

impl RerankParams {
    pub fn validate(&self) -> Result<()> {
        if self.k1 == 0 {
            return Err(RerankError::invalid("k1", "must be at least 1"));
        }
        if self.k2 == 0 {
            return Err(RerankError::invalid("k2", "must be at least 1"));
        }
        if !self.lambda.is_finite() || !(0.0..=1.0).contains(&self.lambda) {
            return Err(RerankError::invalid(
                "lambda",
                format!("{} is outside [0, 1]", self.lambda),
            ));
        }
        debug!(
            "Re-ranking parameters accepted: k1={}, k2={}, lambda={}, radius={:?}, fusion={:?}",
            self.k1, self.k2, self.lambda, self.candidate_radius, self.fusion_base
        );
        Ok(())
    }

    /// Radius of the candidate reciprocal test for the configured `k1`.
    pub fn candidate_radius(&self) -> usize {
        self.candidate_radius.radius(self.k1)
    }
}

/// Parameters of the mAP/CMC evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalParams {
    /// Protocol whose rank-1 score is reported as the headline number.
    pub protocol: Protocol,
    /// 1-based ranks logged and exposed through `EvaluationReport::rank`.
    pub cmc_topk: Vec<usize>,
    /// Number of ranks stored per CMC curve.
    pub max_rank: usize,
    /// Drop gallery entries sharing both person id and camera with the query.
    pub remove_same_camera_matches: bool,
    /// Seed for the single-gallery-shot sampler.
    pub seed: u64,
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            cmc_topk: DEFAULT_CMC_TOPK.to_vec(),
            max_rank: DEFAULT_CMC_MAX_RANK,
            remove_same_camera_matches: true,
            seed: DEFAULT_EVAL_SEED,
        }
    }
}

impl EvalParams {
    /// Default parameters for the protocol called `name`.
    pub fn for_protocol(name: &str) -> Result<Self> {
        Ok(Self { protocol: name.parse()?, ..Self::default() })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rank == 0 {
            return Err(RerankError::invalid("max_rank", "must be at least 1"));
        }
        if self.cmc_topk.is_empty() {
            return Err(RerankError::invalid("cmc_topk", "at least one cutoff is required"));
        }
        if let Some(&bad) = self.cmc_topk.iter().find(|&&k| k == 0 || k > self.max_rank) {
            return Err(RerankError::invalid(
                "cmc_topk",
                format!("cutoff {bad} is outside [1, {}]", self.max_rank),
            ));
        }
        Ok(())
    }
}
