//! # Ranking evaluation: mean Average Precision and CMC curves
//!
//! Both metrics rank each query's gallery by ascending distance (ties by
//! gallery index) and ignore *junk* entries: gallery items showing the same
//! person from the same camera as the query, which are trivially easy matches.
//!
//! CMC scores depend on three protocol flags and are only comparable within a
//! protocol:
//!
//! | protocol     | separate_camera_set | single_gallery_shot | first_match_break |
//! |--------------|---------------------|---------------------|-------------------|
//! | `allshots`   | false               | false               | false             |
//! | `market1501` | false               | false               | true              |
//! | `dukemtmc`   | false               | true                | false             |
//! | `cuhk03`     | true                | true                | false             |
//!
//! `allshots` is always reported next to the configured protocol.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::config::{EvalParams, RerankParams};
use crate::distance::PairwiseDistance;
use crate::error::{RerankError, Result};
use crate::features::{camera_ids, person_ids, FeatureStore, LabelledItem};
use crate::ranking::argsort;
use crate::rerank::ReRankerBuilder;

use log::{debug, info, warn};

/// Name of the protocol that is always evaluated.
pub const ALLSHOTS: &str = "allshots";

/// Number of random gallery draws per query under single-gallery-shot.
pub const SINGLE_SHOT_REPEATS: usize = 10;

/// Flags controlling how a CMC curve is accumulated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmcFlags {
    /// Drop every gallery item from the query's camera.
    pub separate_camera_set: bool,
    /// Keep one randomly drawn gallery item per person id (repeated draws).
    pub single_gallery_shot: bool,
    /// Count only the first correct match of each query.
    pub first_match_break: bool,
}

impl CmcFlags {
    pub const ALL_SHOTS: CmcFlags = CmcFlags {
        separate_camera_set: false,
        single_gallery_shot: false,
        first_match_break: false,
    };
}

/// Named evaluation protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Market1501,
    DukeMtmc,
    Cuhk03,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Market1501 => "market1501",
            Protocol::DukeMtmc => "dukemtmc",
            Protocol::Cuhk03 => "cuhk03",
        }
    }

    pub fn flags(self) -> CmcFlags {
        match self {
            Protocol::Market1501 => CmcFlags {
                separate_camera_set: false,
                single_gallery_shot: false,
                first_match_break: true,
            },
            Protocol::DukeMtmc => CmcFlags {
                separate_camera_set: false,
                single_gallery_shot: true,
                first_match_break: false,
            },
            Protocol::Cuhk03 => CmcFlags {
                separate_camera_set: true,
                single_gallery_shot: true,
                first_match_break: false,
            },
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = RerankError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "market1501" => Ok(Protocol::Market1501),
            "dukemtmc" => Ok(Protocol::DukeMtmc),
            "cuhk03" => Ok(Protocol::Cuhk03),
            _ => Err(RerankError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Person and camera ids of the query and gallery sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroundTruth {
    pub query_ids: Vec<i64>,
    pub gallery_ids: Vec<i64>,
    pub query_cams: Vec<i64>,
    pub gallery_cams: Vec<i64>,
}

impl GroundTruth {
    pub fn new(
        query_ids: Vec<i64>,
        gallery_ids: Vec<i64>,
        query_cams: Vec<i64>,
        gallery_cams: Vec<i64>,
    ) -> Result<Self> {
        if query_ids.len() != query_cams.len() {
            return Err(RerankError::ShapeMismatch {
                what: "query camera ids",
                expected: (query_ids.len(), 1),
                found: (query_cams.len(), 1),
            });
        }
        if gallery_ids.len() != gallery_cams.len() {
            return Err(RerankError::ShapeMismatch {
                what: "gallery camera ids",
                expected: (gallery_ids.len(), 1),
                found: (gallery_cams.len(), 1),
            });
        }
        Ok(Self { query_ids, gallery_ids, query_cams, gallery_cams })
    }

    pub fn from_items(query: &[LabelledItem], gallery: &[LabelledItem]) -> Self {
        Self {
            query_ids: person_ids(query),
            gallery_ids: person_ids(gallery),
            query_cams: camera_ids(query),
            gallery_cams: camera_ids(gallery),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.query_ids.len(), self.gallery_ids.len())
    }

    fn check(&self, distmat: &DenseMatrix<f64>) -> Result<()> {
        if distmat.shape() != self.shape() {
            return Err(RerankError::ShapeMismatch {
                what: "distance matrix vs. labels",
                expected: self.shape(),
                found: distmat.shape(),
            });
        }
        Ok(())
    }

    /// Whether gallery item `g` is usable for query `q`.
    #[inline]
    fn is_valid(&self, q: usize, g: usize, remove_junk: bool, separate_camera_set: bool) -> bool {
        let same_cam = self.gallery_cams[g] == self.query_cams[q];
        if separate_camera_set && same_cam {
            return false;
        }
        !(remove_junk && same_cam && self.gallery_ids[g] == self.query_ids[q])
    }
}

fn sorted_row(distmat: &DenseMatrix<f64>, q: usize) -> (Vec<usize>, Vec<f64>) {
    let (_, n) = distmat.shape();
    let row: Vec<f64> = (0..n).map(|j| *distmat.get((q, j))).collect();
    (argsort(&row), row)
}

/// Average precision of a ranked list.
///
/// `relevant[k]` marks the k-th ranked item as a true match and `distances`
/// holds the (ascending) distances. Items at equal distance form one
/// threshold, as in scikit-learn's `average_precision_score`. Returns
/// `Ok(None)` when nothing is relevant.
pub fn average_precision(relevant: &[bool], distances: &[f64]) -> Result<Option<f64>> {
    if relevant.len() != distances.len() {
        return Err(RerankError::ShapeMismatch {
            what: "relevance labels vs. distances",
            expected: (relevant.len(), 1),
            found: (distances.len(), 1),
        });
    }
    let total = relevant.iter().filter(|&&r| r).count();
    if total == 0 {
        return Ok(None);
    }

    let (mut tp, mut fp, mut prev_tp) = (0usize, 0usize, 0usize);
    let mut ap = 0.0;
    let mut k = 0;
    while k < relevant.len() {
        let d = distances[k];
        loop {
            if relevant[k] {
                tp += 1;
            } else {
                fp += 1;
            }
            k += 1;
            if k == relevant.len() || distances[k] != d {
                break;
            }
        }
        if tp > prev_tp {
            let recall_gain = (tp - prev_tp) as f64 / total as f64;
            ap += recall_gain * tp as f64 / (tp + fp) as f64;
            prev_tp = tp;
        }
    }
    Ok(Some(ap))
}

/// Mean average precision over queries with at least one valid match.
pub fn mean_ap(distmat: &DenseMatrix<f64>, gt: &GroundTruth, remove_junk: bool) -> Result<f64> {
    gt.check(distmat)?;
    let (m, _) = distmat.shape();

    let aps: Vec<Option<f64>> = (0..m)
        .into_par_iter()
        .map(|q| {
            let (order, row) = sorted_row(distmat, q);
            let (relevant, distances): (Vec<bool>, Vec<f64>) = order
                .into_iter()
                .filter(|&g| gt.is_valid(q, g, remove_junk, false))
                .map(|g| (gt.gallery_ids[g] == gt.query_ids[q], row[g]))
                .unzip();
            average_precision(&relevant, &distances)
        })
        .collect::<Result<_>>()?;

    let valid: Vec<f64> = aps.into_iter().flatten().collect();
    if valid.is_empty() {
        return Err(RerankError::NoValidQuery);
    }
    if valid.len() < m {
        debug!("{} of {} queries have no valid match and are excluded from mAP", m - valid.len(), m);
    }
    Ok(valid.iter().sum::<f64>() / valid.len() as f64)
}

/// One random gallery position per person id, ascending.
fn sample_one_per_identity(groups: &[Vec<usize>], rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut picked: Vec<usize> = groups
        .iter()
        .map(|g| g[rng.random_range(0..g.len())])
        .collect();
    picked.sort_unstable();
    picked
}

/// Per-rank increments contributed by query `q`, or `None` if it has no valid match.
fn cmc_row(
    distmat: &DenseMatrix<f64>,
    gt: &GroundTruth,
    q: usize,
    flags: CmcFlags,
    max_rank: usize,
    remove_junk: bool,
    seed: u64,
) -> Option<Vec<f64>> {
    let (order, _) = sorted_row(distmat, q);
    let matches: Vec<bool> = order.iter().map(|&g| gt.gallery_ids[g] == gt.query_ids[q]).collect();
    let valid: Vec<bool> = order
        .iter()
        .map(|&g| gt.is_valid(q, g, remove_junk, flags.separate_camera_set))
        .collect();

    if !matches.iter().zip(&valid).any(|(&m, &v)| m && v) {
        return None;
    }

    let valid_positions: Vec<usize> = (0..order.len()).filter(|&k| valid[k]).collect();
    let mut ret = vec![0.0; max_rank];

    let accumulate = |positions: &[usize], repeat: usize, ret: &mut Vec<f64>| {
        let hits: Vec<usize> = positions
            .iter()
            .enumerate()
            .filter(|&(_, &pos)| matches[pos])
            .map(|(k, _)| k)
            .collect();
        if hits.is_empty() {
            return;
        }
        let delta = 1.0 / (hits.len() * repeat) as f64;
        for (j, &k) in hits.iter().enumerate() {
            if k - j >= max_rank {
                break;
            }
            if flags.first_match_break {
                ret[k - j] += 1.0;
                break;
            }
            ret[k - j] += delta;
        }
    };

    if flags.single_gallery_shot {
        // identities in ranked order of first appearance
        let mut slot: HashMap<i64, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for &pos in &valid_positions {
            let pid = gt.gallery_ids[order[pos]];
            let s = *slot.entry(pid).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[s].push(pos);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(q as u64));
        for _ in 0..SINGLE_SHOT_REPEATS {
            let sampled = sample_one_per_identity(&groups, &mut rng);
            accumulate(&sampled, SINGLE_SHOT_REPEATS, &mut ret);
        }
    } else {
        accumulate(&valid_positions, 1, &mut ret);
    }
    Some(ret)
}

/// Cumulative match characteristic: `curve[k]` is the rate of queries whose
/// first correct match is within rank `k + 1`.
pub fn cmc(
    distmat: &DenseMatrix<f64>,
    gt: &GroundTruth,
    flags: CmcFlags,
    max_rank: usize,
    remove_junk: bool,
    seed: u64,
) -> Result<Vec<f64>> {
    gt.check(distmat)?;
    let (m, _) = distmat.shape();
    debug!("CMC with {:?}, max_rank={}", flags, max_rank);

    let rows: Vec<Option<Vec<f64>>> = (0..m)
        .into_par_iter()
        .map(|q| cmc_row(distmat, gt, q, flags, max_rank, remove_junk, seed))
        .collect();

    let mut ret = vec![0.0; max_rank];
    let mut num_valid = 0usize;
    for row in rows.into_iter().flatten() {
        for (acc, v) in ret.iter_mut().zip(row) {
            *acc += v;
        }
        num_valid += 1;
    }
    if num_valid == 0 {
        return Err(RerankError::NoValidQuery);
    }

    let mut running = 0.0;
    Ok(ret
        .into_iter()
        .map(|v| {
            running += v;
            running / num_valid as f64
        })
        .collect())
}

/// mAP plus one CMC curve per evaluated protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub mean_ap: f64,
    /// protocol name → cumulative match rates, index 0 is rank 1
    pub cmc: BTreeMap<String, Vec<f64>>,
    pub protocol: Protocol,
    pub cmc_topk: Vec<usize>,
}

impl EvaluationReport {
    /// Curve of the protocol called `name`.
    pub fn curve(&self, name: &str) -> Option<&[f64]> {
        self.cmc.get(name).map(Vec::as_slice)
    }

    /// 1-based rank `k` of the active protocol.
    pub fn rank(&self, k: usize) -> Option<f64> {
        if k == 0 {
            return None;
        }
        self.curve(self.protocol.name()).and_then(|c| c.get(k - 1)).copied()
    }

    /// Rank-1 score of the active protocol.
    pub fn top1(&self) -> f64 {
        self.rank(1).unwrap_or(0.0)
    }
}

/// Tracks the best rank-1 score seen so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BestScore {
    best: Option<f64>,
}

impl BestScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `score`; true when it strictly beats every earlier score.
    pub fn observe(&mut self, score: f64) -> bool {
        if !score.is_finite() {
            warn!("Ignoring non-finite score {}", score);
            return false;
        }
        let improved = self.best.map_or(true, |b| score > b);
        if improved {
            self.best = Some(score);
        }
        improved
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

/// Runs mAP and CMC under a validated [`EvalParams`].
#[derive(Clone, Debug)]
pub struct Evaluator {
    params: EvalParams,
}

impl Evaluator {
    pub fn new(params: EvalParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &EvalParams {
        &self.params
    }

    /// Evaluate a query×gallery distance matrix against item labels.
    pub fn evaluate(
        &self,
        distmat: &DenseMatrix<f64>,
        query: &[LabelledItem],
        gallery: &[LabelledItem],
    ) -> Result<EvaluationReport> {
        self.evaluate_ground_truth(distmat, &GroundTruth::from_items(query, gallery))
    }

    pub fn evaluate_ground_truth(
        &self,
        distmat: &DenseMatrix<f64>,
        gt: &GroundTruth,
    ) -> Result<EvaluationReport> {
        gt.check(distmat)?;
        let p = &self.params;

        let mean_ap = mean_ap(distmat, gt, p.remove_same_camera_matches)?;
        info!("Mean AP: {:4.1}%", mean_ap * 100.0);

        let protocols = [(ALLSHOTS, CmcFlags::ALL_SHOTS), (p.protocol.name(), p.protocol.flags())];
        let mut curves = BTreeMap::new();
        for (name, flags) in protocols {
            let curve = cmc(distmat, gt, flags, p.max_rank, p.remove_same_camera_matches, p.seed)?;
            curves.insert(name.to_string(), curve);
        }

        info!("CMC Scores{:>12}", p.protocol.name());
        if let Some(curve) = curves.get(p.protocol.name()) {
            for &k in &p.cmc_topk {
                info!("  rank-{:<4}{:11.1}%", k, curve[k - 1] * 100.0);
            }
        }

        Ok(EvaluationReport {
            mean_ap,
            cmc: curves,
            protocol: p.protocol,
            cmc_topk: p.cmc_topk.clone(),
        })
    }

    /// Full flow from stored features: gather query and gallery rows, compute
    /// their distance with `distance` and, when `rerank` is given, re-rank on
    /// top of that same distance before evaluating.
    pub fn evaluate_features(
        &self,
        store: &FeatureStore,
        query: &[LabelledItem],
        gallery: &[LabelledItem],
        distance: &PairwiseDistance,
        rerank: Option<&RerankParams>,
    ) -> Result<EvaluationReport> {
        let qx = store.gather(query)?;
        let gx = store.gather(gallery)?;
        let distmat = match rerank {
            Some(params) => {
                info!("Evaluating with k-reciprocal re-ranking ({} distance)", distance.metric);
                ReRankerBuilder::new()
                    .with_params(params.clone())
                    .with_distance(distance.clone())
                    .build()?
                    .rerank(&qx, &gx)?
            }
            None => distance.between(&qx, &gx)?,
        };
        self.evaluate(&distmat, query, gallery)
    }
}
