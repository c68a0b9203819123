use crate::config::{CandidateRadius, DistanceMetric, FusionBase, RerankParams};
use crate::distance::self_distance;
use crate::error::RerankError;
use crate::rerank::*;
use crate::tests::{
    clustered, dense_rows, duplicates, flip_all, flip_gallery, flip_query, init,
};

use approx::assert_relative_eq;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

fn rerank_flip(k1: usize, k2: usize, lambda: f64) -> Vec<f64> {
    let reranker = ReRankerBuilder::new()
        .with_k1(k1)
        .with_k2(k2)
        .with_lambda(lambda)
        .build()
        .unwrap();
    let d = reranker.rerank(&flip_query(), &flip_gallery()).unwrap();
    assert_eq!(d.shape(), (1, 3));
    dense_rows(&d).remove(0)
}

#[test]
fn test_reciprocal_neighbour_overtakes_raw_nearest() {
    init();
    // raw squared distances 25 < 34 < 58 rank A first
    let d = rerank_flip(2, 1, 0.3);
    assert_relative_eq!(d[0], 0.7036584449791574, epsilon = 1e-9);
    assert_relative_eq!(d[1], 0.6106630891642169, epsilon = 1e-9);
    assert_relative_eq!(d[2], 1.0, epsilon = 1e-9);
    assert!(d[1] < d[0], "B shares the query's reciprocal set and must overtake A");
}

#[test]
fn test_k1_one_keeps_raw_order() {
    // with k1 = 1 the query's reciprocal set is only itself
    let d = rerank_flip(1, 1, 0.3);
    assert_relative_eq!(d[0], 0.8293103448275861, epsilon = 1e-9);
    assert_relative_eq!(d[1], 0.8758620689655172, epsilon = 1e-9);
    assert_relative_eq!(d[2], 1.0, epsilon = 1e-9);
    assert!(d[0] < d[1] && d[1] < d[2]);
}

#[test]
fn test_query_expansion_changes_result() {
    let d = rerank_flip(2, 2, 0.3);
    assert_relative_eq!(d[0], 0.38667618739585824, epsilon = 1e-9);
    assert_relative_eq!(d[1], 0.43322791153378926, epsilon = 1e-9);
    assert_relative_eq!(d[2], 0.7666666666666666, epsilon = 1e-9);

    let d = rerank_flip(3, 2, 0.3);
    assert_relative_eq!(d[0], 0.2707580355037357, epsilon = 1e-9);
    assert_relative_eq!(d[1], 0.31730975964166674, epsilon = 1e-9);
    assert_relative_eq!(d[2], 0.4712799211127826, epsilon = 1e-9);
}

#[test]
fn test_lambda_extremes() {
    // pure Jaccard
    let d = rerank_flip(2, 1, 0.0);
    assert_relative_eq!(d[0], 0.8204972859308162, epsilon = 1e-9);
    assert_relative_eq!(d[1], 0.6211443145695709, epsilon = 1e-9);

    // pure normalised original distance
    let d = rerank_flip(2, 1, 1.0);
    assert_relative_eq!(d[0], 25.0 / 58.0, epsilon = 1e-12);
    assert_relative_eq!(d[1], 34.0 / 58.0, epsilon = 1e-12);
    assert_relative_eq!(d[2], 1.0, epsilon = 1e-12);
}

#[test]
fn test_raw_fusion_base() {
    let reranker = ReRankerBuilder::new()
        .with_k1(2)
        .with_k2(1)
        .with_lambda(1.0)
        .with_fusion_base(FusionBase::Raw)
        .build()
        .unwrap();
    let d = dense_rows(&reranker.rerank(&flip_query(), &flip_gallery()).unwrap()).remove(0);
    assert_relative_eq!(d[0], 25.0, epsilon = 1e-9);
    assert_relative_eq!(d[1], 34.0, epsilon = 1e-9);
    assert_relative_eq!(d[2], 58.0, epsilon = 1e-9);
}

#[test]
fn test_final_distance_bounded() {
    init();
    let rows = clustered(5, 8, 6, 3);
    let (q, g) = rows.split_at(10);
    let query = DenseMatrix::from_2d_vec(&q.to_vec()).unwrap();
    let gallery = DenseMatrix::from_2d_vec(&g.to_vec()).unwrap();

    for rule in [CandidateRadius::HalfRoundEven, CandidateRadius::HalfRoundUp] {
        let reranker = ReRankerBuilder::new()
            .with_k1(6)
            .with_k2(3)
            .with_candidate_radius(rule)
            .build()
            .unwrap();
        let d = reranker.rerank(&query, &gallery).unwrap();
        assert_eq!(d.shape(), (10, 30));
        for row in dense_rows(&d) {
            for v in row {
                assert!(v.is_finite());
                assert!((-1e-12..=1.0 + 1e-12).contains(&v), "fused distance {v} out of range");
            }
        }
    }
}

#[test]
fn test_rerank_is_deterministic() {
    let rows = clustered(3, 6, 4, 11);
    let x = DenseMatrix::from_2d_vec(&rows).unwrap();
    let all_pairs = self_distance(&x, DistanceMetric::Euclidean).unwrap();
    let reranker = ReRankerBuilder::new().with_k1(4).with_k2(2).build().unwrap();

    let a = dense_rows(&reranker.rerank_distance(&all_pairs, 5).unwrap());
    let b = dense_rows(&reranker.rerank_distance(&all_pairs, 5).unwrap());
    assert_eq!(a, b);
}

#[test]
fn test_features_and_precomputed_distance_agree() {
    let reranker = ReRankerBuilder::new().with_k1(2).with_k2(1).build().unwrap();
    let from_features = dense_rows(&reranker.rerank(&flip_query(), &flip_gallery()).unwrap());

    let all_pairs = self_distance(&flip_all(), DistanceMetric::Euclidean).unwrap();
    let from_distance = dense_rows(&reranker.rerank_distance(&all_pairs, 1).unwrap());

    for (a, b) in from_features[0].iter().zip(&from_distance[0]) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }

    let params = RerankParams { k1: 2, k2: 1, ..Default::default() };
    let free = dense_rows(&k_reciprocal_rerank(&flip_query(), &flip_gallery(), &params).unwrap());
    assert_eq!(free, from_features);
}

#[test]
fn test_exact_duplicates_stay_finite() {
    init();
    // k1 + 1 < number of duplicates leaves some reciprocal sets empty
    let all = duplicates(4);
    let all_pairs = self_distance(&all, DistanceMetric::Euclidean).unwrap();
    let reranker = ReRankerBuilder::new().with_k1(1).with_k2(1).build().unwrap();
    let d = dense_rows(&reranker.rerank_distance(&all_pairs, 1).unwrap()).remove(0);

    assert_eq!(d.len(), 3);
    assert_relative_eq!(d[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(d[1], 0.7, epsilon = 1e-12);
    assert_relative_eq!(d[2], 0.7, epsilon = 1e-12);
}

#[test]
fn test_cosine_metric() {
    let query = DenseMatrix::from_2d_vec(&vec![vec![1.0, 0.1]]).unwrap();
    let gallery = DenseMatrix::from_2d_vec(&vec![
        vec![2.0, 0.3],
        vec![0.1, 1.0],
        vec![0.0, 3.0],
    ])
    .unwrap();
    let reranker = ReRankerBuilder::new()
        .with_k1(2)
        .with_k2(1)
        .with_metric(DistanceMetric::Cosine)
        .build()
        .unwrap();
    assert_eq!(reranker.distance().metric, DistanceMetric::Cosine);
    let d = dense_rows(&reranker.rerank(&query, &gallery).unwrap()).remove(0);
    assert!(d[0] < d[1] && d[0] < d[2]);
}

#[test]
fn test_invalid_configuration_rejected_at_build() {
    assert!(matches!(
        ReRankerBuilder::new().with_k1(0).build(),
        Err(RerankError::InvalidParameter { name: "k1", .. })
    ));
    assert!(matches!(
        ReRankerBuilder::new().with_lambda(-0.5).build(),
        Err(RerankError::InvalidParameter { name: "lambda", .. })
    ));

    let params = RerankParams { k2: 0, ..Default::default() };
    assert!(k_reciprocal_rerank(&flip_query(), &flip_gallery(), &params).is_err());
}

#[test]
fn test_shape_errors() {
    let reranker = ReRankerBuilder::new().with_k1(2).with_k2(1).build().unwrap();

    let not_square = DenseMatrix::from_2d_vec(&vec![vec![0.0, 1.0, 2.0], vec![1.0, 0.0, 2.0]]).unwrap();
    assert!(matches!(
        reranker.rerank_distance(&not_square, 1),
        Err(RerankError::ShapeMismatch { .. })
    ));

    let all_pairs = self_distance(&flip_all(), DistanceMetric::Euclidean).unwrap();
    assert_eq!(
        reranker.rerank_distance(&all_pairs, 0).unwrap_err(),
        RerankError::EmptyInput("query set")
    );
    assert_eq!(
        reranker.rerank_distance(&all_pairs, 4).unwrap_err(),
        RerankError::EmptyInput("gallery set")
    );

    let three_d = DenseMatrix::from_2d_vec(&vec![vec![0.0, 1.0, 2.0]]).unwrap();
    assert!(matches!(
        reranker.rerank(&three_d, &flip_gallery()),
        Err(RerankError::DimensionMismatch { expected: 3, found: 2 })
    ));
}

#[test]
fn test_builder_keeps_params() {
    let reranker = ReRankerBuilder::new()
        .with_params(RerankParams { k1: 7, k2: 3, lambda: 0.5, ..Default::default() })
        .with_candidate_radius(CandidateRadius::HalfRoundUp)
        .build()
        .unwrap();
    let p = reranker.params();
    assert_eq!((p.k1, p.k2), (7, 3));
    assert_eq!(p.candidate_radius(), 4);
    assert!(!reranker.distance().has_transform());
}

#[test]
fn test_with_distance_sets_metric_and_transform() {
    let projection = crate::distance::LinearTransform::new(
        DenseMatrix::from_2d_vec(&vec![vec![1.0, 0.0]]).unwrap(),
    )
    .unwrap();
    let distance = crate::distance::PairwiseDistance::new(DistanceMetric::Cosine)
        .with_transform(std::sync::Arc::new(projection));
    let reranker = ReRankerBuilder::new().with_distance(distance).build().unwrap();
    assert_eq!(reranker.distance().metric, DistanceMetric::Cosine);
    assert!(reranker.distance().has_transform());
}
