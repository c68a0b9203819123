use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::prelude::*;
use reid_rerank::config::DistanceMetric;
use reid_rerank::distance::self_distance;
use reid_rerank::rerank::ReRankerBuilder;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::hint::black_box;
use std::time::Duration;

/// `ids` identities seen `shots` times each, jittered around a random centre.
fn identities(ids: usize, shots: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(ids * shots);
    for _ in 0..ids {
        let centre: Vec<f64> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
        for _ in 0..shots {
            rows.push(centre.iter().map(|c| c + rng.random_range(-0.2..0.2)).collect());
        }
    }
    rows
}

/// Every `shots`-th row becomes a query, the rest form the gallery.
fn setup(ids: usize, shots: usize, dim: usize) -> (DenseMatrix<f64>, DenseMatrix<f64>) {
    let rows = identities(ids, shots, dim, 42);
    let (mut query, mut gallery) = (Vec::new(), Vec::new());
    for (i, row) in rows.into_iter().enumerate() {
        if i % shots == 0 {
            query.push(row);
        } else {
            gallery.push(row);
        }
    }
    (
        DenseMatrix::from_2d_vec(&query).unwrap(),
        DenseMatrix::from_2d_vec(&gallery).unwrap(),
    )
}

pub fn criterion_benchmark(c: &mut Criterion) {
    {
        // sanity: output is query × gallery
        let (q, g) = setup(20, 4, 32);
        let d = ReRankerBuilder::new().build().unwrap().rerank(&q, &g).unwrap();
        assert_eq!(d.shape(), (q.shape().0, g.shape().0));
    }

    let mut group = c.benchmark_group("k_reciprocal");
    group.warm_up_time(Duration::from_millis(300));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    for &ids in &[50usize, 100, 200] {
        let label = format!("ids{ids}_shots5");

        group.bench_function(BenchmarkId::new("all_pairs_euclidean", &label), |b| {
            b.iter_batched(
                || setup(ids, 5, 128),
                |(q, g)| {
                    let all = reid_rerank::features::stack_rows(&q, &g).unwrap();
                    black_box(self_distance(&all, DistanceMetric::Euclidean).unwrap());
                },
                BatchSize::SmallInput,
            )
        });

        for &(k1, k2) in &[(20usize, 6usize), (10, 1)] {
            let reranker = ReRankerBuilder::new().with_k1(k1).with_k2(k2).build().unwrap();
            group.bench_function(BenchmarkId::new(format!("rerank_k1={k1}_k2={k2}"), &label), |b| {
                b.iter_batched(
                    || setup(ids, 5, 128),
                    |(q, g)| {
                        black_box(reranker.rerank(&q, &g).unwrap());
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
