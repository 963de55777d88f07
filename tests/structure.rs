use approx::assert_abs_diff_eq;
use ndarray::{Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seer::structure::{
    LapackEigensolver, SampleMatrix, StructureError, compute_dissimilarity, compute_mds,
    metric_mds,
};

fn random_samples(seed: u64, n: usize, features: usize) -> SampleMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    SampleMatrix::new(Array2::from_shape_fn((n, features), |_| {
        u8::from(rng.gen_bool(0.5))
    }))
    .unwrap()
}

#[test]
fn dissimilarity_matches_brute_force_manhattan_distance() {
    let samples = random_samples(3, 23, 31);
    let dist = compute_dissimilarity(&samples, 3).unwrap();
    for i in 0..23 {
        assert_eq!(dist[[i, i]], 0.0);
        for j in 0..23 {
            let expected = samples
                .row(i)
                .iter()
                .zip(samples.row(j).iter())
                .filter(|(a, b)| a != b)
                .count() as f64;
            assert_eq!(dist[[i, j]], expected, "cell ({i}, {j})");
        }
    }
}

#[test]
fn dissimilarity_is_identical_for_any_thread_count() {
    let samples = random_samples(11, 40, 64);
    let serial = compute_dissimilarity(&samples, 1).unwrap();
    for threads in [2, 5, 16] {
        assert_eq!(compute_dissimilarity(&samples, threads).unwrap(), serial);
    }
}

#[test]
fn one_dimensional_embedding_reproduces_line_distances() {
    // Nested presence sets sit on a line: d(i, j) = |i - j|.
    let samples = SampleMatrix::new(array![
        [0u8, 0, 0, 0],
        [1, 0, 0, 0],
        [1, 1, 0, 0],
        [1, 1, 1, 0],
        [1, 1, 1, 1],
    ])
    .unwrap();
    let embedding = compute_mds(&samples, 1, 2).unwrap();
    assert_eq!(embedding.coordinates.dim(), (5, 1));

    let x = embedding.coordinates.column(0);
    for i in 0..5 {
        for j in 0..5 {
            assert_abs_diff_eq!(
                (x[i] - x[j]).abs(),
                (i as f64 - j as f64).abs(),
                epsilon = 1e-8
            );
        }
    }
    assert_abs_diff_eq!(x.sum(), 0.0, epsilon = 1e-8);
}

#[test]
fn embedding_columns_are_ordered_by_variance() {
    let samples = random_samples(5, 30, 50);
    let embedding = compute_mds(&samples, 4, 4).unwrap();
    let variance: Vec<f64> = embedding
        .coordinates
        .columns()
        .into_iter()
        .map(|c| c.dot(&c))
        .collect();
    for pair in variance.windows(2) {
        assert!(pair[0] >= pair[1] - 1e-8, "{variance:?}");
    }
    for (col, lambda) in variance.iter().zip(embedding.eigenvalues.iter()) {
        assert_abs_diff_eq!(*col, lambda.max(0.0), epsilon = 1e-6);
    }
}

#[test]
fn too_many_dimensions_is_rejected_before_any_work() {
    let samples = random_samples(1, 4, 6);
    let err = compute_mds(&samples, 5, 2).unwrap_err();
    assert!(matches!(
        err,
        StructureError::InvalidDimensionRequest {
            requested: 5,
            samples: 4
        }
    ));
    assert!(metric_mds(&Array2::zeros((4, 4)), 0, &LapackEigensolver).is_err());
}
