use super::StructureError;
use super::distance::compute_dissimilarity;
use super::matrix::SampleMatrix;
use ndarray::{Array1, Array2, Axis, s};
use ndarray_linalg::{Eigh, UPLO};

/// Relative size below which a negative eigenvalue is treated as round-off.
pub const EIGENVALUE_EPSILON: f64 = 1.0e-9;

/// Full symmetric eigendecomposition.
pub trait Eigensolver {
    /// Returns eigenvalues in ascending order and the matching unit eigenvectors
    /// as columns.
    fn symmetric_eigen(
        &self,
        matrix: &Array2<f64>,
    ) -> Result<(Array1<f64>, Array2<f64>), StructureError>;
}

/// LAPACK `syevd` through `ndarray-linalg`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LapackEigensolver;

impl Eigensolver for LapackEigensolver {
    fn symmetric_eigen(
        &self,
        matrix: &Array2<f64>,
    ) -> Result<(Array1<f64>, Array2<f64>), StructureError> {
        matrix
            .eigh(UPLO::Lower)
            .map_err(|err| StructureError::Eigendecomposition(err.to_string()))
    }
}

/// Sample coordinates from classical MDS.
#[derive(Clone, Debug)]
pub struct MdsEmbedding {
    /// Shape: [n_samples, dimensions].
    pub coordinates: Array2<f64>,
    /// Eigenvalues backing each coordinate column, largest first. Negative values
    /// are kept here as reported by the solver; their coordinate columns are zero.
    pub eigenvalues: Array1<f64>,
}

impl MdsEmbedding {
    pub fn n_samples(&self) -> usize {
        self.coordinates.nrows()
    }

    pub fn dimensions(&self) -> usize {
        self.coordinates.ncols()
    }
}

/// Computes the dissimilarity matrix of `samples` and embeds it in `dimensions`
/// coordinates.
pub fn compute_mds(
    samples: &SampleMatrix,
    dimensions: usize,
    threads: usize,
) -> Result<MdsEmbedding, StructureError> {
    check_dimensions(dimensions, samples.n_samples())?;
    let dissimilarity = compute_dissimilarity(samples, threads)?;
    metric_mds(&dissimilarity, dimensions, &LapackEigensolver)
}

/// Classical metric MDS of a dissimilarity matrix.
///
/// 1) P = D ∘ D
/// 2) J = I - (1/n)·11ᵀ
/// 3) B = -½·J·P·J
/// 4) eigendecompose B, largest eigenvalue first
/// 5) coordinates = V·diag(√λ), first `dimensions` columns
///
/// Eigenvalues of B go negative when D is not Euclidean. Those dimensions carry
/// no real coordinates, so √λ is taken as zero for any λ ≤ 0.
pub fn metric_mds<E: Eigensolver + ?Sized>(
    dissimilarity: &Array2<f64>,
    dimensions: usize,
    solver: &E,
) -> Result<MdsEmbedding, StructureError> {
    let (rows, cols) = dissimilarity.dim();
    if rows != cols {
        return Err(StructureError::NonSquareDissimilarity { rows, cols });
    }
    check_dimensions(dimensions, rows)?;

    let b = double_centered(dissimilarity);
    let (ascending_values, ascending_vectors) = solver.symmetric_eigen(&b)?;

    let eigenvalues = ascending_values.slice(s![..;-1]).to_owned();
    let eigenvectors = ascending_vectors.slice(s![.., ..;-1]);

    let eigenvalues = eigenvalues.slice(s![..dimensions]).to_owned();
    let mut coordinates = eigenvectors.slice(s![.., ..dimensions]).to_owned();

    let scale = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let mut clamped = 0usize;
    for (&lambda, mut column) in eigenvalues.iter().zip(coordinates.axis_iter_mut(Axis(1))) {
        let sigma = if lambda > 0.0 {
            lambda.sqrt()
        } else {
            if lambda < -EIGENVALUE_EPSILON * scale.max(1.0) {
                clamped += 1;
            }
            0.0
        };
        column.mapv_inplace(|value| value * sigma);
    }
    if clamped > 0 {
        log::warn!(
            "{clamped} of {dimensions} MDS dimensions have negative eigenvalues; their coordinates are set to zero"
        );
    }

    log::info!(
        "MDS embedded {rows} samples in {dimensions} dimensions (leading eigenvalue {:.4e})",
        eigenvalues.get(0).copied().unwrap_or(0.0)
    );

    Ok(MdsEmbedding {
        coordinates,
        eigenvalues,
    })
}

fn check_dimensions(requested: usize, samples: usize) -> Result<(), StructureError> {
    if requested == 0 || requested > samples {
        return Err(StructureError::InvalidDimensionRequest { requested, samples });
    }
    Ok(())
}

/// B = -½·J·P·J with P the elementwise square of `dissimilarity`.
fn double_centered(dissimilarity: &Array2<f64>) -> Array2<f64> {
    let n = dissimilarity.nrows();
    let p = dissimilarity.mapv(|d| d * d);
    let j = Array2::<f64>::eye(n) - Array2::<f64>::from_elem((n, n), 1.0 / n as f64);
    let mut b = j.dot(&p).dot(&j) * -0.5;

    // Round-off can leave B slightly asymmetric; the eigensolver reads one triangle.
    for i in 0..n {
        for k in (i + 1)..n {
            let mean = 0.5 * (b[[i, k]] + b[[k, i]]);
            b[[i, k]] = mean;
            b[[k, i]] = mean;
        }
    }
    b
}
