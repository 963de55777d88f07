// Population structure: pairwise distances between samples and their
// metric MDS embedding.
pub mod distance;
pub mod matrix;
pub mod mds;
pub mod pool;

use thiserror::Error;

pub use distance::compute_dissimilarity;
pub use matrix::SampleMatrix;
pub use mds::{Eigensolver, LapackEigensolver, MdsEmbedding, compute_mds, metric_mds};
pub use pool::BoundedPool;

/// Errors raised by structurally invalid inputs to the distance and MDS routines.
#[derive(Error, Debug)]
pub enum StructureError {
    #[error("Requested {requested} MDS dimensions, but only {samples} samples are available.")]
    InvalidDimensionRequest { requested: usize, samples: usize },

    #[error("Sample matrix entry ({row}, {column}) is {value}; only 0 and 1 are allowed.")]
    NonBinaryValue { row: usize, column: usize, value: u8 },

    #[error("Sample row {row} has {found} features, expected {expected}.")]
    RaggedRows {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Dissimilarity matrix must be square, found {rows}x{cols}.")]
    NonSquareDissimilarity { rows: usize, cols: usize },

    #[error("Thread count must be at least 1.")]
    ZeroThreads,

    #[error("Symmetric eigendecomposition failed: {0}")]
    Eigendecomposition(String),

    #[error("A distance worker exited before returning its result.")]
    WorkerDisconnected,
}
