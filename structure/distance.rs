use super::StructureError;
use super::matrix::SampleMatrix;
use super::pool::BoundedPool;
use ndarray::Array2;
use std::thread;

/// A single off-diagonal distance, tagged with the cell it belongs to.
#[derive(Clone, Copy, Debug)]
struct DistanceElement {
    row: usize,
    col: usize,
    distance: f64,
}

/// Computes the symmetric Manhattan dissimilarity matrix between all sample rows.
///
/// Only the strict upper triangle is computed, with at most `threads` row pairs
/// in flight at once. Each result is written to both `(row, col)` and `(col, row)`;
/// no two tasks share a cell, so the output does not depend on `threads` or on the
/// order in which tasks complete. The diagonal is left at zero.
pub fn compute_dissimilarity(
    samples: &SampleMatrix,
    threads: usize,
) -> Result<Array2<f64>, StructureError> {
    if threads == 0 {
        return Err(StructureError::ZeroThreads);
    }

    let n = samples.n_samples();
    let mut dist = Array2::<f64>::zeros((n, n));
    if n < 2 {
        return Ok(dist);
    }

    log::info!(
        "Computing {n}x{n} dissimilarity matrix over {} features with {threads} threads",
        samples.n_features()
    );

    let work = |(row, col): (usize, usize)| DistanceElement {
        row,
        col,
        distance: samples.row_distance(row, col),
    };

    thread::scope(|scope| -> Result<(), StructureError> {
        let mut pool = BoundedPool::start(scope, threads, &work)?;
        for i in 0..n {
            for j in (i + 1)..n {
                if let Some(done) = pool.submit((i, j))? {
                    store(&mut dist, done);
                }
            }
        }
        for done in pool.drain()? {
            store(&mut dist, done);
        }
        Ok(())
    })?;

    Ok(dist)
}

fn store(dist: &mut Array2<f64>, element: DistanceElement) {
    dist[[element.row, element.col]] = element.distance;
    dist[[element.col, element.row]] = element.distance;
}
