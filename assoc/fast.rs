use crate::likelihood::{DesignMatrix, LikelihoodError, gradient, log_likelihood, wald_estimate};
use crate::optimizer::Maximizer;
use crate::types::{FailureReason, FitOutcome, Phenotype};
use ndarray::Array1;

/// First stage of the chain: hand the likelihood to a quasi-Newton maximizer.
#[derive(Clone, Debug)]
pub struct FastFitter<M> {
    maximizer: M,
    tolerance: f64,
}

impl<M: Maximizer> FastFitter<M> {
    pub fn new(maximizer: M, tolerance: f64) -> Self {
        Self {
            maximizer,
            tolerance,
        }
    }

    pub fn fit(&self, design: &DesignMatrix, phenotype: &Phenotype) -> FitOutcome {
        let x = design.view();
        let y = phenotype.values();
        let objective = |b: &Array1<f64>| (log_likelihood(x, y, b.view()), gradient(x, y, b.view()));

        let start = starting_point(design.n_params(), phenotype.intercept_start());
        let solution = match self.maximizer.maximize(&objective, start, self.tolerance) {
            Ok(solution) => solution,
            Err(err) => {
                log::debug!("BFGS stage failed: {err}");
                return FitOutcome::Failure(FailureReason::OptimizerNonConvergence(
                    err.to_string(),
                ));
            }
        };

        match wald_estimate(x, solution.point.view(), solution.iterations) {
            Ok(estimate) if estimate.standard_error.is_finite() => FitOutcome::Success(estimate),
            Ok(_) => FitOutcome::Failure(FailureReason::NonFinite),
            Err(LikelihoodError::SingularInformation) => {
                log::debug!("BFGS optimum has a singular information matrix");
                FitOutcome::Failure(FailureReason::SingularInformation)
            }
        }
    }
}

/// Null-model intercept, with every other coefficient at 1. BFGS converges
/// poorly from an all-zero slope vector on this likelihood.
pub fn starting_point(n_params: usize, intercept: f64) -> Array1<f64> {
    let mut start = Array1::ones(n_params);
    start[0] = intercept;
    start
}
