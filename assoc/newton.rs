//! # Newton-Raphson Fitting
//!
//! Maximum-likelihood iteration for the logistic model, in two flavours:
//!
//! - **Plain:** `b' = b + V·Xᵀ(y - p)` with `V = (XᵀWX)⁻¹`.
//! - **Firth:** the score gains the Jeffreys-prior correction `h∘(½ - p)`, where
//!   `h` is the diagonal of the weighted hat matrix. The penalty keeps the
//!   estimate finite under complete or quasi-complete separation and shrinks it
//!   toward zero (Heinze & Schemper, 2002).
//!
//! Only the movement of the variant coefficient is checked for convergence.

use crate::likelihood::{
    DesignMatrix, LikelihoodError, VARIANT_INDEX, estimate_from_covariance, hat_diagonal,
    information_matrix, invert_information, predict, variance_covariance,
};
use crate::types::{FailureReason, FitOutcome, Phenotype};
use ndarray::{Array1, ArrayView1, ArrayView2};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewtonMode {
    Plain,
    Firth,
}

/// Newton-Raphson with a hard iteration cap.
#[derive(Clone, Copy, Debug)]
pub struct IterativeFitter {
    pub max_iterations: usize,
    pub convergence_limit: f64,
}

/// Every iterate visited by one run, starting point first.
#[derive(Clone, Debug, Default)]
pub struct NewtonTrace {
    pub iterates: Vec<Array1<f64>>,
}

impl NewtonTrace {
    pub fn iterations(&self) -> usize {
        self.iterates.len().saturating_sub(1)
    }

    pub fn last_coefficient(&self) -> Option<f64> {
        self.iterates.last().map(|b| b[VARIANT_INDEX])
    }
}

impl IterativeFitter {
    pub fn new(max_iterations: usize, convergence_limit: f64) -> Self {
        Self {
            max_iterations,
            convergence_limit,
        }
    }

    pub fn fit(&self, design: &DesignMatrix, phenotype: &Phenotype, mode: NewtonMode) -> FitOutcome {
        self.fit_traced(design, phenotype, mode).0
    }

    /// Runs one mode to convergence or the iteration cap, returning the trace of
    /// iterates alongside the outcome.
    pub fn fit_traced(
        &self,
        design: &DesignMatrix,
        phenotype: &Phenotype,
        mode: NewtonMode,
    ) -> (FitOutcome, NewtonTrace) {
        let x = design.view();
        let y = phenotype.values();

        let mut start = Array1::<f64>::zeros(design.n_params());
        start[0] = phenotype.intercept_start();
        let mut trace = NewtonTrace {
            iterates: Vec::with_capacity(self.max_iterations + 1),
        };
        trace.iterates.push(start);

        for iteration in 1..=self.max_iterations {
            let current = &trace.iterates[trace.iterates.len() - 1];
            let next = match newton_step(x, y, current.view(), mode) {
                Ok(next) => next,
                Err(LikelihoodError::SingularInformation) => {
                    log::debug!("{mode:?} Newton-Raphson hit a singular information matrix at iteration {iteration}");
                    return (FitOutcome::Failure(FailureReason::SingularInformation), trace);
                }
            };
            let movement = (next[VARIANT_INDEX] - current[VARIANT_INDEX]).abs();
            if !next.iter().all(|v| v.is_finite()) {
                return (FitOutcome::Failure(FailureReason::NonFinite), trace);
            }
            trace.iterates.push(next);

            // Converging on the final permitted pass still counts as exhausted.
            if movement < self.convergence_limit && iteration < self.max_iterations {
                log::debug!("{mode:?} Newton-Raphson converged after {iteration} iterations");
                return (self.finalize(x, &trace, iteration), trace);
            }
        }

        let last_coefficient = trace.last_coefficient().unwrap_or(f64::NAN);
        log::debug!(
            "{mode:?} Newton-Raphson reached {} iterations without converging (beta = {last_coefficient:.4e})",
            self.max_iterations
        );
        (
            FitOutcome::Failure(FailureReason::IterationLimitExceeded {
                iterations: self.max_iterations,
                last_coefficient,
            }),
            trace,
        )
    }

    fn finalize(&self, x: ArrayView2<f64>, trace: &NewtonTrace, iterations: usize) -> FitOutcome {
        let Some(b) = trace.iterates.last() else {
            return FitOutcome::Failure(FailureReason::NonFinite);
        };
        match variance_covariance(x, b.view()) {
            Ok(covariance) => {
                let estimate = estimate_from_covariance(b.view(), &covariance, iterations);
                if estimate.standard_error.is_finite() {
                    FitOutcome::Success(estimate)
                } else {
                    FitOutcome::Failure(FailureReason::NonFinite)
                }
            }
            Err(LikelihoodError::SingularInformation) => {
                FitOutcome::Failure(FailureReason::SingularInformation)
            }
        }
    }
}

/// One Newton-Raphson update from `b`.
pub fn newton_step(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    b: ArrayView1<f64>,
    mode: NewtonMode,
) -> Result<Array1<f64>, LikelihoodError> {
    let p = predict(x, b);
    let covariance = invert_information(&information_matrix(x, p.view()))?;
    let mut residual = &y - &p;
    if mode == NewtonMode::Firth {
        let h = hat_diagonal(x, p.view(), &covariance);
        residual = residual + &h * &p.mapv(|pi| 0.5 - pi);
    }
    let score = x.t().dot(&residual);
    Ok(&b + &covariance.dot(&score))
}
