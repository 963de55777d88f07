//! # Logistic Likelihood
//!
//! Stateless pieces of the logistic model shared by every fitting stage: the
//! design matrix, predicted probabilities, log-likelihood and score, the Fisher
//! information, and the Wald test that turns an estimate into a p-value.

use crate::types::{AssocError, FitEstimate};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use ndarray_linalg::{Cholesky, InverseC, UPLO};
use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;
use thiserror::Error;

/// Index of the variant coefficient in every parameter vector.
pub const VARIANT_INDEX: usize = 1;

/// Squared Cholesky pivots at or below this fraction of the largest diagonal
/// entry mark the information matrix as numerically singular.
pub const SINGULARITY_TOLERANCE: f64 = 1.0e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LikelihoodError {
    #[error("The information matrix is singular or not positive definite.")]
    SingularInformation,
}

/// Sample-by-parameter design: intercept, variant column, then covariates.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignMatrix {
    x: Array2<f64>,
}

impl DesignMatrix {
    pub fn build(
        variant: ArrayView1<f64>,
        covariates: Option<ArrayView2<f64>>,
    ) -> Result<Self, AssocError> {
        let n = variant.len();
        let n_covariates = match covariates {
            Some(c) if c.nrows() != n => {
                return Err(AssocError::LengthMismatch {
                    what: "Covariate matrix",
                    found: c.nrows(),
                    expected: n,
                });
            }
            Some(c) => c.ncols(),
            None => 0,
        };

        let mut x = Array2::<f64>::zeros((n, 2 + n_covariates));
        x.column_mut(0).fill(1.0);
        x.column_mut(VARIANT_INDEX).assign(&variant);
        if let Some(c) = covariates {
            x.slice_mut(s![.., 2..]).assign(&c);
        }
        Ok(Self { x })
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.x.ncols()
    }
}

/// p = 1 / (1 + exp(-Xb)).
pub fn predict(x: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    x.dot(&b).mapv(|eta| 1.0 / (1.0 + (-eta).exp()))
}

/// Σ y·η - log(1 + e^η), evaluated without overflow for large |η|.
pub fn log_likelihood(x: ArrayView2<f64>, y: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    x.dot(&b)
        .iter()
        .zip(y.iter())
        .map(|(&eta, &yi)| yi * eta - log1p_exp(eta))
        .sum()
}

/// Score vector Xᵀ(y - p).
pub fn gradient(x: ArrayView2<f64>, y: ArrayView1<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let residual = &y - &predict(x, b);
    x.t().dot(&residual)
}

/// Fisher information XᵀWX with W = diag(p(1 - p)). Only the upper triangle is
/// accumulated; the lower triangle is mirrored from it.
pub fn information_matrix(x: ArrayView2<f64>, p: ArrayView1<f64>) -> Array2<f64> {
    let weights = p.mapv(|pi| pi * (1.0 - pi));
    let k = x.ncols();
    let mut info = Array2::<f64>::zeros((k, k));
    for i in 0..k {
        let weighted = &x.column(i) * &weights;
        for j in i..k {
            let value = weighted.dot(&x.column(j));
            info[[i, j]] = value;
            info[[j, i]] = value;
        }
    }
    info
}

/// Inverts an information matrix via its Cholesky factor.
///
/// Exact collinearity does not always produce a zero pivot in floating point,
/// so tiny pivots relative to the matrix scale are rejected as well.
pub fn invert_information(info: &Array2<f64>) -> Result<Array2<f64>, LikelihoodError> {
    if !info.iter().all(|v| v.is_finite()) {
        return Err(LikelihoodError::SingularInformation);
    }
    let factor = info
        .cholesky(UPLO::Lower)
        .map_err(|_| LikelihoodError::SingularInformation)?;
    let scale = info.diag().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if factor
        .diag()
        .iter()
        .any(|l| l * l <= SINGULARITY_TOLERANCE * scale)
    {
        return Err(LikelihoodError::SingularInformation);
    }
    let inverse = info
        .invc()
        .map_err(|_| LikelihoodError::SingularInformation)?;
    let diagonal_ok = inverse.diag().iter().all(|v| v.is_finite() && *v > 0.0);
    if !diagonal_ok {
        return Err(LikelihoodError::SingularInformation);
    }
    Ok(inverse)
}

/// Variance-covariance matrix of the estimates at `b`: the inverse information.
pub fn variance_covariance(
    x: ArrayView2<f64>,
    b: ArrayView1<f64>,
) -> Result<Array2<f64>, LikelihoodError> {
    let p = predict(x, b);
    invert_information(&information_matrix(x, p.view()))
}

/// Two-sided Wald p-value, 2·(1 - Φ(|c| / se)).
pub fn wald_p_value(coefficient: f64, standard_error: f64) -> f64 {
    let w = coefficient.abs() / standard_error;
    erfc(w / SQRT_2)
}

/// Standard error of the variant coefficient and its Wald test at `b`.
pub fn wald_estimate(
    x: ArrayView2<f64>,
    b: ArrayView1<f64>,
    iterations: usize,
) -> Result<FitEstimate, LikelihoodError> {
    let covariance = variance_covariance(x, b)?;
    Ok(estimate_from_covariance(b, &covariance, iterations))
}

pub(crate) fn estimate_from_covariance(
    b: ArrayView1<f64>,
    covariance: &Array2<f64>,
    iterations: usize,
) -> FitEstimate {
    let coefficient = b[VARIANT_INDEX];
    let standard_error = covariance[[VARIANT_INDEX, VARIANT_INDEX]].sqrt();
    FitEstimate {
        coefficient,
        standard_error,
        p_value: wald_p_value(coefficient, standard_error),
        iterations,
    }
}

/// Diagonal of the hat matrix W^½·X·V·Xᵀ·W^½ for V = (XᵀWX)⁻¹, without forming
/// the n×n matrix.
pub fn hat_diagonal(
    x: ArrayView2<f64>,
    p: ArrayView1<f64>,
    covariance: &Array2<f64>,
) -> Array1<f64> {
    let xv = x.dot(covariance);
    let quadratic = (&xv * &x).sum_axis(Axis(1));
    let weights = p.mapv(|pi| pi * (1.0 - pi));
    quadratic * weights
}

fn log1p_exp(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}
