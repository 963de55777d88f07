use ndarray::Array1;
use thiserror::Error;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// Objective and gradient evaluated together at a point.
pub type ObjectiveFn<'a> = dyn Fn(&Array1<f64>) -> (f64, Array1<f64>) + 'a;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MaximizerError {
    #[error("BFGS failed: {0}")]
    Failed(String),
    #[error("Maximizer returned a non-finite point.")]
    NonFinite,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaximizerSolution {
    pub point: Array1<f64>,
    pub value: f64,
    pub iterations: usize,
}

/// A general multivariate maximizer over a smooth objective.
pub trait Maximizer {
    fn maximize(
        &self,
        objective: &ObjectiveFn<'_>,
        start: Array1<f64>,
        tolerance: f64,
    ) -> Result<MaximizerSolution, MaximizerError>;
}

/// Consecutive steps with relative objective improvement below the tolerance
/// before BFGS stops.
pub const NO_IMPROVE_STREAK: usize = 5;

/// BFGS with a Wolfe line search, from `wolfe_bfgs`.
///
/// `wolfe_bfgs` minimizes, so the objective and its gradient are negated. The
/// tolerance is applied twice: as the gradient-norm threshold, and as the
/// relative objective improvement `|Δf| / (1 + |f|)` below which
/// [`NO_IMPROVE_STREAK`] stalled steps end the run.
#[derive(Clone, Copy, Debug)]
pub struct BfgsMaximizer {
    pub max_iterations: usize,
}

impl Maximizer for BfgsMaximizer {
    fn maximize(
        &self,
        objective: &ObjectiveFn<'_>,
        start: Array1<f64>,
        tolerance: f64,
    ) -> Result<MaximizerSolution, MaximizerError> {
        let cost_and_grad = |point: &Array1<f64>| -> (f64, Array1<f64>) {
            let (value, gradient) = objective(point);
            (-value, -gradient)
        };

        let BfgsSolution {
            final_point,
            final_value,
            iterations,
            ..
        } = Bfgs::new(start, cost_and_grad)
            .with_tolerance(tolerance)
            .with_max_iterations(self.max_iterations)
            .with_no_improve_stop(tolerance, NO_IMPROVE_STREAK)
            .run()
            .map_err(|e| MaximizerError::Failed(format!("{e:?}")))?;

        if !final_value.is_finite() || !final_point.iter().all(|v| v.is_finite()) {
            return Err(MaximizerError::NonFinite);
        }

        Ok(MaximizerSolution {
            point: final_point,
            value: -final_value,
            iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn bfgs_finds_the_peak_of_a_concave_quadratic() {
        // f(x) = -(x0 - 1)^2 - 2(x1 + 3)^2
        let objective = |x: &Array1<f64>| {
            let value = -(x[0] - 1.0).powi(2) - 2.0 * (x[1] + 3.0).powi(2);
            let gradient = array![-2.0 * (x[0] - 1.0), -4.0 * (x[1] + 3.0)];
            (value, gradient)
        };
        let maximizer = BfgsMaximizer {
            max_iterations: 100,
        };
        let solution = maximizer
            .maximize(&objective, array![0.0, 0.0], 1e-8)
            .unwrap();
        assert_abs_diff_eq!(solution.point[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(solution.point[1], -3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(solution.value, 0.0, epsilon = 1e-8);
    }

    #[test]
    fn flat_peak_stops_within_tolerance_of_the_optimum() {
        // f(x) = -(x0 - 2)^4 - (x1 + 1)^2 is flat along x0 near its peak.
        let objective = |x: &Array1<f64>| {
            let value = -(x[0] - 2.0).powi(4) - (x[1] + 1.0).powi(2);
            let gradient = array![-4.0 * (x[0] - 2.0).powi(3), -2.0 * (x[1] + 1.0)];
            (value, gradient)
        };
        let maximizer = BfgsMaximizer {
            max_iterations: 200,
        };
        let solution = maximizer
            .maximize(&objective, array![0.0, 0.0], 1e-6)
            .unwrap();
        assert!(solution.value <= 0.0);
        assert!(solution.value > -1e-6, "stopped at {}", solution.value);
        assert_abs_diff_eq!(solution.point[1], -1.0, epsilon = 1e-3);
    }
}
