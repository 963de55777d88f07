use ndarray::{Array1, ArrayView1};
use std::fmt;
use thiserror::Error;

/// Errors for structurally invalid association inputs. Numerical trouble in a
/// single fit is never reported here; see [`FitOutcome`].
#[derive(Error, Debug)]
pub enum AssocError {
    #[error("The phenotype vector is empty.")]
    EmptyPhenotype,

    #[error("Phenotype value {value} at sample {index} is not 0 or 1.")]
    NonBinaryPhenotype { index: usize, value: f64 },

    #[error(
        "All {samples} phenotype values are {value}; both cases and controls are required for a logistic fit."
    )]
    ConstantPhenotype { samples: usize, value: f64 },

    #[error("{what} has {found} samples, but the phenotype has {expected}.")]
    LengthMismatch {
        what: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("Variant '{sequence}' has presence value {value} at sample {index}; only 0 and 1 are allowed.")]
    NonBinaryPresence {
        sequence: String,
        index: usize,
        value: u8,
    },
}

/// Binary phenotype with at least one case and one control.
#[derive(Clone, Debug, PartialEq)]
pub struct Phenotype {
    values: Array1<f64>,
}

impl Phenotype {
    pub fn new(values: Array1<f64>) -> Result<Self, AssocError> {
        if values.is_empty() {
            return Err(AssocError::EmptyPhenotype);
        }
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| **v != 0.0 && **v != 1.0)
        {
            return Err(AssocError::NonBinaryPhenotype { index, value });
        }
        let cases = values.sum();
        if cases == 0.0 || cases == values.len() as f64 {
            return Err(AssocError::ConstantPhenotype {
                samples: values.len(),
                value: values[0],
            });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fraction of cases. Strictly between 0 and 1 by construction.
    pub fn mean(&self) -> f64 {
        self.values.sum() / self.values.len() as f64
    }

    /// Log-odds of the case fraction; the intercept of the null model.
    pub fn intercept_start(&self) -> f64 {
        let m = self.mean();
        (m / (1.0 - m)).ln()
    }
}

/// Diagnostic tags recorded when a fitting stage gives up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    BfgsFail,
    NrFail,
    FirthFail,
}

impl Diagnostic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BfgsFail => "bfgs-fail",
            Self::NrFail => "nr-fail",
            Self::FirthFail => "firth-fail",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages of the per-variant fallback chain, cheapest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FitStage {
    /// Quasi-Newton maximization of the likelihood.
    Fast,
    /// Plain Newton-Raphson.
    NewtonRaphson,
    /// Newton-Raphson with Firth's bias-reduced score.
    Firth,
}

impl FitStage {
    /// The stage tried after this one fails, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Fast => Some(Self::NewtonRaphson),
            Self::NewtonRaphson => Some(Self::Firth),
            Self::Firth => None,
        }
    }

    pub fn failure_tag(self) -> Diagnostic {
        match self {
            Self::Fast => Diagnostic::BfgsFail,
            Self::NewtonRaphson => Diagnostic::NrFail,
            Self::Firth => Diagnostic::FirthFail,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Fast => "BFGS",
            Self::NewtonRaphson => "Newton-Raphson",
            Self::Firth => "Firth Newton-Raphson",
        }
    }
}

impl fmt::Display for FitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A successful estimate of the variant coefficient.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitEstimate {
    pub coefficient: f64,
    pub standard_error: f64,
    pub p_value: f64,
    pub iterations: usize,
}

/// Why a single stage failed.
#[derive(Clone, Debug, PartialEq)]
pub enum FailureReason {
    /// The quasi-Newton maximizer reported an error.
    OptimizerNonConvergence(String),
    /// Newton-Raphson ran out of iterations. `last_coefficient` is the variant
    /// coefficient of the final iterate.
    IterationLimitExceeded {
        iterations: usize,
        last_coefficient: f64,
    },
    /// The information matrix could not be inverted.
    SingularInformation,
    /// An iterate or its standard error stopped being finite.
    NonFinite,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OptimizerNonConvergence(msg) => write!(f, "optimizer did not converge: {msg}"),
            Self::IterationLimitExceeded {
                iterations,
                last_coefficient,
            } => write!(
                f,
                "no convergence after {iterations} iterations (beta = {last_coefficient:.4e})"
            ),
            Self::SingularInformation => f.write_str("information matrix is singular"),
            Self::NonFinite => f.write_str("estimate is not finite"),
        }
    }
}

/// Result of one fitting stage.
#[derive(Clone, Debug, PartialEq)]
pub enum FitOutcome {
    Success(FitEstimate),
    Failure(FailureReason),
}

/// Result of the whole fallback chain for one variant.
#[derive(Clone, Debug, PartialEq)]
pub struct VariantFit {
    /// Present only if some stage succeeded.
    pub estimate: Option<FitEstimate>,
    /// Stage that produced `estimate`.
    pub stage: Option<FitStage>,
    /// One tag per failed stage, in the order they failed.
    pub diagnostics: Vec<Diagnostic>,
}

/// A k-mer and its presence/absence pattern across samples, plus fit outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Kmer {
    sequence: String,
    presence: Array1<f64>,
    estimate: Option<FitEstimate>,
    comments: Vec<Diagnostic>,
}

impl Kmer {
    pub fn new(sequence: impl Into<String>, presence: &[u8]) -> Result<Self, AssocError> {
        let sequence = sequence.into();
        if let Some((index, &value)) = presence.iter().enumerate().find(|(_, v)| **v > 1) {
            return Err(AssocError::NonBinaryPresence {
                sequence,
                index,
                value,
            });
        }
        Ok(Self {
            sequence,
            presence: presence.iter().map(|&v| f64::from(v)).collect(),
            estimate: None,
            comments: Vec::new(),
        })
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// The variant's design-matrix column.
    pub fn presence(&self) -> ArrayView1<'_, f64> {
        self.presence.view()
    }

    /// Fraction of samples carrying the k-mer.
    pub fn frequency(&self) -> f64 {
        if self.presence.is_empty() {
            return 0.0;
        }
        self.presence.sum() / self.presence.len() as f64
    }

    pub fn beta(&self) -> Option<f64> {
        self.estimate.map(|e| e.coefficient)
    }

    pub fn standard_error(&self) -> Option<f64> {
        self.estimate.map(|e| e.standard_error)
    }

    pub fn p_value(&self) -> Option<f64> {
        self.estimate.map(|e| e.p_value)
    }

    pub fn estimate(&self) -> Option<&FitEstimate> {
        self.estimate.as_ref()
    }

    pub fn comments(&self) -> &[Diagnostic] {
        &self.comments
    }

    /// True once a fit has run and every stage failed.
    pub fn is_failed(&self) -> bool {
        self.estimate.is_none() && !self.comments.is_empty()
    }

    /// Applies a fit result, appending its diagnostics to any existing comments.
    pub fn with_fit(mut self, fit: VariantFit) -> Self {
        self.estimate = fit.estimate;
        self.comments.extend(fit.diagnostics);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn phenotype_requires_binary_values() {
        let err = Phenotype::new(array![0.0, 1.0, 0.5]).unwrap_err();
        assert!(matches!(
            err,
            AssocError::NonBinaryPhenotype { index: 2, value } if value == 0.5
        ));
    }

    #[test]
    fn phenotype_requires_cases_and_controls() {
        assert!(matches!(
            Phenotype::new(array![1.0, 1.0, 1.0]),
            Err(AssocError::ConstantPhenotype { samples: 3, .. })
        ));
        assert!(matches!(
            Phenotype::new(Array1::zeros(0)),
            Err(AssocError::EmptyPhenotype)
        ));
    }

    #[test]
    fn intercept_start_is_log_odds_of_case_fraction() {
        let phenotype = Phenotype::new(array![1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!((phenotype.intercept_start() - (0.25_f64 / 0.75).ln()).abs() < 1e-15);
    }

    #[test]
    fn fallback_order_ends_at_firth() {
        let mut stage = FitStage::Fast;
        let mut tags = vec![stage.failure_tag()];
        while let Some(next) = stage.next() {
            stage = next;
            tags.push(stage.failure_tag());
        }
        let tags: Vec<&str> = tags.into_iter().map(Diagnostic::as_str).collect();
        assert_eq!(tags, ["bfgs-fail", "nr-fail", "firth-fail"]);
    }

    #[test]
    fn failed_kmer_has_no_numeric_outputs() {
        let kmer = Kmer::new("ACGT", &[0, 1, 1]).unwrap().with_fit(VariantFit {
            estimate: None,
            stage: None,
            diagnostics: vec![Diagnostic::BfgsFail, Diagnostic::NrFail, Diagnostic::FirthFail],
        });
        assert!(kmer.is_failed());
        assert_eq!(kmer.beta(), None);
        assert_eq!(kmer.standard_error(), None);
        assert_eq!(kmer.p_value(), None);
    }

    #[test]
    fn kmer_rejects_non_binary_presence() {
        assert!(matches!(
            Kmer::new("AC", &[0, 3]),
            Err(AssocError::NonBinaryPresence { index: 1, value: 3, .. })
        ));
        let kmer = Kmer::new("AC", &[0, 1, 1, 1]).unwrap();
        assert_eq!(kmer.frequency(), 0.75);
    }
}
