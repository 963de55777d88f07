//! # Per-Variant Fitting
//!
//! Each variant runs through an explicit fallback chain:
//!
//! ```text
//! Fast (BFGS) --fail--> NewtonRaphson --fail--> Firth --fail--> terminal
//!      |                     |                    |
//!   success               success              success
//! ```
//!
//! Every failed stage appends its diagnostic tag. A variant either ends with an
//! estimate (possibly after recovered failures) or with no estimate and a
//! `firth-fail` tag.

use crate::config::FitConfig;
use crate::fast::FastFitter;
use crate::likelihood::DesignMatrix;
use crate::newton::{IterativeFitter, NewtonMode};
use crate::optimizer::{BfgsMaximizer, Maximizer};
use crate::types::{AssocError, FitOutcome, FitStage, Kmer, Phenotype, VariantFit};
use ndarray::ArrayView2;

/// Runs a single stage of the chain.
pub trait StageRunner {
    fn attempt(&self, stage: FitStage, design: &DesignMatrix, phenotype: &Phenotype)
    -> FitOutcome;
}

/// Walks the chain from `start`, stopping at the first success.
pub fn run_fallback_chain<R: StageRunner + ?Sized>(
    runner: &R,
    start: FitStage,
    design: &DesignMatrix,
    phenotype: &Phenotype,
) -> VariantFit {
    let mut stage = start;
    let mut diagnostics = Vec::new();
    loop {
        match runner.attempt(stage, design, phenotype) {
            FitOutcome::Success(estimate) => {
                return VariantFit {
                    estimate: Some(estimate),
                    stage: Some(stage),
                    diagnostics,
                };
            }
            FitOutcome::Failure(reason) => {
                log::debug!("{stage} stage failed: {reason}");
                diagnostics.push(stage.failure_tag());
                match stage.next() {
                    Some(next) => stage = next,
                    None => {
                        return VariantFit {
                            estimate: None,
                            stage: None,
                            diagnostics,
                        };
                    }
                }
            }
        }
    }
}

/// The production chain: BFGS first, then Newton-Raphson in plain and Firth modes.
#[derive(Clone, Debug)]
pub struct Fitter<M = BfgsMaximizer> {
    fast: FastFitter<M>,
    iterative: IterativeFitter,
}

impl Fitter<BfgsMaximizer> {
    pub fn from_config(config: &FitConfig) -> Self {
        Self::with_maximizer(
            BfgsMaximizer {
                max_iterations: config.bfgs_max_iterations,
            },
            config,
        )
    }
}

impl<M: Maximizer> Fitter<M> {
    /// Uses `maximizer` for the fast stage instead of BFGS.
    pub fn with_maximizer(maximizer: M, config: &FitConfig) -> Self {
        Self {
            fast: FastFitter::new(maximizer, config.convergence_limit),
            iterative: IterativeFitter::new(config.max_nr_iterations, config.convergence_limit),
        }
    }

    pub fn iterative(&self) -> &IterativeFitter {
        &self.iterative
    }

    /// Fits the full chain on an already-built design.
    pub fn fit_design(&self, design: &DesignMatrix, phenotype: &Phenotype) -> VariantFit {
        run_fallback_chain(self, FitStage::Fast, design, phenotype)
    }

    /// Newton-Raphson only: plain mode, escalating to Firth on failure.
    pub fn fit_iterative(&self, design: &DesignMatrix, phenotype: &Phenotype) -> VariantFit {
        run_fallback_chain(self, FitStage::NewtonRaphson, design, phenotype)
    }

    /// Fits `kmer` against `phenotype`, optionally adjusting for `covariates`
    /// (one row per sample, typically MDS coordinates). Returns the k-mer with
    /// its estimate and diagnostics filled in.
    pub fn fit_variant(
        &self,
        kmer: Kmer,
        phenotype: &Phenotype,
        covariates: Option<ArrayView2<f64>>,
    ) -> Result<Kmer, AssocError> {
        if kmer.presence().len() != phenotype.len() {
            return Err(AssocError::LengthMismatch {
                what: "Variant presence column",
                found: kmer.presence().len(),
                expected: phenotype.len(),
            });
        }
        let design = DesignMatrix::build(kmer.presence(), covariates)?;
        let fit = self.fit_design(&design, phenotype);
        if fit.estimate.is_none() {
            log::warn!(
                "All fitting stages failed for {} ({})",
                kmer.sequence(),
                fit.diagnostics
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            );
        }
        Ok(kmer.with_fit(fit))
    }
}

impl<M: Maximizer> StageRunner for Fitter<M> {
    fn attempt(
        &self,
        stage: FitStage,
        design: &DesignMatrix,
        phenotype: &Phenotype,
    ) -> FitOutcome {
        match stage {
            FitStage::Fast => self.fast.fit(design, phenotype),
            FitStage::NewtonRaphson => self.iterative.fit(design, phenotype, NewtonMode::Plain),
            FitStage::Firth => self.iterative.fit(design, phenotype, NewtonMode::Firth),
        }
    }
}

/// Fits one k-mer with the default BFGS-first chain configured by `config`.
pub fn fit_variant(
    kmer: Kmer,
    phenotype: &Phenotype,
    covariates: Option<ArrayView2<f64>>,
    config: &FitConfig,
) -> Result<Kmer, AssocError> {
    Fitter::from_config(config).fit_variant(kmer, phenotype, covariates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Diagnostic, FailureReason, FitEstimate};
    use ndarray::array;
    use std::cell::RefCell;

    /// Fails every stage listed in `failing`, succeeds otherwise.
    struct Scripted {
        failing: Vec<FitStage>,
        calls: RefCell<Vec<FitStage>>,
    }

    impl StageRunner for Scripted {
        fn attempt(&self, stage: FitStage, _: &DesignMatrix, _: &Phenotype) -> FitOutcome {
            self.calls.borrow_mut().push(stage);
            if self.failing.contains(&stage) {
                FitOutcome::Failure(FailureReason::SingularInformation)
            } else {
                FitOutcome::Success(FitEstimate {
                    coefficient: 0.5,
                    standard_error: 0.1,
                    p_value: 1e-6,
                    iterations: 3,
                })
            }
        }
    }

    fn inputs() -> (DesignMatrix, Phenotype) {
        let presence = array![0.0, 1.0, 1.0, 0.0];
        (
            DesignMatrix::build(presence.view(), None).unwrap(),
            Phenotype::new(array![0.0, 1.0, 0.0, 1.0]).unwrap(),
        )
    }

    fn run(failing: Vec<FitStage>) -> (VariantFit, Vec<FitStage>) {
        let (design, phenotype) = inputs();
        let runner = Scripted {
            failing,
            calls: RefCell::new(Vec::new()),
        };
        let fit = run_fallback_chain(&runner, FitStage::Fast, &design, &phenotype);
        (fit, runner.calls.into_inner())
    }

    #[test]
    fn fast_success_skips_iterative_stages() {
        let (fit, calls) = run(vec![]);
        assert_eq!(calls, [FitStage::Fast]);
        assert_eq!(fit.stage, Some(FitStage::Fast));
        assert!(fit.diagnostics.is_empty());
    }

    #[test]
    fn fast_failure_falls_back_to_newton_raphson() {
        let (fit, calls) = run(vec![FitStage::Fast]);
        assert_eq!(calls, [FitStage::Fast, FitStage::NewtonRaphson]);
        assert_eq!(fit.stage, Some(FitStage::NewtonRaphson));
        assert_eq!(fit.diagnostics, [Diagnostic::BfgsFail]);
        assert!(fit.estimate.is_some());
    }

    #[test]
    fn newton_failure_escalates_to_firth() {
        let (fit, _) = run(vec![FitStage::Fast, FitStage::NewtonRaphson]);
        assert_eq!(fit.stage, Some(FitStage::Firth));
        assert_eq!(fit.diagnostics, [Diagnostic::BfgsFail, Diagnostic::NrFail]);
    }

    #[test]
    fn exhausting_every_stage_leaves_no_estimate() {
        let (fit, calls) = run(vec![FitStage::Fast, FitStage::NewtonRaphson, FitStage::Firth]);
        assert_eq!(calls.len(), 3);
        assert_eq!(fit.estimate, None);
        assert_eq!(fit.stage, None);
        assert_eq!(
            fit.diagnostics,
            [Diagnostic::BfgsFail, Diagnostic::NrFail, Diagnostic::FirthFail]
        );
    }

    #[test]
    fn iterative_chain_starts_at_newton_raphson() {
        let (design, phenotype) = inputs();
        let runner = Scripted {
            failing: vec![FitStage::NewtonRaphson],
            calls: RefCell::new(Vec::new()),
        };
        let fit = run_fallback_chain(&runner, FitStage::NewtonRaphson, &design, &phenotype);
        assert_eq!(runner.calls.into_inner(), [FitStage::NewtonRaphson, FitStage::Firth]);
        assert_eq!(fit.diagnostics, [Diagnostic::NrFail]);
    }

    #[test]
    fn mismatched_variant_length_is_an_error() {
        let phenotype = Phenotype::new(array![0.0, 1.0, 0.0, 1.0]).unwrap();
        let kmer = Kmer::new("ACGT", &[0, 1, 1]).unwrap();
        let result = fit_variant(kmer, &phenotype, None, &FitConfig::default());
        assert!(matches!(
            result,
            Err(AssocError::LengthMismatch {
                found: 3,
                expected: 4,
                ..
            })
        ));
    }
}
