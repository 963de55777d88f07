use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seer::config::FitConfig;
use seer::fit::Fitter;
use seer::likelihood::DesignMatrix;
use seer::newton::NewtonMode;
use seer::optimizer::{Maximizer, MaximizerError, MaximizerSolution, ObjectiveFn};
use seer::pipeline::{NoopScanProgress, run_association};
use seer::structure::{SampleMatrix, compute_mds};
use seer::types::{Diagnostic, FitOutcome, Kmer, Phenotype};

/// A maximizer that never converges, forcing the Newton-Raphson fallbacks.
struct FailingMaximizer;

impl Maximizer for FailingMaximizer {
    fn maximize(
        &self,
        _objective: &ObjectiveFn<'_>,
        _start: Array1<f64>,
        _tolerance: f64,
    ) -> Result<MaximizerSolution, MaximizerError> {
        Err(MaximizerError::Failed("line search failed".to_string()))
    }
}

/// Builds a k-mer and phenotype from (cases, controls) counts among carriers
/// and non-carriers.
fn two_by_two(carriers: (usize, usize), non_carriers: (usize, usize)) -> (Kmer, Phenotype) {
    let mut presence = Vec::new();
    let mut y = Vec::new();
    for (flag, (cases, controls)) in [(1u8, carriers), (0u8, non_carriers)] {
        presence.extend(std::iter::repeat(flag).take(cases + controls));
        y.extend(std::iter::repeat(1.0).take(cases));
        y.extend(std::iter::repeat(0.0).take(controls));
    }
    (
        Kmer::new("ACGTACGT", &presence).unwrap(),
        Phenotype::new(Array1::from(y)).unwrap(),
    )
}

fn tight_config() -> FitConfig {
    FitConfig {
        convergence_limit: 1e-8,
        ..FitConfig::default()
    }
}

#[test]
fn fast_path_recovers_a_known_log_odds_ratio() {
    let (kmer, phenotype) = two_by_two((30, 10), (25, 25));
    let fitted = seer::fit_variant(kmer, &phenotype, None, &FitConfig::default()).unwrap();

    assert!(fitted.comments().is_empty(), "{:?}", fitted.comments());
    let beta = fitted.beta().unwrap();
    assert_relative_eq!(beta, 3.0_f64.ln(), max_relative = 0.01);
    let se = (1.0 / 30.0 + 1.0 / 10.0 + 1.0 / 25.0 + 1.0 / 25.0_f64).sqrt();
    assert_relative_eq!(fitted.standard_error().unwrap(), se, max_relative = 0.01);
    let p = fitted.p_value().unwrap();
    assert!(p > 0.0 && p < 0.05);
}

#[test]
fn failed_fast_stage_falls_back_to_plain_newton_raphson() {
    let (kmer, phenotype) = two_by_two((30, 10), (25, 25));
    let config = tight_config();
    let fitter = Fitter::with_maximizer(FailingMaximizer, &config);

    let design = DesignMatrix::build(kmer.presence(), None).unwrap();
    let FitOutcome::Success(direct) = fitter.iterative().fit(&design, &phenotype, NewtonMode::Plain)
    else {
        panic!("plain Newton-Raphson should converge on this table");
    };

    let fitted = fitter.fit_variant(kmer, &phenotype, None).unwrap();
    assert_eq!(fitted.comments(), [Diagnostic::BfgsFail]);
    assert_eq!(fitted.estimate(), Some(&direct));
    assert_abs_diff_eq!(direct.coefficient, 3.0_f64.ln(), epsilon = 1e-7);
}

#[test]
fn separation_activates_firth_with_a_finite_shrunken_estimate() {
    // Every carrier is a case.
    let (kmer, phenotype) = two_by_two((10, 0), (8, 12));
    let config = tight_config();
    let fitter = Fitter::with_maximizer(FailingMaximizer, &config);

    let design = DesignMatrix::build(kmer.presence(), None).unwrap();
    let (plain, trace) = fitter
        .iterative()
        .fit_traced(&design, &phenotype, NewtonMode::Plain);
    assert!(matches!(plain, FitOutcome::Failure(_)));
    let diverging = trace.last_coefficient().unwrap();

    let fitted = fitter.fit_variant(kmer, &phenotype, None).unwrap();
    assert_eq!(fitted.comments(), [Diagnostic::BfgsFail, Diagnostic::NrFail]);
    let firth = fitted.beta().unwrap();
    assert!(firth.is_finite());
    assert!(firth.abs() < diverging.abs());
    assert_abs_diff_eq!(firth, ((10.5 * 12.5) / (0.5 * 8.5_f64)).ln(), epsilon = 1e-6);
}

#[test]
fn exhausted_iteration_cap_leaves_every_tag_and_no_estimate() {
    let (kmer, phenotype) = two_by_two((10, 0), (8, 12));
    let config = FitConfig {
        max_nr_iterations: 1,
        ..FitConfig::default()
    };
    let fitted = Fitter::with_maximizer(FailingMaximizer, &config)
        .fit_variant(kmer, &phenotype, None)
        .unwrap();

    assert!(fitted.is_failed());
    assert_eq!(fitted.beta(), None);
    assert_eq!(fitted.standard_error(), None);
    assert_eq!(fitted.p_value(), None);
    assert_eq!(
        fitted.comments(),
        [Diagnostic::BfgsFail, Diagnostic::NrFail, Diagnostic::FirthFail]
    );
}

#[test]
fn refitting_the_same_variant_is_deterministic() {
    let (kmer, phenotype) = two_by_two((12, 3), (20, 25));
    let config = FitConfig::default();
    let first = seer::fit_variant(kmer.clone(), &phenotype, None, &config).unwrap();
    let second = seer::fit_variant(kmer, &phenotype, None, &config).unwrap();
    assert_eq!(first.estimate(), second.estimate());
    assert_eq!(first.comments(), second.comments());
}

#[test]
fn recoding_the_variant_flips_the_sign_but_not_the_p_value() {
    let config = tight_config();
    let fitter = Fitter::with_maximizer(FailingMaximizer, &config);
    let (carrier, phenotype) = two_by_two((30, 10), (25, 25));
    let (non_carrier, flipped_phenotype) = two_by_two((25, 25), (30, 10));

    let a = fitter.fit_variant(carrier, &phenotype, None).unwrap();
    let b = fitter
        .fit_variant(non_carrier, &flipped_phenotype, None)
        .unwrap();

    assert_abs_diff_eq!(a.beta().unwrap(), -b.beta().unwrap(), epsilon = 1e-7);
    assert_relative_eq!(a.p_value().unwrap(), b.p_value().unwrap(), max_relative = 1e-6);
}

#[test]
fn mds_coordinates_work_as_covariates_in_a_scan() {
    let mut rng = StdRng::seed_from_u64(17);
    let n = 60;
    let features = Array2::from_shape_fn((n, 40), |_| u8::from(rng.gen_bool(0.4)));
    let samples = SampleMatrix::new(features).unwrap();
    let embedding = compute_mds(&samples, 2, 4).unwrap();
    assert_eq!(embedding.coordinates.dim(), (n, 2));

    let y: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
    let phenotype = Phenotype::new(Array1::from(y)).unwrap();
    let kmers: Vec<Kmer> = (0..25)
        .map(|k| {
            let presence: Vec<u8> = (0..n).map(|_| u8::from(rng.gen_bool(0.3))).collect();
            Kmer::new(format!("kmer{k}"), &presence).unwrap()
        })
        .collect();

    let config = FitConfig {
        min_frequency: 0.05,
        max_frequency: 0.95,
        ..FitConfig::default()
    };
    let scan = run_association(
        kmers,
        &phenotype,
        Some(embedding.coordinates.view()),
        &config,
        &NoopScanProgress,
    )
    .unwrap();

    assert_eq!(scan.kmers.len() + scan.filtered, 25);
    for kmer in &scan.kmers {
        match kmer.estimate() {
            Some(estimate) => {
                assert!(estimate.coefficient.is_finite());
                assert!(estimate.standard_error > 0.0);
                assert!((0.0..=1.0).contains(&estimate.p_value));
            }
            None => assert_eq!(kmer.comments().last(), Some(&Diagnostic::FirthFail)),
        }
    }
}
