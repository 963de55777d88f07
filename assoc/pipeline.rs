use crate::config::FitConfig;
use crate::fit::Fitter;
use crate::optimizer::Maximizer;
use crate::types::{AssocError, Kmer, Phenotype};
use ndarray::ArrayView2;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stages reported during an association scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanStage {
    FrequencyFilter,
    Fitting,
}

impl ScanStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::FrequencyFilter => "frequency filtering",
            Self::Fitting => "logistic fitting",
        }
    }
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting progress of a scan. Called from worker threads.
pub trait ScanProgressObserver: Sync {
    fn on_stage_start(&self, stage: ScanStage, total_variants: usize) {
        let _ = (stage, total_variants);
    }
    fn on_stage_advance(&self, stage: ScanStage, processed_variants: usize) {
        let _ = (stage, processed_variants);
    }
    fn on_stage_finish(&self, stage: ScanStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopScanProgress;

impl ScanProgressObserver for NoopScanProgress {}

/// Tested variants, in input order, plus counts for the summary line.
#[derive(Debug)]
pub struct AssociationScan {
    pub kmers: Vec<Kmer>,
    pub filtered: usize,
}

impl AssociationScan {
    /// Variants for which every fitting stage failed.
    pub fn failed(&self) -> usize {
        self.kmers.iter().filter(|k| k.is_failed()).count()
    }

    /// Variants that needed at least one fallback but still produced an estimate.
    pub fn recovered(&self) -> usize {
        self.kmers
            .iter()
            .filter(|k| k.estimate().is_some() && !k.comments().is_empty())
            .count()
    }
}

/// Fits every variant that passes the frequency filter. Variants are independent,
/// so they are fitted in parallel on the global rayon pool; output order matches
/// input order.
pub fn run_association(
    kmers: Vec<Kmer>,
    phenotype: &Phenotype,
    covariates: Option<ArrayView2<f64>>,
    config: &FitConfig,
    progress: &dyn ScanProgressObserver,
) -> Result<AssociationScan, AssocError> {
    run_association_with(
        &Fitter::from_config(config),
        kmers,
        phenotype,
        covariates,
        config,
        progress,
    )
}

/// As [`run_association`], with a caller-supplied fitter.
pub fn run_association_with<M: Maximizer + Sync>(
    fitter: &Fitter<M>,
    kmers: Vec<Kmer>,
    phenotype: &Phenotype,
    covariates: Option<ArrayView2<f64>>,
    config: &FitConfig,
    progress: &dyn ScanProgressObserver,
) -> Result<AssociationScan, AssocError> {
    if let Some(c) = covariates {
        if c.nrows() != phenotype.len() {
            return Err(AssocError::LengthMismatch {
                what: "Covariate matrix",
                found: c.nrows(),
                expected: phenotype.len(),
            });
        }
    }

    let total = kmers.len();
    progress.on_stage_start(ScanStage::FrequencyFilter, total);
    let to_test: Vec<Kmer> = kmers
        .into_iter()
        .filter(|k| config.passes_frequency_filter(k.frequency()))
        .collect();
    let filtered = total - to_test.len();
    progress.on_stage_advance(ScanStage::FrequencyFilter, total);
    progress.on_stage_finish(ScanStage::FrequencyFilter);
    log::info!(
        "{} of {total} variants pass the frequency filter [{}, {}]",
        to_test.len(),
        config.min_frequency,
        config.max_frequency
    );

    progress.on_stage_start(ScanStage::Fitting, to_test.len());
    let processed = AtomicUsize::new(0);
    let fitted = to_test
        .into_par_iter()
        .map(|kmer| {
            let result = fitter.fit_variant(kmer, phenotype, covariates);
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            progress.on_stage_advance(ScanStage::Fitting, done);
            result
        })
        .collect::<Result<Vec<_>, _>>()?;
    progress.on_stage_finish(ScanStage::Fitting);

    let scan = AssociationScan {
        kmers: fitted,
        filtered,
    };
    log::info!(
        "Fitted {} variants: {} recovered by fallback, {} failed",
        scan.kmers.len(),
        scan.recovered(),
        scan.failed()
    );
    Ok(scan)
}
