// ========================================================================================
//
//                       THE ASSOCIATION ENGINE: SEER
//
// ========================================================================================
//
// Tests k-mers for association with a binary phenotype. Each k-mer gets its own
// logistic regression, optionally adjusted for population structure.
//
// ### Layout ###
//
// - `structure`: pairwise sample distances and their metric MDS embedding.
// - `likelihood`: the logistic model, its information matrix and the Wald test.
// - `fast`, `newton`, `fit`: the per-variant chain of BFGS, then Newton-Raphson,
//   then Firth-penalized Newton-Raphson. Each failed stage leaves a diagnostic tag.
// - `pipeline`: the frequency filter and the parallel scan over variants.
// - `io`, `config`: tab-separated tables and TOML fit settings.

#![deny(unused_variables)]
pub mod config;
pub mod fast;
pub mod fit;
pub mod io;
pub mod likelihood;
pub mod newton;
pub mod optimizer;
pub mod pipeline;
pub mod types;

// Population structure lives beside the association code
#[path = "../structure/mod.rs"]
pub mod structure;

pub use config::{ConfigError, FitConfig};
pub use fit::{Fitter, StageRunner, fit_variant, run_fallback_chain};
pub use pipeline::{AssociationScan, NoopScanProgress, ScanProgressObserver, ScanStage, run_association};
pub use types::{
    AssocError, Diagnostic, FailureReason, FitEstimate, FitOutcome, FitStage, Kmer, Phenotype,
    VariantFit,
};
