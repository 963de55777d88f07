// ========================================================================================
//
//                           THE COMMAND LINE: SEER
//
// ========================================================================================
//
// The binary owns every resource of a run: the parsed arguments, the logger, the
// global rayon pool and the progress bar. The library only ever sees validated
// inputs and a `FitConfig`.
//
// ### Subcommands ###
//
// 1.  **`seer mds`:** reads a binary sample-by-feature table, computes pairwise
//     Manhattan distances on a bounded worker pool and writes the leading metric
//     MDS coordinates.
//
// 2.  **`seer assoc`:** reads the phenotype and the k-mer table (reordered to the
//     phenotype's samples), optionally adds MDS coordinates as covariates, and
//     writes one result row per k-mer that passes the frequency filter.
//
// Configuration comes from an optional TOML file; individual flags override it.
// Any error ends the run with `Error: ...` on stderr and exit status 1.

#![deny(unused_variables)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use seer::config::FitConfig;
use seer::io::{
    read_coordinates, read_kmers, read_phenotype, read_sample_matrix, write_coordinates,
    write_results,
};
use seer::pipeline::{ScanProgressObserver, ScanStage, run_association};
use seer::structure::compute_mds;

#[derive(Parser)]
#[command(
    name = "seer",
    about = "Sequence element association with logistic regression and MDS population structure",
    long_about = "Computes a metric MDS embedding of samples from binary k-mer presence, and \
                 tests each k-mer for association with a binary phenotype using logistic \
                 regression with Newton-Raphson and Firth fallbacks."
)]
struct Cli {
    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed samples with metric MDS on pairwise Manhattan distances
    #[command(about = "Compute MDS coordinates (outputs: coordinates TSV)")]
    Mds(MdsArgs),

    /// Test every k-mer for association with the phenotype
    #[command(about = "Run the association scan (outputs: results TSV)")]
    Assoc(AssocArgs),
}

#[derive(Args)]
struct MdsArgs {
    /// Sample-by-feature TSV with 0/1 cells
    #[arg(value_name = "SAMPLE_MATRIX")]
    samples: PathBuf,

    /// Number of MDS dimensions to keep
    #[arg(long, value_name = "K", default_value = "3")]
    dimensions: usize,

    /// Worker threads for the distance matrix
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    threads: usize,

    /// Output path for the coordinates
    #[arg(long, short, default_value = "mds.tsv")]
    output: PathBuf,
}

#[derive(Args)]
struct AssocArgs {
    /// Phenotype TSV (sample, 0/1)
    #[arg(value_name = "PHENOTYPE")]
    phenotype: PathBuf,

    /// K-mer presence TSV (kmer, one 0/1 column per sample)
    #[arg(value_name = "KMERS")]
    kmers: PathBuf,

    /// Coordinates TSV from `seer mds`, added as covariates
    #[arg(long, value_name = "PATH")]
    coordinates: Option<PathBuf>,

    /// Only use the first N coordinate dimensions
    #[arg(long, value_name = "N", requires = "coordinates")]
    dimensions: Option<usize>,

    /// TOML file with fit settings; flags below take precedence
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Convergence tolerance for BFGS and Newton-Raphson
    #[arg(long)]
    convergence_limit: Option<f64>,

    /// Newton-Raphson iteration cap (per mode)
    #[arg(long)]
    max_nr_iterations: Option<usize>,

    /// BFGS iteration cap
    #[arg(long)]
    bfgs_max_iterations: Option<usize>,

    /// Skip k-mers present in fewer than this fraction of samples
    #[arg(long)]
    min_frequency: Option<f64>,

    /// Skip k-mers present in more than this fraction of samples
    #[arg(long)]
    max_frequency: Option<f64>,

    /// Worker threads for fitting
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    threads: usize,

    /// Output path for the results
    #[arg(long, short, default_value = "seer_results.tsv")]
    output: PathBuf,
}

impl AssocArgs {
    fn fit_config(&self) -> Result<FitConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => FitConfig::load(path)?,
            None => FitConfig::default(),
        };
        if let Some(v) = self.convergence_limit {
            config.convergence_limit = v;
        }
        if let Some(v) = self.max_nr_iterations {
            config.max_nr_iterations = v;
        }
        if let Some(v) = self.bfgs_max_iterations {
            config.bfgs_max_iterations = v;
        }
        if let Some(v) = self.min_frequency {
            config.min_frequency = v;
        }
        if let Some(v) = self.max_frequency {
            config.max_frequency = v;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Renders scan stages on a single stderr progress bar.
struct ScanProgressBar {
    bar: ProgressBar,
}

impl ScanProgressBar {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(0), draw_target);
        bar.set_style(
            ProgressStyle::with_template(
                "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )?
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        Ok(Self { bar })
    }
}

impl ScanProgressObserver for ScanProgressBar {
    fn on_stage_start(&self, stage: ScanStage, total_variants: usize) {
        self.bar.reset();
        self.bar.set_length(total_variants as u64);
        self.bar.set_message(stage.describe());
    }

    fn on_stage_advance(&self, _stage: ScanStage, processed_variants: usize) {
        self.bar.set_position(processed_variants as u64);
    }

    fn on_stage_finish(&self, _stage: ScanStage) {
        self.bar.finish_and_clear();
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Some(Commands::Mds(args)) => run_mds(args),
        Some(Commands::Assoc(args)) => run_assoc(args),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|err| Box::new(err) as Box<dyn std::error::Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(level: &str) {
    let log_level = level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Warning: Invalid log level '{level}' provided. Defaulting to Info.");
        log::LevelFilter::Info
    });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

fn run_mds(args: MdsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let (samples, matrix) = read_sample_matrix(&args.samples)?;
    let embedding = compute_mds(&matrix, args.dimensions, args.threads)?;
    write_coordinates(&args.output, &samples, &embedding)?;
    log::info!(
        "Wrote {} x {} coordinates to {} in {:.2?}",
        embedding.n_samples(),
        embedding.dimensions(),
        args.output.display(),
        start.elapsed()
    );
    Ok(())
}

fn run_assoc(args: AssocArgs) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let config = args.fit_config()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.max(1))
        .build_global()?;

    let (samples, phenotype) = read_phenotype(&args.phenotype)?;
    let covariates = match &args.coordinates {
        Some(path) => {
            let mut coordinates = read_coordinates(path, &samples)?;
            if let Some(k) = args.dimensions {
                if k == 0 || k > coordinates.ncols() {
                    return Err(format!(
                        "--dimensions must be between 1 and {}, got {k}",
                        coordinates.ncols()
                    )
                    .into());
                }
                coordinates = coordinates.slice_move(ndarray::s![.., ..k]);
            }
            for (j, column) in coordinates.columns().into_iter().enumerate() {
                if column.iter().all(|v| *v == 0.0) {
                    log::warn!(
                        "Coordinate column MDS{} is all zero; fits with it as a covariate will fail",
                        j + 1
                    );
                }
            }
            Some(coordinates)
        }
        None => None,
    };
    let kmers = read_kmers(&args.kmers, &samples)?;

    let progress = ScanProgressBar::new()?;
    let scan = run_association(
        kmers,
        &phenotype,
        covariates.as_ref().map(|c| c.view()),
        &config,
        &progress,
    )?;
    write_results(&args.output, &scan.kmers)?;

    log::info!(
        "Tested {} k-mers ({} filtered, {} failed) in {:.2?}; results in {}",
        scan.kmers.len(),
        scan.filtered,
        scan.failed(),
        start.elapsed(),
        args.output.display()
    );
    Ok(())
}
