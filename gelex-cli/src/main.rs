//! gelex: genomic prediction and association.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gelex_geno::error_kind;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gelex",
    version,
    about = "Bayesian genomic prediction, GRM construction, REML and mixed-model association",
    long_about = "Fits Bayes alphabet models on PLINK genotypes, builds genomic relationship\n\
                  matrices, estimates variance components by AI-REML, runs Wald scans\n\
                  (optionally leave-one-chromosome-out) and predicts new cohorts."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a genomic relationship matrix (optionally one per chromosome)
    Grm(commands::grm::GrmArgs),

    /// Fit a Bayes alphabet model by MCMC
    Fit(commands::fit::FitArgs),

    /// Fit the null model by AI-REML and run a Wald scan
    Assoc(commands::assoc::AssocArgs),

    /// Predict genetic values of a new cohort from fitted effects
    Predict(commands::predict::PredictArgs),
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Grm(args) => commands::grm::run(args),
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Assoc(args) => commands::assoc::run(args),
        Commands::Predict(args) => commands::predict::run(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("gelex v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match error_kind(&err) {
                Some(kind) => eprintln!("error[{}]: {:#}", kind, err),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
