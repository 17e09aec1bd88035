use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Merge and clean Schwab CSV exports before feeding them to a capital gains
/// calculator.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with tool defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the run summary as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge transaction exports, dropping duplicates and internal transfers
    MergeTransactions {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Keep transfer rows that have no matching counterpart
        #[arg(long)]
        keep_unmatched_transfers: bool,
        /// Leave transfer rows untouched
        #[arg(long)]
        no_transfer_filter: bool,
    },
    /// Merge equity award exports
    MergeAwards {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Merge initial price files; later files override earlier ones
    MergePrices {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Merge spin-off files; later files override earlier ones
    MergeSpinOffs {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Fill missing symbols and fix rounding in a transaction export
    Postprocess {
        file: PathBuf,
        /// Defaults to <stem>_processed.csv next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write one line per changed cell to this file
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
        #[command(flatten)]
        fixes: FixArgs,
        /// Leave missing symbols empty
        #[arg(long)]
        no_fix_symbols: bool,
        /// Only fill symbols on rows that move a security
        #[arg(long)]
        securities_only: bool,
    },
    /// Merge and postprocess in one go, writing into a directory
    Prepare {
        #[arg(long, required = true, num_args = 1..)]
        transactions: Vec<PathBuf>,
        #[arg(long, num_args = 1..)]
        awards: Vec<PathBuf>,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        #[command(flatten)]
        fixes: FixArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FixArgs {
    /// Description,Symbol CSV used before generating symbols
    #[arg(short, long, value_name = "MAPPING")]
    pub mapping: Option<PathBuf>,
    /// Correct amounts that disagree with quantity x price by a rounding error
    #[arg(long)]
    pub fix_rounding: bool,
    /// Drop rows after the end of this UK tax year (e.g. 2024 for 2024/25)
    #[arg(long, value_name = "YEAR")]
    pub tax_year: Option<i32>,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
