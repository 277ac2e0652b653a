use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::constants::{DEFAULT_CHUNK_DELAY_MS, DEFAULT_CHUNK_MONTHS};

#[derive(Parser)]
#[command(name = "fxpipeline")]
#[command(about = "IMF monthly exchange rate pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch one month of exchange rates (default: last month)
    Fetch {
        /// Period to fetch, YYYY-MM
        #[arg(long)]
        period: Option<String>,
        /// Re-fetch even when the stored dataset is complete
        #[arg(long)]
        force: bool,
        /// Validate the dataset after fetching; exits non-zero on FAIL
        #[arg(long)]
        validate: bool,
    },
    /// Chunked historical backfill
    Backfill {
        /// First period, YYYY-MM (default: 2000-01)
        #[arg(long)]
        start: Option<String>,
        /// Last period, YYYY-MM (default: last month)
        #[arg(long)]
        end: Option<String>,
        /// Months per API call
        #[arg(long, default_value_t = DEFAULT_CHUNK_MONTHS)]
        chunk_months: usize,
        /// Delay between chunk calls in milliseconds
        #[arg(long, default_value_t = DEFAULT_CHUNK_DELAY_MS)]
        delay_ms: u64,
        /// Re-fetch periods even when their datasets are complete
        #[arg(long)]
        force: bool,
        /// Also write a combined exchange_rates_ALL.csv
        #[arg(long)]
        combined: bool,
    },
    /// Run the validation battery against one stored period
    Validate {
        /// Period to validate, YYYY-MM
        #[arg(long)]
        period: String,
        /// Skip all live API calls
        #[arg(long)]
        offline: bool,
        /// Compare stored rates against a live re-fetch
        #[arg(long)]
        accuracy: bool,
        /// Exit non-zero when the report status is FAIL
        #[arg(long)]
        fail_on_issues: bool,
    },
    /// Compare stored rates against the live source across many periods
    CrossValidate {
        /// First period of an explicit range, YYYY-MM
        #[arg(long)]
        start: Option<String>,
        /// Last period of an explicit range, YYYY-MM
        #[arg(long)]
        end: Option<String>,
        /// Check a random sample of N stored periods
        #[arg(long)]
        sample: Option<usize>,
    },
    /// Stage the latest dataset and write a batch manifest
    Prepare,
    /// Process a batch manifest (default: newest pending manifest)
    Process {
        /// Explicit manifest path
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Show stored datasets, ledger and pending batches
    Status,
}

pub fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { period, force, validate } => {
            commands::fetch::run(period, force, validate);
        }
        Commands::Backfill { start, end, chunk_months, delay_ms, force, combined } => {
            commands::backfill::run(start, end, chunk_months, delay_ms, force, combined);
        }
        Commands::Validate { period, offline, accuracy, fail_on_issues } => {
            commands::validate::run(period, offline, accuracy, fail_on_issues);
        }
        Commands::CrossValidate { start, end, sample } => {
            commands::cross_validate::run(start, end, sample);
        }
        Commands::Prepare => {
            commands::prepare::run();
        }
        Commands::Process { manifest } => {
            commands::process::run(manifest);
        }
        Commands::Status => {
            commands::status::run();
        }
    }
}
