//! Checkout Engine CLI
//!
//! Replays checkout and ledger commands from a CSV file against a sandbox
//! engine and prints the resulting order ledgers.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- orders.csv > ledgers.csv
//! cargo run -- --mode concurrent --workers 8 orders.csv > ledgers.csv
//! cargo run -- --summary orders.csv > summary.csv
//! RUST_LOG=checkout_engine=info cargo run -- orders.csv
//! ```
//!
//! Logs go to stderr; the CSV goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, invalid configuration, etc.)

use checkout_engine::cli;
use checkout_engine::config::EngineConfig;
use checkout_engine::strategy;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    let settings = args.to_replay_settings(EngineConfig::from_env());
    let strategy = strategy::create_strategy(args.mode, settings);

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        error!(error = %e, "replay failed");
        process::exit(1);
    }
}
