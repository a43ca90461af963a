use crate::config::EngineConfig;
use crate::strategy::{OutputKind, ReplaySettings};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Replay checkout and ledger commands against a sandbox engine
#[derive(Parser, Debug)]
#[command(name = "checkout-engine")]
#[command(about = "Replay checkout and ledger commands and print the resulting order ledgers", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing replay rows
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// How rows are scheduled
    #[arg(
        long = "mode",
        value_name = "MODE",
        default_value = "sequential",
        help = "'sequential' for file order or 'concurrent' for parallel orders"
    )]
    pub mode: ReplayMode,

    /// Rail adapter timeout in milliseconds
    #[arg(
        long = "adapter-timeout-ms",
        value_name = "MILLIS",
        help = "Bound on each rail submission (default: 30000 or CHECKOUT_ADAPTER_TIMEOUT_MS)"
    )]
    pub adapter_timeout_ms: Option<u64>,

    /// Idempotency window in seconds
    #[arg(
        long = "idempotency-window-secs",
        value_name = "SECS",
        help = "Duplicate submissions inside this window collapse (default: 60 or CHECKOUT_IDEMPOTENCY_WINDOW_SECS)"
    )]
    pub idempotency_window_secs: Option<u64>,

    /// Worker threads (concurrent mode only)
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Worker threads for concurrent mode (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    /// Write reconciliation summaries instead of order ledgers
    #[arg(long = "summary")]
    pub summary: bool,
}

/// Available replay modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReplayMode {
    Sequential,
    Concurrent,
}

impl CliArgs {
    /// Apply CLI overrides on top of `base`
    ///
    /// Each override produces a new configuration snapshot. Zero values are
    /// ignored with a warning.
    pub fn to_engine_config(&self, base: EngineConfig) -> EngineConfig {
        let mut config = base;

        match self.adapter_timeout_ms {
            Some(0) => warn!(
                default = config.adapter_timeout.as_millis() as u64,
                "ignoring zero adapter timeout"
            ),
            Some(millis) => config = config.with_adapter_timeout(Duration::from_millis(millis)),
            None => {}
        }

        match self.idempotency_window_secs {
            Some(0) => warn!(
                default = config.idempotency_window.as_secs(),
                "ignoring zero idempotency window"
            ),
            Some(secs) => config = config.with_idempotency_window(Duration::from_secs(secs)),
            None => {}
        }

        config
    }

    /// Build replay settings from CLI arguments
    ///
    /// # Returns
    ///
    /// `ReplaySettings` with values from CLI arguments or defaults.
    pub fn to_replay_settings(&self, base: EngineConfig) -> ReplaySettings {
        let default = ReplaySettings::default();
        let workers = match self.workers {
            Some(0) => {
                warn!(default = default.workers, "ignoring zero worker count");
                default.workers
            }
            Some(workers) => workers,
            None => default.workers,
        };

        ReplaySettings {
            config: Arc::new(self.to_engine_config(base)),
            workers,
            output: if self.summary {
                OutputKind::Summary
            } else {
                OutputKind::Orders
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_mode(&["program", "input.csv"], ReplayMode::Sequential)]
    #[case::explicit_sequential(&["program", "--mode", "sequential", "input.csv"], ReplayMode::Sequential)]
    #[case::explicit_concurrent(&["program", "--mode", "concurrent", "input.csv"], ReplayMode::Concurrent)]
    fn test_mode_parsing(#[case] args: &[&str], #[case] expected: ReplayMode) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.mode, expected);
    }

    #[rstest]
    #[case::no_overrides(&["program", "input.csv"], 30_000, 60, 1)]
    #[case::timeout(&["program", "--adapter-timeout-ms", "500", "input.csv"], 500, 60, 2)]
    #[case::window(&["program", "--idempotency-window-secs", "5", "input.csv"], 30_000, 5, 2)]
    #[case::both(
        &["program", "--adapter-timeout-ms", "500", "--idempotency-window-secs", "5", "input.csv"],
        500,
        5,
        3
    )]
    #[case::zero_timeout_ignored(&["program", "--adapter-timeout-ms", "0", "input.csv"], 30_000, 60, 1)]
    fn test_engine_config_overrides(
        #[case] args: &[&str],
        #[case] timeout_ms: u64,
        #[case] window_secs: u64,
        #[case] version: u64,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_engine_config(EngineConfig::default());

        assert_eq!(config.adapter_timeout, Duration::from_millis(timeout_ms));
        assert_eq!(config.idempotency_window, Duration::from_secs(window_secs));
        assert_eq!(config.version, version);
    }

    #[rstest]
    #[case::defaults(&["program", "input.csv"], num_cpus::get(), OutputKind::Orders)]
    #[case::workers(&["program", "--workers", "8", "input.csv"], 8, OutputKind::Orders)]
    #[case::zero_workers(&["program", "--workers", "0", "input.csv"], num_cpus::get(), OutputKind::Orders)]
    #[case::summary(&["program", "--summary", "input.csv"], num_cpus::get(), OutputKind::Summary)]
    fn test_replay_settings(
        #[case] args: &[&str],
        #[case] workers: usize,
        #[case] output: OutputKind,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let settings = parsed.to_replay_settings(EngineConfig::default());

        assert_eq!(settings.workers, workers);
        assert_eq!(settings.output, output);
    }

    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_mode(&["program", "--mode", "parallel", "input.csv"])]
    #[case::negative_timeout(&["program", "--adapter-timeout-ms", "-1", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
