//! Replay strategy module
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! covering both CSV parsing and engine processing. This allows different
//! processing implementations (sequential, concurrent per order) to be selected
//! at runtime.

use crate::cli::ReplayMode;
use crate::config::EngineConfig;
use crate::types::PaymentError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub mod concurrent;
pub mod replayer;
pub mod sequential;

pub use concurrent::ConcurrentStrategy;
pub use replayer::{partition_by_order, Replayer};
pub use sequential::SequentialStrategy;

/// What the replay writes once all rows are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// One row per order with its final ledger state
    #[default]
    Orders,
    /// One row per order with reconciliation statistics
    Summary,
}

/// Settings shared by every strategy
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub config: Arc<EngineConfig>,
    /// Worker threads for the concurrent strategy
    pub workers: usize,
    pub output: OutputKind,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            config: Arc::new(EngineConfig::default()),
            workers: num_cpus::get(),
            output: OutputKind::Orders,
        }
    }
}

/// Replay strategy trait for complete pipelines
///
/// Each strategy reads commands from a CSV file, applies them to a fresh
/// sandbox engine, and writes the final ledgers to output.
pub trait ReplayStrategy: Send + Sync {
    /// Replay `input_path` and write the result to `output`
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the replay CSV file
    /// * `output` - Writer for the orders or summary CSV
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - The engine configuration is inconsistent
    /// - Output cannot be written
    ///
    /// Row-level errors are logged and the row is skipped.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), PaymentError>;
}

/// Create a replay strategy for `mode`
///
/// # Arguments
///
/// * `mode` - Sequential or concurrent processing
/// * `settings` - Engine configuration, worker count and output shape
///
/// # Returns
///
/// A boxed trait object implementing the ReplayStrategy trait
pub fn create_strategy(mode: ReplayMode, settings: ReplaySettings) -> Box<dyn ReplayStrategy> {
    match mode {
        ReplayMode::Sequential => Box::new(SequentialStrategy::new(settings)),
        ReplayMode::Concurrent => Box::new(ConcurrentStrategy::new(settings)),
    }
}
