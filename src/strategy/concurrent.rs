//! Concurrent replay strategy
//!
//! Reads rows in batches and, within each batch, partitions them by order.
//! Each order's rows run in file order on their own task; different orders
//! run in parallel on a multi-thread runtime.
//!
//! # Architecture
//!
//! ```text
//! ConcurrentStrategy
//!     ├── ReplaySettings (engine config, workers, output shape)
//!     ├── ReplayReader   (streaming CSV rows)
//!     └── Arc<Replayer>  (shared engine, DashMap-backed ledgers)
//! ```
//!
//! # Ordering
//!
//! Batches are processed one after another, so an order whose rows span
//! several batches still sees them in file order. Cross-order ordering is not
//! preserved and does not need to be: ledgers are independent per order.

use crate::io::csv_format::ReplayCommand;
use crate::io::reader::ReplayReader;
use crate::strategy::{partition_by_order, ReplaySettings, ReplayStrategy, Replayer};
use crate::types::PaymentError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Rows read before a batch is dispatched
const BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct ConcurrentStrategy {
    settings: ReplaySettings,
}

impl ConcurrentStrategy {
    pub fn new(settings: ReplaySettings) -> Self {
        Self { settings }
    }
}

/// Run one batch: one task per order, wait for all of them
async fn process_batch(replayer: &Arc<Replayer>, batch: Vec<(u64, ReplayCommand)>) {
    let partitions = partition_by_order(batch);

    let mut handles = Vec::with_capacity(partitions.len());
    for (order, rows) in partitions {
        let replayer = Arc::clone(replayer);
        let handle = tokio::spawn(async move {
            for (line, command) in rows {
                replayer.apply_logged(line, command).await;
            }
        });
        handles.push((order, handle));
    }

    for (order, handle) in handles {
        if let Err(e) = handle.await {
            error!(order, error = %e, "order task panicked");
        }
    }
}

impl ReplayStrategy for ConcurrentStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), PaymentError> {
        let mut reader = ReplayReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.settings.workers.max(1))
            .enable_all()
            .build()
            .map_err(|e| PaymentError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(async {
            let replayer = Arc::new(Replayer::sandbox(Arc::clone(&self.settings.config))?);

            // header is line 1
            let mut line = 1u64;
            let mut batches = 0usize;
            loop {
                let mut batch = Vec::with_capacity(BATCH_SIZE);
                let mut read = 0usize;
                for row in reader.by_ref().take(BATCH_SIZE) {
                    read += 1;
                    line += 1;
                    match row {
                        Ok(command) => batch.push((line, command)),
                        Err(e) => warn!(line, error = %e, "row skipped"),
                    }
                }
                if read == 0 {
                    break;
                }
                batches += 1;
                process_batch(&replayer, batch).await;
            }
            info!(
                rows = line - 1,
                batches,
                workers = self.settings.workers,
                mode = "concurrent",
                "replay finished"
            );

            replayer.write(self.settings.output, output).await
        })
    }
}
