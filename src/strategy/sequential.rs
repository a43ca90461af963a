//! Sequential replay strategy
//!
//! Streams rows in file order on a current-thread runtime. Every row is
//! finished, including its receipt dispatch, before the next one is read.

use crate::io::reader::ReplayReader;
use crate::strategy::{ReplaySettings, ReplayStrategy, Replayer};
use crate::types::PaymentError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SequentialStrategy {
    settings: ReplaySettings,
}

impl SequentialStrategy {
    pub fn new(settings: ReplaySettings) -> Self {
        Self { settings }
    }
}

impl ReplayStrategy for SequentialStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), PaymentError> {
        let reader = ReplayReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PaymentError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(async {
            let replayer = Replayer::sandbox(Arc::clone(&self.settings.config))?;

            let mut rows = 0u64;
            for (index, row) in reader.enumerate() {
                // header is line 1
                let line = index as u64 + 2;
                match row {
                    Ok(command) => replayer.apply_logged(line, command).await,
                    Err(e) => warn!(line, error = %e, "row skipped"),
                }
                rows += 1;
            }
            info!(rows, mode = "sequential", "replay finished");

            replayer.write(self.settings.output, output).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::OutputKind;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sequential_replay_writes_orders() {
        let file = create_temp_csv(
            "type,order,amount,method,phone,pin\n\
             open,1,50000,,,\n\
             pay,1,20000,mtn_momo,0772123456,1234\n\
             pay,1,30000,mtn_momo,0772123456,1234\n\
             open,2,10000,,,\n",
        );

        let strategy = SequentialStrategy::new(ReplaySettings::default());
        let mut output = Vec::new();
        strategy.process(file.path(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,50000,50000,0,paid,"));
        assert_eq!(lines[2], "2,10000,0,10000,unpaid,,");
    }

    #[test]
    fn test_identical_pay_rows_are_each_charged() {
        let file = create_temp_csv(
            "type,order,amount,method\n\
             open,1,20000,\n\
             pay,1,10000,cash\n\
             pay,1,10000,cash\n",
        );

        let mut output = Vec::new();
        SequentialStrategy::new(ReplaySettings::default())
            .process(file.path(), &mut output)
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].starts_with("1,20000,20000,0,paid,"));
    }

    #[test]
    fn test_sequential_replay_skips_bad_rows() {
        let file = create_temp_csv(
            "type,order,amount,method\n\
             open,1,500,\n\
             pay,1,900,cash\n\
             bogus,1,1,\n\
             pay,1,500,cash\n",
        );

        let settings = ReplaySettings {
            output: OutputKind::Summary,
            ..ReplaySettings::default()
        };
        let mut output = Vec::new();
        SequentialStrategy::new(settings)
            .process(file.path(), &mut output)
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(&fields[..3], &["1", "1", "500"]);
        assert_eq!(Decimal::from_str(fields[3]).unwrap(), Decimal::from(500));
        assert_eq!(Decimal::from_str(fields[4]).unwrap(), Decimal::ONE_HUNDRED);
        assert!(!fields[5].is_empty());
        assert_eq!(&fields[6..], &["paid", "unpaid>paid"]);
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let strategy = SequentialStrategy::new(ReplaySettings::default());
        let mut output = Vec::new();
        let result = strategy.process(Path::new("does-not-exist.csv"), &mut output);
        assert!(matches!(result, Err(PaymentError::FileNotFound { .. })));
        assert!(output.is_empty());
    }
}
