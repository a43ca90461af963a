//! Streaming reader over replay files
//!
//! Yields one [`ReplayCommand`] per CSV row without loading the file into
//! memory. Row-level problems are yielded as `Err` so the caller can log and
//! skip them; only failing to open the file is fatal.
//!
//! ```no_run
//! use checkout_engine::io::ReplayReader;
//! use std::path::Path;
//!
//! let reader = ReplayReader::new(Path::new("orders.csv")).unwrap();
//! for row in reader {
//!     match row {
//!         Ok(command) => println!("order {}", command.order()),
//!         Err(e) => eprintln!("skipping: {}", e),
//!     }
//! }
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord, ReplayCommand};
use crate::types::PaymentError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug)]
pub struct ReplayReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl ReplayReader {
    /// Open a replay file
    ///
    /// The CSV reader trims whitespace, tolerates rows with fewer columns
    /// than the header, and buffers 8KB at a time.
    ///
    /// # Errors
    ///
    /// * `FileNotFound` if nothing exists at `path`
    /// * `IoError` for any other open failure
    pub fn new(path: &Path) -> Result<Self, PaymentError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PaymentError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => PaymentError::from(e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for ReplayReader {
    type Item = Result<ReplayCommand, PaymentError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let row = deserializer.next()?;
        self.line_num += 1;

        Some(match row {
            Ok(record) => convert_csv_record(record).map_err(|message| PaymentError::ParseError {
                line: Some(self.line_num),
                message,
            }),
            Err(e) => Err(PaymentError::ParseError {
                line: Some(self.line_num),
                message: e.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Amount;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "type,order,amount,method,phone,pin,card_number,card_expiry,card_cvv,receipts,actor,note,reference,due_date\n";

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_missing_file() {
        let result = ReplayReader::new(Path::new("nonexistent.csv"));
        assert!(matches!(result, Err(PaymentError::FileNotFound { .. })));
    }

    #[test]
    fn test_reads_rows_in_order() {
        let file = create_temp_csv(&format!(
            "{}open,1,50000,,,,,,,,admin,,,\npay,1,20000,mtn_momo,0772123456,1234,,,,,,,,\n",
            HEADER
        ));
        let rows: Vec<_> = ReplayReader::new(file.path()).unwrap().collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &ReplayCommand::Open {
                order: 1,
                total: Amount::new(50_000),
                actor: "admin".to_string()
            }
        );
        assert!(matches!(rows[1], Ok(ReplayCommand::Pay { .. })));
    }

    #[test]
    fn test_short_rows_and_whitespace() {
        let file = create_temp_csv("type,order,amount\n  open ,  3 ,  100  \n");
        let rows: Vec<_> = ReplayReader::new(file.path()).unwrap().collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().order(), 3);
    }

    #[test]
    fn test_bad_row_reports_line_and_continues() {
        let file = create_temp_csv(&format!(
            "{}open,1,100,,,,,,,,,,,\nopen,x,100,,,,,,,,,,,\nrefund,2,5,,,,,,,,,,,\nopen,3,100,,,,,,,,,,,\n",
            HEADER
        ));
        let rows: Vec<_> = ReplayReader::new(file.path()).unwrap().collect();

        assert_eq!(rows.len(), 4);
        assert!(rows[0].is_ok());
        assert!(matches!(
            rows[1],
            Err(PaymentError::ParseError { line: Some(3), .. })
        ));
        assert!(matches!(
            rows[2],
            Err(PaymentError::ParseError { line: Some(4), .. })
        ));
        assert!(rows[3].is_ok());
    }
}
