//! I/O module
//!
//! Handles replay file parsing and ledger output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (row conversion, output serialization)
//! - `reader` - Streaming reader with iterator interface

pub mod csv_format;
pub mod reader;

pub use csv_format::{
    convert_csv_record, parse_receipt_targets, write_orders_csv, write_summary_csv, CsvRecord,
    ReplayCommand,
};
pub use reader::ReplayReader;
