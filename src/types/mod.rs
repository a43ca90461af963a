//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `amount`: Integer money in minor units
//! - `method`: Rails, operators, fee schedules and the method catalog entry
//! - `transaction`: Credentials, idempotency keys and the transaction record
//! - `ledger`: Order ledger aggregate and its append-only events
//! - `error`: Error types for the checkout engine

pub mod amount;
pub mod error;
pub mod ledger;
pub mod method;
pub mod transaction;

pub use amount::Amount;
pub use error::{FieldError, PaymentError};
pub use ledger::{
    Attribution, Credit, LedgerAction, LedgerEvent, LedgerSnapshot, OrderId, OrderLedger,
    PaymentStatus,
};
pub use method::{
    FeeBand, FeeSchedule, MethodId, Operator, PaymentMethodDescriptor, Rail, RailKind,
};
pub use transaction::{
    CardDetails, Credential, Failure, FailureKind, IdempotencyKey, Outcome, RailRequest,
    Transaction, TransactionId, TransactionRequest, TransactionStatus,
};
