//! Error types for the checkout engine
//!
//! This module defines all error types that can occur while pricing,
//! submitting and reconciling payments. Errors are designed to be descriptive
//! enough to show next to a retry action.
//!
//! # Error Categories
//!
//! - **Input Errors**: invalid amounts, failed field validation, unknown methods
//! - **Rail Errors**: adapter declines and timeouts (both retryable)
//! - **Ledger Errors**: missing orders, version conflicts, invalid adjustments
//! - **Delivery Errors**: receipt channel failures (never fatal to a payment)
//! - **I/O Errors**: file and CSV problems in the replay binary

use crate::types::{Amount, OrderId, TransactionId};
use std::fmt;
use thiserror::Error;

/// A single field that failed validation in the details step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for the checkout engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaymentError {
    /// Amount is zero, negative or malformed
    #[error("Invalid amount '{amount}'")]
    InvalidAmount { amount: String },

    /// No rail could be derived from the descriptor
    ///
    /// The resolver itself never fails; this only surfaces for a catalog entry
    /// that lists no rails at all.
    #[error("Payment method '{method}' has no rail to route to")]
    UnresolvedRail { method: String },

    /// One or more detail fields are missing or malformed
    ///
    /// Recoverable: the session stays in the details step.
    #[error("Validation failed: {}", join_fields(errors))]
    ValidationFailed { errors: Vec<FieldError> },

    /// The rail declined the payment
    #[error("Payment failed: {reason}")]
    AdapterFailure { reason: String },

    /// The rail did not answer within the configured bound
    ///
    /// Retryable like `AdapterFailure`, but kept apart since the true outcome
    /// at the rail is unknown.
    #[error("Payment network timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// A receipt could not be delivered on one channel
    #[error("Receipt delivery via {channel} failed: {reason}")]
    ReceiptDeliveryFailure { channel: String, reason: String },

    /// The rail took the money but the ledger credit could not be written
    ///
    /// The transaction is kept by the engine until a later reconciliation
    /// pass applies it.
    #[error("Payment {tx} on order {order} succeeded but is not yet on the ledger: {reason}")]
    UnappliedPayment {
        order: OrderId,
        tx: TransactionId,
        reason: String,
    },

    /// Optimistic version check failed; the writer must reload and reapply
    #[error("Ledger conflict on order {order}: expected version {expected}, found {actual}")]
    LedgerConflict {
        order: OrderId,
        expected: u64,
        actual: u64,
    },

    /// Order has no ledger
    #[error("Order {order} not found")]
    OrderNotFound { order: OrderId },

    /// Order was already opened
    #[error("Order {order} already exists")]
    OrderAlreadyExists { order: OrderId },

    /// Payment larger than what is still owed
    #[error("Amount {requested} exceeds balance due {balance_due} on order {order}")]
    ExceedsBalance {
        order: OrderId,
        requested: Amount,
        balance_due: Amount,
    },

    /// Adjustment would leave the ledger inconsistent
    #[error("Invalid adjustment on order {order}: {reason}")]
    InvalidAdjustment { order: OrderId, reason: String },

    /// Method id not present in the catalog
    #[error("Unknown payment method '{method}'")]
    UnknownMethod { method: String },

    /// A state machine was asked for a transition it does not allow
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Only succeeded transactions may reach the ledger
    #[error("Transaction {tx} has not succeeded")]
    TransactionNotSettled { tx: TransactionId },

    /// A credit id was applied to the ledger before
    #[error("Credit {tx} was already applied")]
    DuplicateCredit { tx: TransactionId },

    /// Manual payment id is unknown
    #[error("Pending payment {id} not found")]
    PendingPaymentNotFound { id: TransactionId },

    /// Replay row refers to a manual payment that was never recorded
    #[error("No manual payment '{reference}' recorded for order {order}")]
    UnknownReference { order: OrderId, reference: String },

    /// Event history is not contiguous
    #[error("History gap on order {order} at sequence {sequence}")]
    HistoryGap { order: OrderId, sequence: u64 },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for order {order}")]
    ArithmeticOverflow { operation: String, order: OrderId },

    /// Catalog or environment configuration is inconsistent
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// File not found at the specified path
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError { message: String },

    /// CSV parsing error occurred
    ///
    /// Recoverable in the replay binary: the row is skipped.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },
}

impl From<std::io::Error> for PaymentError {
    fn from(error: std::io::Error) -> Self {
        PaymentError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for PaymentError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        PaymentError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl PaymentError {
    /// Whether the failed state offers a retry that preserves order and amount
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::AdapterFailure { .. }
                | PaymentError::Timeout { .. }
                | PaymentError::LedgerConflict { .. }
        )
    }

    pub fn invalid_amount(amount: impl Into<String>) -> Self {
        PaymentError::InvalidAmount {
            amount: amount.into(),
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        PaymentError::ValidationFailed { errors }
    }

    pub fn adapter_failure(reason: impl Into<String>) -> Self {
        PaymentError::AdapterFailure {
            reason: reason.into(),
        }
    }

    pub fn receipt_delivery(channel: impl fmt::Display, reason: impl Into<String>) -> Self {
        PaymentError::ReceiptDeliveryFailure {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    pub fn ledger_conflict(order: OrderId, expected: u64, actual: u64) -> Self {
        PaymentError::LedgerConflict {
            order,
            expected,
            actual,
        }
    }

    pub fn order_not_found(order: OrderId) -> Self {
        PaymentError::OrderNotFound { order }
    }

    pub fn order_already_exists(order: OrderId) -> Self {
        PaymentError::OrderAlreadyExists { order }
    }

    pub fn exceeds_balance(order: OrderId, requested: Amount, balance_due: Amount) -> Self {
        PaymentError::ExceedsBalance {
            order,
            requested,
            balance_due,
        }
    }

    pub fn invalid_adjustment(order: OrderId, reason: &str) -> Self {
        PaymentError::InvalidAdjustment {
            order,
            reason: reason.to_string(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        PaymentError::UnknownMethod {
            method: method.to_string(),
        }
    }

    pub fn invalid_transition(from: &str, to: &str) -> Self {
        PaymentError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn transaction_not_settled(tx: TransactionId) -> Self {
        PaymentError::TransactionNotSettled { tx }
    }

    pub fn duplicate_credit(tx: TransactionId) -> Self {
        PaymentError::DuplicateCredit { tx }
    }

    pub fn unapplied_payment(order: OrderId, tx: TransactionId, reason: impl fmt::Display) -> Self {
        PaymentError::UnappliedPayment {
            order,
            tx,
            reason: reason.to_string(),
        }
    }

    pub fn history_gap(order: OrderId, sequence: u64) -> Self {
        PaymentError::HistoryGap { order, sequence }
    }

    pub fn arithmetic_overflow(operation: &str, order: OrderId) -> Self {
        PaymentError::ArithmeticOverflow {
            operation: operation.to_string(),
            order,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        PaymentError::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_amount(
        PaymentError::InvalidAmount { amount: "-5".to_string() },
        "Invalid amount '-5'"
    )]
    #[case::validation(
        PaymentError::ValidationFailed { errors: vec![
            FieldError::new("pin", "must be 4 digits"),
            FieldError::new("phone", "is required"),
        ] },
        "Validation failed: pin: must be 4 digits; phone: is required"
    )]
    #[case::timeout(
        PaymentError::Timeout { millis: 30_000 },
        "Payment network timed out after 30000ms"
    )]
    #[case::receipt(
        PaymentError::ReceiptDeliveryFailure { channel: "sms".to_string(), reason: "gateway down".to_string() },
        "Receipt delivery via sms failed: gateway down"
    )]
    #[case::conflict(
        PaymentError::LedgerConflict { order: 7, expected: 2, actual: 3 },
        "Ledger conflict on order 7: expected version 2, found 3"
    )]
    #[case::unapplied(
        PaymentError::UnappliedPayment { order: 2, tx: uuid::Uuid::nil(), reason: "conflict".to_string() },
        "Payment 00000000-0000-0000-0000-000000000000 on order 2 succeeded but is not yet on the ledger: conflict"
    )]
    #[case::exceeds(
        PaymentError::ExceedsBalance { order: 1, requested: Amount::new(60_000), balance_due: Amount::new(50_000) },
        "Amount 60000 exceeds balance due 50000 on order 1"
    )]
    #[case::parse_error_with_line(
        PaymentError::ParseError { line: Some(42), message: "Invalid field".to_string() },
        "CSV parse error at line 42: Invalid field"
    )]
    #[case::parse_error_without_line(
        PaymentError::ParseError { line: None, message: "Invalid field".to_string() },
        "CSV parse error: Invalid field"
    )]
    fn test_error_display(#[case] error: PaymentError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::overflow(
        PaymentError::arithmetic_overflow("payment", 3),
        PaymentError::ArithmeticOverflow { operation: "payment".to_string(), order: 3 }
    )]
    #[case::transition(
        PaymentError::invalid_transition("succeeded", "processing"),
        PaymentError::InvalidTransition { from: "succeeded".to_string(), to: "processing".to_string() }
    )]
    #[case::receipt(
        PaymentError::receipt_delivery("email", "bounced"),
        PaymentError::ReceiptDeliveryFailure { channel: "email".to_string(), reason: "bounced".to_string() }
    )]
    fn test_helper_functions(#[case] result: PaymentError, #[case] expected: PaymentError) {
        assert_eq!(result, expected);
    }

    #[rstest]
    #[case::declined(PaymentError::adapter_failure("insufficient funds"), true)]
    #[case::timeout(PaymentError::Timeout { millis: 1 }, true)]
    #[case::validation(PaymentError::validation(vec![]), false)]
    #[case::receipt(PaymentError::receipt_delivery("sms", "x"), false)]
    fn test_retryable(#[case] error: PaymentError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: PaymentError = io_error.into();
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
