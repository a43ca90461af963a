//! Checkout Engine Library
//! # Overview
//!
//! This library turns a checkout request into a priced, dispatched and
//! reconciled payment across mobile-money, card and cash rails, and keeps an
//! event-sourced ledger per order.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Amount, Transaction, OrderLedger, etc.)
//! - [`config`] - Versioned engine configuration and the method catalog
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::resolver`] - Credential to rail resolution
//!   - [`core::fees`] - Tiered fee calculation
//!   - [`core::rails`] - Rail adapters behind a timeout and idempotency guard
//!   - [`core::checkout`] - Checkout session state machine
//!   - [`core::engine`] - Checkout orchestration
//!   - [`core::ledger_store`] - Per-order ledgers with optimistic concurrency
//!   - [`core::receipts`] - Receipt fan-out
//!   - [`core::reconciliation`] - Summary statistics over ledger history
//! - [`io`] - Replay file parsing and CSV output
//! - [`strategy`] - Sequential and concurrent replay pipelines
//!
//! # Checkout flow
//!
//! ```text
//! selecting → details → processing → succeeded
//!                                  ↘ failed → (retry) → selecting
//! ```
//!
//! A succeeded payment appends one `payment_updated` event to the order's
//! ledger before its receipts are dispatched. A failed one leaves the ledger
//! untouched.
//!
//! # Payment status
//!
//! Always derived from the ledger amounts:
//! - `unpaid`: nothing paid
//! - `partially_paid`: `0 < amount_paid < total_amount`
//! - `paid`: `balance_due == 0` and `amount_paid > 0`

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use config::EngineConfig;
pub use core::{CheckoutEngine, CheckoutSession, LedgerStore, LedgerView, ReconciliationView};
pub use io::{write_orders_csv, write_summary_csv};
pub use types::{
    Amount, Credential, LedgerEvent, OrderId, OrderLedger, Outcome, PaymentError, PaymentStatus,
    Transaction, TransactionId,
};
