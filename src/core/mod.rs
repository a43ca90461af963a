//! Core business logic module
//!
//! This module contains the checkout and ledger components:
//! - `traits` - Boundaries to rails, gateways, receipt channels and history
//! - `resolver` - Credential to rail resolution
//! - `fees` - Tiered fee calculation
//! - `rails` - Rail adapters and their timeout/idempotency guard
//! - `checkout` - Checkout session state machine
//! - `engine` - Checkout orchestration
//! - `expiring` - Time-bounded idempotency state
//! - `ledger_store` - Per-order ledgers with optimistic concurrency
//! - `confirmations` - Manual payments awaiting confirmation
//! - `receipts` - Receipt fan-out
//! - `reconciliation` - Summary statistics over ledger history
//! - `sandbox` - In-process gateway and channel implementations

pub mod checkout;
pub mod confirmations;
pub mod engine;
pub mod expiring;
pub mod fees;
pub mod ledger_store;
pub mod rails;
pub mod receipts;
pub mod reconciliation;
pub mod resolver;
pub mod sandbox;
pub mod traits;

pub use checkout::{CheckoutSession, CheckoutState};
pub use confirmations::{ManualPayment, ManualPaymentStatus, PaymentConfirmations};
pub use engine::{CheckoutEngine, CheckoutOutcome, Quote, UnappliedPayment};
pub use expiring::ExpiringMap;
pub use fees::FeeCalculator;
pub use ledger_store::{LedgerStore, LedgerView};
pub use rails::RailAdapters;
pub use receipts::{ChannelKind, DeliveryReport, Receipt, ReceiptDispatcher, ReceiptTarget};
pub use reconciliation::{summarize, LedgerSummary, ReconciliationView, StatusTransition};
pub use resolver::NetworkResolver;
pub use traits::{OrderHistory, RailAdapter, RailGateway, ReceiptChannel};
