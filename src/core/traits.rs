//! Core traits at the engine's external boundaries
//!
//! Rails, payment networks, receipt channels and history sources are all
//! reached through these traits so that production integrations and the
//! sandbox implementations can be swapped without touching the engine.

use crate::core::receipts::{ChannelKind, Receipt};
use crate::types::{LedgerEvent, OrderId, Outcome, PaymentError, RailKind, RailRequest};
use async_trait::async_trait;

/// One payment rail as seen by the engine
///
/// Implementations must return a terminal [`Outcome`]. Repeating a submission
/// with the same idempotency key must not move money twice.
#[async_trait]
pub trait RailAdapter: Send + Sync {
    /// Rail family this adapter serves
    fn kind(&self) -> RailKind;

    /// Submit a priced payment and wait for its terminal outcome
    async fn submit(&self, request: &RailRequest) -> Outcome;
}

/// External payment network behind an adapter (operator API, card acquirer)
#[async_trait]
pub trait RailGateway: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn charge(&self, request: &RailRequest) -> Outcome;
}

/// Outbound receipt channel
#[async_trait]
pub trait ReceiptChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver `receipt` to `destination` (phone number, address, chat handle)
    async fn send(&self, destination: &str, receipt: &Receipt) -> Result<(), PaymentError>;
}

/// Source of an order's ledger history
///
/// The returned history may be stale; it is never more than a prefix behind.
#[async_trait]
pub trait OrderHistory: Send + Sync {
    async fn get_order_history(&self, order: OrderId) -> Result<Vec<LedgerEvent>, PaymentError>;
}
