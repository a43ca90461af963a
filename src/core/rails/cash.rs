//! Cash rail
//!
//! Cash on delivery never leaves the system: the adapter approves locally with
//! a reference derived from the idempotency key.

use crate::core::traits::RailAdapter;
use crate::types::{Credential, Outcome, RailKind, RailRequest};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct CashAdapter;

#[async_trait]
impl RailAdapter for CashAdapter {
    fn kind(&self) -> RailKind {
        RailKind::Cash
    }

    async fn submit(&self, request: &RailRequest) -> Outcome {
        if request.credential != Credential::Cash {
            return Outcome::declined("cash rail takes no credential");
        }
        let key = request.idempotency_key.as_str();
        Outcome::Approved {
            external_ref: format!("CASH-{}", key[..key.len().min(12)].to_uppercase()),
        }
    }
}
