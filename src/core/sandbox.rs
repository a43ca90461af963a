//! Sandbox implementations of the external boundaries
//!
//! Used by the replay binary and by tests. The gateway answers according to a
//! fixed [`GatewayBehavior`] and counts how often it was actually charged, so
//! tests can assert that duplicate submissions never reach the network.

use crate::core::receipts::{ChannelKind, Receipt};
use crate::core::traits::{RailGateway, ReceiptChannel};
use crate::types::{Outcome, PaymentError, RailRequest};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayBehavior {
    Approve,
    Decline(String),
    /// Approve after a delay
    Delay(Duration),
    /// Never answer
    Hang,
}

#[derive(Debug)]
pub struct ScriptedGateway {
    name: String,
    behavior: GatewayBehavior,
    charges: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(name: impl Into<String>, behavior: GatewayBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            charges: AtomicUsize::new(0),
        }
    }

    pub fn approving(name: impl Into<String>) -> Self {
        Self::new(name, GatewayBehavior::Approve)
    }

    /// Number of charges that reached this gateway
    pub fn charges(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    fn approve(&self, n: usize) -> Outcome {
        Outcome::Approved {
            external_ref: format!("{}-{:06}", self.name.to_uppercase(), n),
        }
    }
}

#[async_trait]
impl RailGateway for ScriptedGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn charge(&self, request: &RailRequest) -> Outcome {
        let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            gateway = %self.name,
            rail = %request.rail,
            amount = %request.principal,
            fee = %request.fee,
            reference = %request.merchant_reference,
            "sandbox charge"
        );

        match &self.behavior {
            GatewayBehavior::Approve => self.approve(n),
            GatewayBehavior::Decline(reason) => Outcome::declined(reason.clone()),
            GatewayBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                self.approve(n)
            }
            GatewayBehavior::Hang => std::future::pending::<Outcome>().await,
        }
    }
}

/// Channel that logs every receipt and always succeeds
#[derive(Debug)]
pub struct LoggingChannel {
    kind: ChannelKind,
    delivered: Mutex<Vec<String>>,
}

impl LoggingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Destinations delivered to so far
    pub fn delivered(&self) -> Vec<String> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReceiptChannel for LoggingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, destination: &str, receipt: &Receipt) -> Result<(), PaymentError> {
        info!(channel = %self.kind, destination, receipt = %receipt.render(), "receipt sent");
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(destination.to_string());
        }
        Ok(())
    }
}

/// Channel that always fails with a fixed reason
#[derive(Debug)]
pub struct ScriptedChannel {
    kind: ChannelKind,
    reason: String,
}

impl ScriptedChannel {
    pub fn failing(kind: ChannelKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ReceiptChannel for ScriptedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, _destination: &str, _receipt: &Receipt) -> Result<(), PaymentError> {
        Err(PaymentError::receipt_delivery(self.kind, self.reason.clone()))
    }
}
