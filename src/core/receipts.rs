//! Receipt fan-out
//!
//! After a payment has been recorded in the ledger, the engine hands a
//! [`Receipt`] to the [`ReceiptDispatcher`], which sends it over every selected
//! channel concurrently. Channels are independent: a failure on one is
//! reported for that channel only and never affects the payment.

use crate::core::traits::ReceiptChannel;
use crate::core::ledger_store::LedgerView;
use crate::types::{
    Amount, MethodId, OrderId, PaymentError, PaymentStatus, Rail, Transaction, TransactionId,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Receipt delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Sms,
    Email,
    /// Chat messenger (WhatsApp)
    Chat,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Sms => "sms",
            ChannelKind::Email => "email",
            ChannelKind::Chat => "chat",
        };
        f.write_str(name)
    }
}

impl FromStr for ChannelKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(ChannelKind::Sms),
            "email" => Ok(ChannelKind::Email),
            "chat" | "whatsapp" => Ok(ChannelKind::Chat),
            other => Err(PaymentError::invalid_config(format!(
                "unknown receipt channel '{}'",
                other
            ))),
        }
    }
}

/// Where one copy of the receipt should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptTarget {
    pub channel: ChannelKind,
    pub destination: String,
}

impl ReceiptTarget {
    pub fn new(channel: ChannelKind, destination: impl Into<String>) -> Self {
        Self {
            channel,
            destination: destination.into(),
        }
    }
}

/// Receipt payload for a succeeded payment
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub receipt_number: String,
    pub order_id: OrderId,
    pub transaction_id: TransactionId,
    pub method: MethodId,
    pub rail: Rail,
    pub principal: Amount,
    pub fee: Amount,
    pub debited: Amount,
    pub external_ref: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub balance_due: Amount,
    pub payment_status: PaymentStatus,
}

impl Receipt {
    pub fn new(tx: &Transaction, ledger: &LedgerView) -> Self {
        Self {
            receipt_number: tx.receipt_number(),
            order_id: tx.order_id(),
            transaction_id: tx.id(),
            method: tx.method().to_string(),
            rail: tx.rail(),
            principal: tx.principal(),
            fee: tx.fee(),
            debited: tx.debited(),
            external_ref: tx.external_ref().map(str::to_string),
            issued_at: tx.resolved_at().unwrap_or_else(|| tx.created_at()),
            balance_due: ledger.balance_due,
            payment_status: ledger.payment_status,
        }
    }

    /// Plain-text rendering for SMS and chat
    pub fn render(&self) -> String {
        format!(
            "Receipt {} | Order #{} | Paid {} via {} (fee {}, total {}) | Ref {} | Balance due {} ({})",
            self.receipt_number,
            self.order_id,
            self.principal,
            self.rail,
            self.fee,
            self.debited,
            self.external_ref.as_deref().unwrap_or("-"),
            self.balance_due,
            self.payment_status,
        )
    }
}

/// Result of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResult {
    pub channel: ChannelKind,
    pub destination: String,
    pub result: Result<(), PaymentError>,
}

/// Per-channel outcome of a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryReport {
    /// No channel selected; a physical receipt is issued instead
    Physical,
    Channels(Vec<ChannelResult>),
}

impl DeliveryReport {
    pub fn failures(&self) -> Vec<&ChannelResult> {
        match self {
            DeliveryReport::Physical => Vec::new(),
            DeliveryReport::Channels(results) => {
                results.iter().filter(|r| r.result.is_err()).collect()
            }
        }
    }

    pub fn result_for(&self, channel: ChannelKind) -> Option<&Result<(), PaymentError>> {
        match self {
            DeliveryReport::Physical => None,
            DeliveryReport::Channels(results) => results
                .iter()
                .find(|r| r.channel == channel)
                .map(|r| &r.result),
        }
    }
}

#[derive(Default, Clone)]
pub struct ReceiptDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn ReceiptChannel>>,
}

impl ReceiptDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, replacing any previous one of the same kind
    pub fn with_channel(mut self, channel: Arc<dyn ReceiptChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    /// Send `receipt` to every target concurrently
    ///
    /// Best effort: a failing channel is logged and reported but never
    /// affects the other channels or the payment.
    ///
    /// # Arguments
    ///
    /// * `receipt` - Rendered receipt of a succeeded payment
    /// * `targets` - Channels and destinations the payer asked for
    ///
    /// # Returns
    ///
    /// `DeliveryReport::Physical` when no target was given, otherwise one
    /// result per target
    pub async fn dispatch(&self, receipt: &Receipt, targets: &[ReceiptTarget]) -> DeliveryReport {
        if targets.is_empty() {
            info!(
                order = receipt.order_id,
                receipt = %receipt.receipt_number,
                "no receipt channel selected, issuing physical receipt"
            );
            return DeliveryReport::Physical;
        }

        let sends = targets.iter().map(|target| async move {
            let result = match self.channels.get(&target.channel) {
                Some(channel) => channel.send(&target.destination, receipt).await,
                None => Err(PaymentError::receipt_delivery(
                    target.channel,
                    "channel not configured",
                )),
            };
            if let Err(e) = &result {
                warn!(
                    order = receipt.order_id,
                    channel = %target.channel,
                    error = %e,
                    "receipt delivery failed"
                );
            }
            ChannelResult {
                channel: target.channel,
                destination: target.destination.clone(),
                result,
            }
        });

        DeliveryReport::Channels(join_all(sends).await)
    }
}

impl fmt::Debug for ReceiptDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiptDispatcher")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::{LoggingChannel, ScriptedChannel};
    use chrono::TimeZone;
    use rstest::rstest;
    use uuid::Uuid;

    fn receipt() -> Receipt {
        Receipt {
            receipt_number: "RCP-20261016-ABCDEF12".to_string(),
            order_id: 1,
            transaction_id: Uuid::nil(),
            method: "mtn_momo".to_string(),
            rail: Rail::Cash,
            principal: Amount::new(50_000),
            fee: Amount::ZERO,
            debited: Amount::new(50_000),
            external_ref: None,
            issued_at: Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).single().unwrap(),
            balance_due: Amount::ZERO,
            payment_status: PaymentStatus::Paid,
        }
    }

    #[rstest]
    #[case::sms("sms", ChannelKind::Sms)]
    #[case::whatsapp("WhatsApp", ChannelKind::Chat)]
    #[case::email(" email ", ChannelKind::Email)]
    fn test_channel_parsing(#[case] input: &str, #[case] expected: ChannelKind) {
        assert_eq!(input.parse::<ChannelKind>().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_empty_targets_issue_physical_receipt() {
        let dispatcher = ReceiptDispatcher::new();
        assert_eq!(dispatcher.dispatch(&receipt(), &[]).await, DeliveryReport::Physical);
    }

    #[tokio::test]
    async fn test_channels_fail_independently() {
        let email = Arc::new(LoggingChannel::new(ChannelKind::Email));
        let dispatcher = ReceiptDispatcher::new()
            .with_channel(Arc::new(ScriptedChannel::failing(ChannelKind::Sms, "gateway down")))
            .with_channel(email.clone());

        let report = dispatcher
            .dispatch(
                &receipt(),
                &[
                    ReceiptTarget::new(ChannelKind::Sms, "0772123456"),
                    ReceiptTarget::new(ChannelKind::Email, "payer@example.com"),
                ],
            )
            .await;

        assert!(matches!(
            report.result_for(ChannelKind::Sms),
            Some(Err(PaymentError::ReceiptDeliveryFailure { .. }))
        ));
        assert_eq!(report.result_for(ChannelKind::Email), Some(&Ok(())));
        assert_eq!(report.failures().len(), 1);
        assert_eq!(email.delivered(), vec!["payer@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_unconfigured_channel_reports_failure() {
        let report = ReceiptDispatcher::new()
            .dispatch(&receipt(), &[ReceiptTarget::new(ChannelKind::Chat, "+256772123456")])
            .await;
        assert_eq!(report.failures().len(), 1);
    }
}
