//! Manual payments awaiting counterparty confirmation
//!
//! Payments made outside a rail (bank deposit, cash handed to a driver) are
//! recorded as pending and only reach the ledger once the receiving side
//! confirms them. Confirmation is idempotent: the pending payment's id is the
//! ledger credit id, so a second confirmation appends nothing.

use crate::core::ledger_store::{LedgerStore, LedgerView};
use crate::types::{Amount, Attribution, Credit, OrderId, PaymentError, TransactionId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualPaymentStatus {
    Pending,
    Confirmed { by: String, at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualPayment {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub amount: Amount,
    /// Free-form description of how the money moved (e.g. "bank_transfer")
    pub method: String,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
    pub note: Option<String>,
    pub status: ManualPaymentStatus,
}

/// Book of manual payments awaiting counterparty confirmation
///
/// Recording never touches the ledger. Only [`confirm`](Self::confirm)
/// credits the order, through the same optimistic reapply loop as rail
/// payments.
#[derive(Debug)]
pub struct PaymentConfirmations {
    ledger: Arc<LedgerStore>,
    retry_limit: u32,
    payments: DashMap<TransactionId, ManualPayment>,
}

impl PaymentConfirmations {
    /// Create an empty book over `ledger`
    ///
    /// # Arguments
    ///
    /// * `ledger` - Store confirmed payments are credited to
    /// * `retry_limit` - Reapply attempts after a ledger version conflict
    pub fn new(ledger: Arc<LedgerStore>, retry_limit: u32) -> Self {
        Self {
            ledger,
            retry_limit,
            payments: DashMap::new(),
        }
    }

    /// Record a payment as pending
    ///
    /// # Arguments
    ///
    /// * `order` - Order the money was paid towards
    /// * `amount` - Amount claimed, in minor units
    /// * `method` - How the money moved, free-form
    /// * `who` - Actor recording the payment, with an optional note
    ///
    /// # Returns
    ///
    /// The pending payment; its `id` is what the counterparty confirms
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `OrderNotFound` if the order was never opened
    /// - `ExceedsBalance` if `amount` is more than the order still owes
    pub fn record(
        &self,
        order: OrderId,
        amount: Amount,
        method: &str,
        who: Attribution,
    ) -> Result<ManualPayment, PaymentError> {
        if !amount.is_positive() {
            return Err(PaymentError::invalid_amount(amount.to_string()));
        }
        let view = self.ledger.view(order)?;
        if amount > view.balance_due {
            return Err(PaymentError::exceeds_balance(order, amount, view.balance_due));
        }

        let payment = ManualPayment {
            id: Uuid::new_v4(),
            order_id: order,
            amount,
            method: method.to_string(),
            recorded_by: who.actor,
            recorded_at: who.at,
            note: who.note,
            status: ManualPaymentStatus::Pending,
        };
        info!(order, payment = %payment.id, amount = %amount, method, "manual payment recorded");
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    /// Confirm a pending payment and credit it to the ledger
    ///
    /// Confirming an already confirmed payment credits nothing and returns
    /// the current view.
    ///
    /// # Arguments
    ///
    /// * `id` - Id returned by [`record`](Self::record)
    /// * `who` - Counterparty confirming the payment
    ///
    /// # Errors
    ///
    /// - `PendingPaymentNotFound` if `id` was never recorded
    /// - `LedgerConflict` if the retry limit is exhausted
    pub fn confirm(&self, id: TransactionId, who: Attribution) -> Result<LedgerView, PaymentError> {
        let (order, credit) = {
            let payment = self
                .payments
                .get(&id)
                .ok_or(PaymentError::PendingPaymentNotFound { id })?;
            let at = match &payment.status {
                ManualPaymentStatus::Confirmed { at, .. } => *at,
                ManualPaymentStatus::Pending => who.at,
            };
            (
                payment.order_id,
                Credit {
                    id,
                    amount: payment.amount,
                    at,
                },
            )
        };

        let view = self.ledger.reapply(order, self.retry_limit, |store, version| {
            store.apply_credit(order, &credit, version, who.clone())
        })?;

        if let Some(mut payment) = self.payments.get_mut(&id) {
            if payment.status == ManualPaymentStatus::Pending {
                payment.status = ManualPaymentStatus::Confirmed {
                    by: who.actor.clone(),
                    at: who.at,
                };
                info!(order, payment = %id, by = %who.actor, "manual payment confirmed");
            }
        }
        Ok(view)
    }

    pub fn get(&self, id: &TransactionId) -> Option<ManualPayment> {
        self.payments.get(id).map(|p| p.clone())
    }

    /// Unconfirmed payments of one order, oldest first
    pub fn pending_for(&self, order: OrderId) -> Vec<ManualPayment> {
        let mut pending: Vec<ManualPayment> = self
            .payments
            .iter()
            .filter(|p| p.order_id == order && p.status == ManualPaymentStatus::Pending)
            .map(|p| p.clone())
            .collect();
        pending.sort_by_key(|p| p.recorded_at);
        pending
    }
}
