//! Checkout orchestration
//!
//! This module provides the `CheckoutEngine`, which turns a checkout session
//! into a priced, dispatched and reconciled payment.
//!
//! # Architecture
//!
//! ```text
//! CheckoutEngine
//!     ├── Arc<EngineConfig>        (versioned catalog and limits)
//!     ├── NetworkResolver          (credential → rail)
//!     ├── FeeCalculator            (rail + amount → fee)
//!     ├── RailAdapters             (guarded adapter per rail kind)
//!     ├── Arc<LedgerStore>         (per-order ledgers and history)
//!     └── Arc<ReceiptDispatcher>   (best-effort receipt fan-out)
//! ```
//!
//! # Processing order
//!
//! Within one attempt: validate → resolve → fee → idempotency key → submit →
//! settle. On success the ledger update completes before the receipt dispatch
//! task is spawned. On failure the ledger is not touched.
//!
//! A payment the rail accepted but the ledger refused is parked in the
//! unapplied queue; [`CheckoutEngine::reconcile_unapplied`] retries it.

use crate::config::EngineConfig;
use crate::core::checkout::CheckoutSession;
use crate::core::expiring::ExpiringMap;
use crate::core::fees::FeeCalculator;
use crate::core::ledger_store::{LedgerStore, LedgerView};
use crate::core::rails::{CardBrand, RailAdapters};
use crate::core::receipts::{ChannelKind, DeliveryReport, Receipt, ReceiptDispatcher, ReceiptTarget};
use crate::core::resolver::NetworkResolver;
use crate::core::sandbox::LoggingChannel;
use crate::core::traits::RailAdapter;
use crate::types::{
    Amount, Attribution, Credential, IdempotencyKey, MethodId, OrderId, Outcome, PaymentError,
    Rail, RailRequest, Transaction, TransactionId, TransactionRequest,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Price of paying `principal` with a method, shown before submission
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub method: MethodId,
    pub rail: Rail,
    pub principal: Amount,
    pub fee: Amount,
    pub debit_total: Amount,
    pub card_brand: Option<CardBrand>,
    pub average_latency: Duration,
}

/// A settled payment whose ledger credit has not been written
#[derive(Debug, Clone)]
pub struct UnappliedPayment {
    pub transaction: Transaction,
    /// Attribution the ledger event will carry once applied
    pub attribution: Attribution,
    /// Why the last attempt to apply it failed
    pub reason: String,
}

/// Result of a successful submission
#[derive(Debug)]
pub struct CheckoutOutcome {
    pub transaction: Transaction,
    /// Ledger state right after the payment was applied
    pub ledger: LedgerView,
    /// Receipt delivery, running in the background
    pub deliveries: JoinHandle<DeliveryReport>,
}

pub struct CheckoutEngine {
    config: Arc<EngineConfig>,
    resolver: NetworkResolver,
    fees: FeeCalculator,
    rails: RailAdapters,
    ledger: Arc<LedgerStore>,
    receipts: Arc<ReceiptDispatcher>,
    /// Transaction id per idempotency key, so duplicate submissions share one
    attempts: ExpiringMap<IdempotencyKey, TransactionId>,
    unapplied: DashMap<TransactionId, UnappliedPayment>,
    clock: fn() -> DateTime<Utc>,
}

impl CheckoutEngine {
    /// Create an engine over explicit collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Catalog, limits and idempotency window
    /// * `rails` - One guarded adapter per rail kind
    /// * `ledger` - Store the engine credits succeeded payments to
    /// * `receipts` - Dispatcher for receipts after a successful payment
    ///
    /// # Errors
    ///
    /// `InvalidConfig` / `UnresolvedRail` if the catalog is inconsistent.
    pub fn new(
        config: Arc<EngineConfig>,
        rails: RailAdapters,
        ledger: Arc<LedgerStore>,
        receipts: Arc<ReceiptDispatcher>,
    ) -> Result<Self, PaymentError> {
        config.validate()?;
        let fees = FeeCalculator::from_config(&config)?;
        info!(
            config_version = config.version,
            methods = config.methods.len(),
            "checkout engine ready"
        );

        Ok(Self {
            resolver: NetworkResolver::new(&config),
            fees,
            rails,
            ledger,
            receipts,
            attempts: ExpiringMap::new(config.idempotency_retention()),
            unapplied: DashMap::new(),
            clock: Utc::now,
            config,
        })
    }

    /// Engine over approving sandbox gateways and logging receipt channels
    pub fn sandbox(config: Arc<EngineConfig>) -> Result<Self, PaymentError> {
        let rails = RailAdapters::sandbox(&config)?;
        let receipts = ReceiptDispatcher::new()
            .with_channel(Arc::new(LoggingChannel::new(ChannelKind::Sms)))
            .with_channel(Arc::new(LoggingChannel::new(ChannelKind::Email)))
            .with_channel(Arc::new(LoggingChannel::new(ChannelKind::Chat)));
        Self::new(
            config,
            rails,
            Arc::new(LedgerStore::new()),
            Arc::new(receipts),
        )
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Start a checkout for part or all of an order's balance
    ///
    /// The balance check runs against the ledger as it is now; a concurrent
    /// payment that settles first can still leave this one overpaying.
    ///
    /// # Arguments
    ///
    /// * `order` - Order to pay towards
    /// * `amount` - Principal to collect, in minor units
    ///
    /// # Returns
    ///
    /// A session in `selecting`; tag it with
    /// [`with_reference`](CheckoutSession::with_reference) when the caller has
    /// its own request identity
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `OrderNotFound` if the order was never opened
    /// - `ExceedsBalance` if `amount` is more than the order still owes
    pub fn begin(&self, order: OrderId, amount: Amount) -> Result<CheckoutSession, PaymentError> {
        if !amount.is_positive() {
            return Err(PaymentError::invalid_amount(amount.to_string()));
        }
        let view = self.ledger.view(order)?;
        if amount > view.balance_due {
            return Err(PaymentError::exceeds_balance(order, amount, view.balance_due));
        }
        Ok(CheckoutSession::new(order, amount, Arc::clone(&self.config)))
    }

    /// Price a payment without submitting it
    ///
    /// # Arguments
    ///
    /// * `method_id` - Catalog entry the payer picked
    /// * `credential` - Details entered so far; only used to pick the rail
    /// * `amount` - Principal to price
    ///
    /// # Returns
    ///
    /// The resolved rail, the fee and the total the payer will be debited
    ///
    /// # Errors
    ///
    /// - `UnknownMethod` if `method_id` is not in the catalog
    /// - `InvalidAmount` if `amount` is not positive or the total overflows
    pub fn quote(
        &self,
        method_id: &str,
        credential: &Credential,
        amount: Amount,
    ) -> Result<Quote, PaymentError> {
        let descriptor = self.config.method(method_id)?;
        let rail = self.resolver.resolve(descriptor, credential);
        let fee = self.fees.compute_fee(rail, amount)?;
        let debit_total = amount
            .checked_add(fee)
            .ok_or_else(|| PaymentError::invalid_amount(amount.to_string()))?;
        let card_brand = match credential {
            Credential::Card(card) => Some(CardBrand::detect(&card.number)),
            _ => None,
        };

        Ok(Quote {
            method: descriptor.id.clone(),
            rail,
            principal: amount,
            fee,
            debit_total,
            card_brand,
            average_latency: descriptor.average_latency,
        })
    }

    /// Run the processing step of a session in `details`
    ///
    /// On success the session ends in `succeeded`, the ledger has been
    /// updated, and receipt delivery is running in the background.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed`: the session stays in `details`
    /// - `AdapterFailure` / `Timeout`: the session ends in `failed` and the
    ///   ledger is untouched; [`CheckoutSession::retry`] starts a new attempt
    /// - `UnappliedPayment`: the rail succeeded and the session ends in
    ///   `succeeded`, but the ledger refused the credit; the transaction
    ///   waits in [`unapplied`](Self::unapplied)
    pub async fn submit(
        &self,
        session: &mut CheckoutSession,
        credential: Credential,
        receipts: Vec<ReceiptTarget>,
        actor: &str,
    ) -> Result<CheckoutOutcome, PaymentError> {
        let method_id = session.validate_details(&credential)?;
        let descriptor = self.config.method(&method_id)?;
        let order = session.order_id();

        let rail = self.resolver.resolve(descriptor, &credential);
        let fee = self.fees.compute_fee(rail, session.amount())?;
        let created_at = self.now();
        let mut key = IdempotencyKey::derive(
            order,
            &method_id,
            session.amount(),
            created_at,
            self.config.idempotency_window,
            session.attempt(),
        );
        if let Some(reference) = session.reference() {
            key = key.scoped(reference);
        }
        let tx_id = self.attempts.get_or_insert_with(key.clone(), Uuid::new_v4);

        let request = TransactionRequest {
            order_id: order,
            amount: session.amount(),
            method_id,
            credential,
            idempotency_key: key,
        };
        let mut tx = Transaction::pending(tx_id, &request, rail, fee, created_at)?;
        tx.start_processing()?;
        session.start_processing(tx_id)?;

        info!(
            order,
            tx = %tx_id,
            method = %request.method_id,
            rail = %rail,
            principal = %request.amount,
            fee = %fee,
            attempt = session.attempt(),
            "submitting payment"
        );

        let rail_request = RailRequest {
            rail,
            principal: request.amount,
            fee,
            credential: request.credential,
            idempotency_key: request.idempotency_key,
            merchant_reference: format!("ORDER-{}", order),
        };
        let outcome = self.rails.for_rail(rail).submit(&rail_request).await;
        tx.settle(&outcome, self.now())?;

        if !outcome.is_success() {
            let failure = match &outcome {
                Outcome::TimedOut => PaymentError::Timeout {
                    millis: self.config.adapter_timeout.as_millis() as u64,
                },
                other => PaymentError::adapter_failure(other.error_reason().unwrap_or("declined")),
            };
            warn!(order, tx = %tx_id, rail = %rail, error = %failure, "payment failed");
            session.complete(tx)?;
            return Err(failure);
        }

        let who = Attribution::new(
            actor,
            Some(format!("{} via {}", tx.receipt_number(), rail)),
            tx.resolved_at().unwrap_or(created_at),
        );
        let applied = self
            .ledger
            .reapply(order, self.config.ledger_retry_limit, |store, version| {
                store.apply_payment(&tx, version, who.clone())
            });
        session.complete(tx.clone())?;
        let ledger = match applied {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(order, tx = %tx_id, error = %e, "payment succeeded but ledger update failed");
                self.unapplied.insert(
                    tx_id,
                    UnappliedPayment {
                        transaction: tx,
                        attribution: who,
                        reason: e.to_string(),
                    },
                );
                return Err(PaymentError::unapplied_payment(order, tx_id, e));
            }
        };

        info!(
            order,
            tx = %tx_id,
            debited = %tx.debited(),
            balance_due = %ledger.balance_due,
            status = %ledger.payment_status,
            "payment succeeded"
        );

        let receipt = Receipt::new(&tx, &ledger);
        let dispatcher = Arc::clone(&self.receipts);
        let deliveries =
            tokio::spawn(async move { dispatcher.dispatch(&receipt, &receipts).await });

        Ok(CheckoutOutcome {
            transaction: tx,
            ledger,
            deliveries,
        })
    }

    /// Settled payments still waiting for their ledger credit
    ///
    /// # Returns
    ///
    /// The queue sorted by order id, then by creation time
    pub fn unapplied(&self) -> Vec<UnappliedPayment> {
        let mut pending: Vec<UnappliedPayment> = self
            .unapplied
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|p| (p.transaction.order_id(), p.transaction.created_at()));
        pending
    }

    /// Retry the ledger credit of every unapplied payment
    ///
    /// Crediting is idempotent on the transaction id, so a payment that did
    /// land in the meantime is simply dropped from the queue. Payments that
    /// fail again stay queued with the new reason.
    ///
    /// # Returns
    ///
    /// The ledger view after each payment that was applied
    pub fn reconcile_unapplied(&self) -> Vec<LedgerView> {
        let mut applied = Vec::new();
        for pending in self.unapplied() {
            let tx = &pending.transaction;
            let order = tx.order_id();
            let result = self
                .ledger
                .reapply(order, self.config.ledger_retry_limit, |store, version| {
                    store.apply_payment(tx, version, pending.attribution.clone())
                });
            match result {
                Ok(view) => {
                    self.unapplied.remove(&tx.id());
                    info!(order, tx = %tx.id(), balance_due = %view.balance_due, "unapplied payment reconciled");
                    applied.push(view);
                }
                Err(e) => {
                    warn!(order, tx = %tx.id(), error = %e, "payment still not on the ledger");
                    if let Some(mut entry) = self.unapplied.get_mut(&tx.id()) {
                        entry.reason = e.to_string();
                    }
                }
            }
        }
        applied
    }
}
