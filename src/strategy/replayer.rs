//! Applies replay commands to a checkout engine
//!
//! The `Replayer` is shared by both strategies. It owns the engine, the manual
//! payment book and the mapping from a replay file's payment references to
//! recorded payment ids.

use crate::config::EngineConfig;
use crate::core::confirmations::PaymentConfirmations;
use crate::core::engine::CheckoutEngine;
use crate::core::ledger_store::LedgerView;
use crate::core::reconciliation::{LedgerSummary, ReconciliationView};
use crate::core::traits::OrderHistory;
use crate::io::csv_format::{write_orders_csv, write_summary_csv, ReplayCommand};
use crate::strategy::OutputKind;
use crate::types::{Attribution, Credit, OrderId, PaymentError, TransactionId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Replayer {
    engine: Arc<CheckoutEngine>,
    confirmations: PaymentConfirmations,
    references: DashMap<(OrderId, String), TransactionId>,
}

impl Replayer {
    /// Replayer over a sandbox engine (approving gateways, logging channels)
    pub fn sandbox(config: Arc<EngineConfig>) -> Result<Self, PaymentError> {
        Ok(Self::new(Arc::new(CheckoutEngine::sandbox(config)?)))
    }

    pub fn new(engine: Arc<CheckoutEngine>) -> Self {
        let confirmations = PaymentConfirmations::new(
            Arc::clone(engine.ledger()),
            engine.config().ledger_retry_limit,
        );
        Self {
            engine,
            confirmations,
            references: DashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<CheckoutEngine> {
        &self.engine
    }

    /// Apply one command and return the order's resulting ledger view
    ///
    /// # Arguments
    ///
    /// * `line` - Line of the row in the replay file; each `pay` row is its
    ///   own request, so identical rows are all charged
    /// * `command` - The parsed row
    ///
    /// # Errors
    ///
    /// Whatever the engine, ledger or confirmation book reports for the row.
    pub async fn apply(&self, line: u64, command: ReplayCommand) -> Result<LedgerView, PaymentError> {
        let ledger = self.engine.ledger();
        let retry_limit = self.engine.config().ledger_retry_limit;
        let now = self.engine.now();

        match command {
            ReplayCommand::Open {
                order,
                total,
                actor,
            } => ledger.open_order(order, total, Attribution::new(actor, None, now)),

            ReplayCommand::Pay {
                order,
                amount,
                method,
                credential,
                receipts,
                actor,
            } => {
                let mut session = self
                    .engine
                    .begin(order, amount)?
                    .with_reference(format!("row-{}", line));
                session.select_method(&method)?;
                let outcome = self
                    .engine
                    .submit(&mut session, credential, receipts, &actor)
                    .await?;

                match outcome.deliveries.await {
                    Ok(report) => {
                        for failed in report.failures() {
                            if let Err(e) = &failed.result {
                                warn!(order, channel = %failed.channel, destination = %failed.destination, error = %e, "receipt not delivered");
                            }
                        }
                    }
                    Err(e) => warn!(order, error = %e, "receipt dispatch task failed"),
                }
                Ok(outcome.ledger)
            }

            ReplayCommand::Adjust {
                order,
                delta,
                actor,
                note,
            } => {
                let who = Attribution::new(actor, note, now);
                ledger.reapply(order, retry_limit, |store, version| {
                    store.apply_adjustment(order, delta, version, who.clone())
                })
            }

            ReplayCommand::Approve {
                order,
                initial_payment,
                next_payment_date,
                actor,
                note,
            } => {
                let credit = initial_payment.map(|amount| Credit {
                    id: Uuid::new_v4(),
                    amount,
                    at: now,
                });
                let who = Attribution::new(actor, note, now);
                ledger.reapply(order, retry_limit, |store, version| {
                    store.approve(
                        order,
                        credit.as_ref(),
                        next_payment_date,
                        version,
                        who.clone(),
                    )
                })
            }

            ReplayCommand::Record {
                order,
                amount,
                method,
                reference,
                actor,
                note,
            } => {
                let payment = self.confirmations.record(
                    order,
                    amount,
                    &method,
                    Attribution::new(actor, note, now),
                )?;
                self.references.insert((order, reference), payment.id);
                ledger.view(order)
            }

            ReplayCommand::Confirm {
                order,
                reference,
                actor,
            } => {
                let id = self
                    .references
                    .get(&(order, reference.clone()))
                    .map(|entry| *entry.value())
                    .ok_or(PaymentError::UnknownReference { order, reference })?;
                self.confirmations
                    .confirm(id, Attribution::new(actor, None, now))
            }
        }
    }

    /// Apply a command, logging and swallowing row-level failures
    pub async fn apply_logged(&self, line: u64, command: ReplayCommand) {
        let order = command.order();
        match self.apply(line, command).await {
            Ok(view) => debug!(line, order, status = %view.payment_status, "row applied"),
            Err(e) => warn!(line, order, error = %e, "row skipped"),
        }
    }

    /// Reconciliation summaries of every open order
    pub async fn summaries(&self) -> Result<Vec<LedgerSummary>, PaymentError> {
        let history: Arc<dyn OrderHistory> = Arc::clone(self.engine.ledger()) as Arc<dyn OrderHistory>;
        let view = ReconciliationView::new(history);

        let mut summaries = Vec::new();
        for order in self.engine.ledger().order_ids() {
            summaries.push(view.summary(order).await?);
        }
        Ok(summaries)
    }

    /// Write the final state in the requested shape
    ///
    /// Payments still waiting for their ledger credit get one more
    /// reconciliation pass first.
    pub async fn write(&self, kind: OutputKind, output: &mut dyn Write) -> Result<(), PaymentError> {
        self.engine.reconcile_unapplied();
        for pending in self.engine.unapplied() {
            warn!(
                order = pending.transaction.order_id(),
                tx = %pending.transaction.id(),
                reason = %pending.reason,
                "settled payment missing from ledger output"
            );
        }
        let written = match kind {
            OutputKind::Orders => write_orders_csv(&self.engine.ledger().views(), output),
            OutputKind::Summary => write_summary_csv(&self.summaries().await?, output),
        };
        written.map_err(|message| PaymentError::IoError { message })
    }
}

/// Group commands by order, keeping file order within each group
///
/// # Arguments
///
/// * `commands` - Rows tagged with their line number
///
/// # Returns
///
/// A map from order id to that order's rows in their original order
pub fn partition_by_order(
    commands: Vec<(u64, ReplayCommand)>,
) -> HashMap<OrderId, Vec<(u64, ReplayCommand)>> {
    let mut partitions: HashMap<OrderId, Vec<(u64, ReplayCommand)>> = HashMap::new();
    for (line, command) in commands {
        partitions
            .entry(command.order())
            .or_default()
            .push((line, command));
    }
    partitions
}
