//! Ledger reconciliation view
//!
//! Replays an order's history into summary statistics: number of payments,
//! sum and average paid, percent of the total covered, the most recent payment
//! date, and every payment-status transition.
//!
//! The history source may lag behind the ledger or miss events. A summary is
//! always produced from whatever history is available: balances come from the
//! latest snapshot seen, and every place where the history breaks continuity
//! is listed in [`LedgerSummary::gaps`].

use crate::core::traits::OrderHistory;
use crate::types::{
    Amount, LedgerAction, LedgerEvent, LedgerSnapshot, OrderId, PaymentError, PaymentStatus,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub sequence: u64,
    pub action: LedgerAction,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    pub order_id: OrderId,
    pub transaction_count: usize,
    pub sum_paid: Amount,
    /// `sum_paid / transaction_count`, two decimal places; zero without payments
    pub average_payment: Decimal,
    /// `amount_paid / total_amount * 100`, one decimal place
    pub percent_paid: Decimal,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub total_amount: Amount,
    pub balance_due: Amount,
    pub payment_status: PaymentStatus,
    pub transitions: Vec<StatusTransition>,
    /// Sequences at which the history does not follow on from the event
    /// before it; empty for a complete history
    pub gaps: Vec<u64>,
}

impl LedgerSummary {
    /// Whether the summary was built from an unbroken history
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Fold `events` into a summary
///
/// Never fails: a gapped or stale history still yields the best summary it
/// supports, with the breaks listed in `gaps`.
///
/// # Arguments
///
/// * `order_id` - Order the history belongs to
/// * `events` - History in sequence order, possibly incomplete
///
/// # Returns
///
/// The summary; an empty history summarizes to an unpaid order with no
/// payments
pub fn summarize(order_id: OrderId, events: &[LedgerEvent]) -> LedgerSummary {
    let latest = events
        .iter()
        .max_by_key(|e| e.sequence)
        .map(|e| e.after)
        .unwrap_or(LedgerSnapshot::EMPTY);

    let payments: Vec<&LedgerEvent> = events
        .iter()
        .filter(|e| e.paid_delta().is_positive())
        .collect();
    let sum_paid = Amount::new(
        payments
            .iter()
            .map(|e| e.paid_delta().minor_units())
            .fold(0_i64, i64::saturating_add),
    );
    let last_payment_date = payments.iter().map(|e| e.timestamp).max();

    let transitions = events
        .iter()
        .filter(|e| e.changes_status())
        .map(|e| StatusTransition {
            sequence: e.sequence,
            action: e.action,
            from: e.before.payment_status,
            to: e.after.payment_status,
            at: e.timestamp,
        })
        .collect();

    LedgerSummary {
        order_id,
        transaction_count: payments.len(),
        sum_paid,
        average_payment: average(sum_paid, payments.len()),
        percent_paid: percent(latest.amount_paid, latest.total_amount),
        last_payment_date,
        total_amount: latest.total_amount,
        balance_due: latest.balance_due(),
        payment_status: latest.payment_status,
        transitions,
        gaps: find_gaps(events),
    }
}

/// Sequences of events that do not continue the event before them
fn find_gaps(events: &[LedgerEvent]) -> Vec<u64> {
    let mut gaps = Vec::new();
    let mut previous: Option<&LedgerEvent> = None;
    for event in events {
        let (expected_sequence, expected_before) = match previous {
            Some(p) => (p.sequence + 1, p.after),
            None => (1, LedgerSnapshot::EMPTY),
        };
        if event.sequence != expected_sequence || event.before != expected_before {
            gaps.push(event.sequence);
        }
        previous = Some(event);
    }
    gaps
}

fn average(sum: Amount, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(sum.minor_units())
        .checked_div(Decimal::from(count as u64))
        .map(|avg| avg.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

fn percent(paid: Amount, total: Amount) -> Decimal {
    if !total.is_positive() {
        // an order discounted to nothing is fully covered by any payment
        return if paid.is_positive() {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
    }
    (Decimal::from(paid.minor_units()) * Decimal::ONE_HUNDRED)
        .checked_div(Decimal::from(total.minor_units()))
        .map(|pct| pct.round_dp(1))
        .unwrap_or(Decimal::ZERO)
}

/// Summaries over any history source
pub struct ReconciliationView {
    history: Arc<dyn OrderHistory>,
}

impl ReconciliationView {
    pub fn new(history: Arc<dyn OrderHistory>) -> Self {
        Self { history }
    }

    /// Summary of one order from the history source
    ///
    /// # Arguments
    ///
    /// * `order` - Order to summarize
    ///
    /// # Errors
    ///
    /// Only what the history source reports, such as `OrderNotFound`. An
    /// incomplete history is summarized, not rejected.
    pub async fn summary(&self, order: OrderId) -> Result<LedgerSummary, PaymentError> {
        let events = self.history.get_order_history(order).await?;
        let summary = summarize(order, &events);
        if !summary.is_complete() {
            warn!(order, gaps = ?summary.gaps, "summary built from incomplete history");
        }
        Ok(summary)
    }
}
