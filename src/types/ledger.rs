//! Order ledger types
//!
//! The [`OrderLedger`] is the authoritative financial state of one order. It is
//! never written directly: every mutation is first decided as a [`LedgerEvent`]
//! and then folded in with [`OrderLedger::apply`]. Replaying the same events
//! in order therefore always reconstructs the same ledger.

use crate::types::{Amount, PaymentError, Transaction, TransactionId, TransactionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Order identifier
pub type OrderId = u32;

/// Payment status derived from `(amount_paid, total_amount)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    /// Pure function of the two totals
    ///
    /// - nothing paid → `Unpaid`
    /// - paid, but below total → `PartiallyPaid`
    /// - paid and at or above total → `Paid`
    pub fn derive(amount_paid: Amount, total_amount: Amount) -> Self {
        if !amount_paid.is_positive() {
            PaymentStatus::Unpaid
        } else if amount_paid < total_amount {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::Paid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the ledger fields an event changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_amount: Amount,
    pub amount_paid: Amount,
    pub payment_status: PaymentStatus,
    pub next_payment_date: Option<DateTime<Utc>>,
}

impl LedgerSnapshot {
    pub const EMPTY: LedgerSnapshot = LedgerSnapshot {
        total_amount: Amount::ZERO,
        amount_paid: Amount::ZERO,
        payment_status: PaymentStatus::Unpaid,
        next_payment_date: None,
    };

    fn new(
        total_amount: Amount,
        amount_paid: Amount,
        next_payment_date: Option<DateTime<Utc>>,
    ) -> Self {
        let payment_status = PaymentStatus::derive(amount_paid, total_amount);
        Self {
            total_amount,
            amount_paid,
            payment_status,
            // nothing left to schedule once the order is settled
            next_payment_date: next_payment_date.filter(|_| payment_status != PaymentStatus::Paid),
        }
    }

    pub fn balance_due(&self) -> Amount {
        self.total_amount.saturating_sub_floor(self.amount_paid)
    }
}

/// Kind of ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// Order created with its initial total
    Opened,
    /// Manager approval, optionally with an initial payment and a payment date
    Approved,
    /// A confirmed payment was credited
    PaymentUpdated,
    /// Discount or surcharge changed the total
    BalanceAdjusted,
}

impl LedgerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerAction::Opened => "opened",
            LedgerAction::Approved => "approved",
            LedgerAction::PaymentUpdated => "payment_updated",
            LedgerAction::BalanceAdjusted => "balance_adjusted",
        }
    }
}

/// Append-only audit record of one ledger mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub order_id: OrderId,
    /// 1-based position in the order's history
    pub sequence: u64,
    pub action: LedgerAction,
    pub before: LedgerSnapshot,
    pub after: LedgerSnapshot,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
    /// Credit that produced this event, when it carries a payment
    pub transaction_id: Option<TransactionId>,
}

impl LedgerEvent {
    /// Amount credited to the order by this event
    pub fn paid_delta(&self) -> Amount {
        self.after
            .amount_paid
            .saturating_sub_floor(self.before.amount_paid)
    }

    pub fn changes_status(&self) -> bool {
        self.before.payment_status != self.after.payment_status
    }
}

/// A confirmed amount to credit against an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credit {
    pub id: TransactionId,
    pub amount: Amount,
    pub at: DateTime<Utc>,
}

impl Credit {
    /// Credit for a succeeded transaction; fees are rail revenue and only the
    /// principal reaches the order
    pub fn from_transaction(tx: &Transaction) -> Result<Self, PaymentError> {
        if tx.status() != TransactionStatus::Succeeded {
            return Err(PaymentError::transaction_not_settled(tx.id()));
        }
        Ok(Self {
            id: tx.id(),
            amount: tx.principal(),
            at: tx.resolved_at().unwrap_or_else(|| tx.created_at()),
        })
    }
}

/// Who and why, attached to every event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub actor: String,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl Attribution {
    pub fn new(actor: impl Into<String>, note: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            note,
            at,
        }
    }
}

/// Per-order aggregate: totals, derived status, and the credits already applied
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLedger {
    order_id: OrderId,
    state: LedgerSnapshot,
    last_payment_date: Option<DateTime<Utc>>,
    approved: bool,
    /// Number of events folded in; doubles as the optimistic-concurrency version
    version: u64,
    applied: HashSet<TransactionId>,
}

impl OrderLedger {
    /// Ledger of an order that has no history yet
    pub fn empty(order_id: OrderId) -> Self {
        Self {
            order_id,
            state: LedgerSnapshot::EMPTY,
            last_payment_date: None,
            approved: false,
            version: 0,
            applied: HashSet::new(),
        }
    }

    /// Reconstruct a ledger by folding its history in order
    pub fn replay<'a>(
        order_id: OrderId,
        events: impl IntoIterator<Item = &'a LedgerEvent>,
    ) -> Result<Self, PaymentError> {
        let mut ledger = Self::empty(order_id);
        for event in events {
            ledger.apply(event)?;
        }
        Ok(ledger)
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn total_amount(&self) -> Amount {
        self.state.total_amount
    }

    pub fn amount_paid(&self) -> Amount {
        self.state.amount_paid
    }

    pub fn balance_due(&self) -> Amount {
        self.state.balance_due()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.state.payment_status
    }

    pub fn last_payment_date(&self) -> Option<DateTime<Utc>> {
        self.last_payment_date
    }

    pub fn next_payment_date(&self) -> Option<DateTime<Utc>> {
        self.state.next_payment_date
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state
    }

    pub fn has_applied(&self, id: &TransactionId) -> bool {
        self.applied.contains(id)
    }

    pub fn is_open(&self) -> bool {
        self.version > 0
    }

    /// Decide the `opened` event
    pub fn open_event(
        &self,
        total_amount: Amount,
        who: Attribution,
    ) -> Result<LedgerEvent, PaymentError> {
        if self.is_open() {
            return Err(PaymentError::order_already_exists(self.order_id));
        }
        if !total_amount.is_positive() {
            return Err(PaymentError::invalid_amount(total_amount.to_string()));
        }
        Ok(self.event(
            LedgerAction::Opened,
            LedgerSnapshot::new(total_amount, Amount::ZERO, None),
            who,
            None,
        ))
    }

    /// Decide the `payment_updated` event for a credit
    ///
    /// Returns `Ok(None)` when the credit was already applied, so replaying the
    /// same succeeded transaction never counts it twice.
    pub fn payment_event(
        &self,
        credit: &Credit,
        who: Attribution,
    ) -> Result<Option<LedgerEvent>, PaymentError> {
        self.ensure_open()?;
        if self.applied.contains(&credit.id) {
            return Ok(None);
        }
        if !credit.amount.is_positive() {
            return Err(PaymentError::invalid_amount(credit.amount.to_string()));
        }

        let amount_paid = self.credit_paid(credit.amount)?;
        Ok(Some(self.event(
            LedgerAction::PaymentUpdated,
            LedgerSnapshot::new(
                self.state.total_amount,
                amount_paid,
                self.state.next_payment_date,
            ),
            who,
            Some(credit.id),
        )))
    }

    /// Decide the `balance_adjusted` event for a discount (negative) or
    /// surcharge (positive)
    pub fn adjustment_event(
        &self,
        delta: Amount,
        who: Attribution,
    ) -> Result<LedgerEvent, PaymentError> {
        self.ensure_open()?;
        if delta == Amount::ZERO {
            return Err(PaymentError::invalid_adjustment(
                self.order_id,
                "adjustment delta must be non-zero",
            ));
        }
        let total_amount = self
            .state
            .total_amount
            .checked_add(delta)
            .ok_or_else(|| PaymentError::arithmetic_overflow("adjustment", self.order_id))?;
        if total_amount < Amount::ZERO {
            return Err(PaymentError::invalid_adjustment(
                self.order_id,
                "discount exceeds the order total",
            ));
        }

        Ok(self.event(
            LedgerAction::BalanceAdjusted,
            LedgerSnapshot::new(
                total_amount,
                self.state.amount_paid,
                self.state.next_payment_date,
            ),
            who,
            None,
        ))
    }

    /// Decide the `approved` event
    pub fn approval_event(
        &self,
        initial_payment: Option<&Credit>,
        next_payment_date: Option<DateTime<Utc>>,
        who: Attribution,
    ) -> Result<LedgerEvent, PaymentError> {
        self.ensure_open()?;
        if self.approved {
            return Err(PaymentError::invalid_transition("approved", "approved"));
        }

        let (amount_paid, credit_id) = match initial_payment {
            Some(credit) if self.applied.contains(&credit.id) => {
                return Err(PaymentError::duplicate_credit(credit.id));
            }
            Some(credit) => {
                if !credit.amount.is_positive() {
                    return Err(PaymentError::invalid_amount(credit.amount.to_string()));
                }
                (self.credit_paid(credit.amount)?, Some(credit.id))
            }
            None => (self.state.amount_paid, None),
        };

        Ok(self.event(
            LedgerAction::Approved,
            LedgerSnapshot::new(
                self.state.total_amount,
                amount_paid,
                next_payment_date.or(self.state.next_payment_date),
            ),
            who,
            credit_id,
        ))
    }

    /// Fold one event into the ledger
    ///
    /// The event must be the next in sequence and its `before` snapshot must
    /// match the current state; anything else is a gap in the history.
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<(), PaymentError> {
        if event.order_id != self.order_id
            || event.sequence != self.version + 1
            || event.before != self.state
        {
            return Err(PaymentError::history_gap(self.order_id, event.sequence));
        }

        if event.after.amount_paid > event.before.amount_paid {
            self.last_payment_date = Some(event.timestamp);
        }
        if let Some(id) = event.transaction_id {
            self.applied.insert(id);
        }
        if event.action == LedgerAction::Approved {
            self.approved = true;
        }
        self.state = event.after;
        self.version = event.sequence;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), PaymentError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PaymentError::order_not_found(self.order_id))
        }
    }

    fn credit_paid(&self, amount: Amount) -> Result<Amount, PaymentError> {
        self.state
            .amount_paid
            .checked_add(amount)
            .ok_or_else(|| PaymentError::arithmetic_overflow("payment", self.order_id))
    }

    fn event(
        &self,
        action: LedgerAction,
        after: LedgerSnapshot,
        who: Attribution,
        transaction_id: Option<TransactionId>,
    ) -> LedgerEvent {
        LedgerEvent {
            order_id: self.order_id,
            sequence: self.version + 1,
            action,
            before: self.state,
            after,
            actor: who.actor,
            timestamp: who.at,
            note: who.note,
            transaction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use uuid::Uuid;

    fn who(secs: i64) -> Attribution {
        Attribution::new("tester", None, Utc.timestamp_opt(secs, 0).single().unwrap())
    }

    fn credit(amount: i64) -> Credit {
        Credit {
            id: Uuid::new_v4(),
            amount: Amount::new(amount),
            at: Utc.timestamp_opt(0, 0).single().unwrap(),
        }
    }

    fn opened(total: i64) -> OrderLedger {
        let mut ledger = OrderLedger::empty(1);
        let event = ledger.open_event(Amount::new(total), who(0)).unwrap();
        ledger.apply(&event).unwrap();
        ledger
    }

    #[rstest]
    #[case::nothing_paid(0, 50_000, PaymentStatus::Unpaid)]
    #[case::partial(20_000, 50_000, PaymentStatus::PartiallyPaid)]
    #[case::exact(50_000, 50_000, PaymentStatus::Paid)]
    #[case::over(60_000, 50_000, PaymentStatus::Paid)]
    #[case::discounted_to_zero(10_000, 0, PaymentStatus::Paid)]
    #[case::empty_order(0, 0, PaymentStatus::Unpaid)]
    fn test_status_is_pure_function_of_totals(
        #[case] paid: i64,
        #[case] total: i64,
        #[case] expected: PaymentStatus,
    ) {
        assert_eq!(
            PaymentStatus::derive(Amount::new(paid), Amount::new(total)),
            expected
        );
    }

    #[test]
    fn test_payment_credits_principal_and_derives_status() {
        let mut ledger = opened(50_000);
        let event = ledger
            .payment_event(&credit(20_000), who(10))
            .unwrap()
            .unwrap();
        ledger.apply(&event).unwrap();

        assert_eq!(event.action, LedgerAction::PaymentUpdated);
        assert_eq!(event.paid_delta(), Amount::new(20_000));
        assert_eq!(ledger.amount_paid(), Amount::new(20_000));
        assert_eq!(ledger.balance_due(), Amount::new(30_000));
        assert_eq!(ledger.payment_status(), PaymentStatus::PartiallyPaid);
        assert_eq!(ledger.last_payment_date(), Some(event.timestamp));
        assert_eq!(ledger.version(), 2);
    }

    #[test]
    fn test_payment_is_idempotent_on_credit_id() {
        let mut ledger = opened(50_000);
        let c = credit(50_000);
        let event = ledger.payment_event(&c, who(1)).unwrap().unwrap();
        ledger.apply(&event).unwrap();

        assert!(ledger.payment_event(&c, who(2)).unwrap().is_none());
        assert_eq!(ledger.amount_paid(), Amount::new(50_000));
    }

    #[test]
    fn test_discount_below_paid_keeps_balance_at_zero() {
        let mut ledger = opened(50_000);
        let pay = ledger.payment_event(&credit(40_000), who(1)).unwrap().unwrap();
        ledger.apply(&pay).unwrap();
        let discount = ledger.adjustment_event(Amount::new(-15_000), who(2)).unwrap();
        ledger.apply(&discount).unwrap();

        assert_eq!(ledger.total_amount(), Amount::new(35_000));
        assert_eq!(ledger.balance_due(), Amount::ZERO);
        assert_eq!(ledger.payment_status(), PaymentStatus::Paid);
    }

    #[rstest]
    #[case::zero(0)]
    #[case::beyond_total(-50_001)]
    fn test_invalid_adjustments_rejected(#[case] delta: i64) {
        let ledger = opened(50_000);
        let result = ledger.adjustment_event(Amount::new(delta), who(1));
        assert!(matches!(result, Err(PaymentError::InvalidAdjustment { .. })));
    }

    #[test]
    fn test_approval_sets_next_payment_date_until_paid() {
        let mut ledger = opened(50_000);
        let due = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).single().unwrap();
        let approval = ledger
            .approval_event(Some(&credit(10_000)), Some(due), who(1))
            .unwrap();
        ledger.apply(&approval).unwrap();
        assert_eq!(ledger.next_payment_date(), Some(due));
        assert_eq!(ledger.payment_status(), PaymentStatus::PartiallyPaid);

        assert!(ledger.approval_event(None, None, who(2)).is_err());

        let rest = ledger.payment_event(&credit(40_000), who(3)).unwrap().unwrap();
        ledger.apply(&rest).unwrap();
        assert_eq!(ledger.payment_status(), PaymentStatus::Paid);
        assert_eq!(ledger.next_payment_date(), None);
    }

    #[test]
    fn test_replay_reconstructs_state() {
        let mut ledger = opened(50_000);
        let mut history = vec![];
        let open = OrderLedger::empty(1).open_event(Amount::new(50_000), who(0)).unwrap();
        history.push(open);

        for (i, amount) in [20_000, 30_000].into_iter().enumerate() {
            let event = ledger
                .payment_event(&credit(amount), who(i as i64 + 1))
                .unwrap()
                .unwrap();
            ledger.apply(&event).unwrap();
            history.push(event);
        }

        let replayed = OrderLedger::replay(1, &history).unwrap();
        assert_eq!(replayed.snapshot(), ledger.snapshot());
        assert_eq!(replayed.version(), ledger.version());
        assert_eq!(replayed.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn test_apply_rejects_out_of_order_events() {
        let ledger = opened(50_000);
        let first = ledger.payment_event(&credit(10_000), who(1)).unwrap().unwrap();

        let mut other = opened(50_000);
        let mut later = first.clone();
        later.sequence = 5;
        assert!(matches!(
            other.apply(&later),
            Err(PaymentError::HistoryGap { .. })
        ));
        other.apply(&first).unwrap();
    }

    #[test]
    fn test_commands_require_open_order() {
        let ledger = OrderLedger::empty(9);
        assert!(matches!(
            ledger.payment_event(&credit(1), who(0)),
            Err(PaymentError::OrderNotFound { order: 9 })
        ));
    }
}
