//! Thread-safe order ledger store
//!
//! This module provides the `LedgerStore` struct, which owns every order's
//! ledger together with its append-only event history.
//!
//! # Design
//!
//! Orders live in a `DashMap`, so writers to different orders never contend,
//! while writers to the same order are serialized by the entry lock. On top of
//! that single-writer discipline every command carries the ledger version the
//! caller read; if another writer got in first the command fails with
//! `LedgerConflict` and the caller reloads and reapplies (see
//! [`LedgerStore::reapply`]).
//!
//! A command decides its event against the current ledger, folds it in, and
//! appends it to the history under the same lock. Either both happen or
//! neither does.

use crate::core::traits::OrderHistory;
use crate::types::{
    Amount, Attribution, Credit, LedgerEvent, OrderId, OrderLedger, PaymentError, PaymentStatus,
    Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

/// Read-only order fields exposed to the UI
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerView {
    pub order_id: OrderId,
    pub total_amount: Amount,
    pub amount_paid: Amount,
    pub balance_due: Amount,
    pub payment_status: PaymentStatus,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_payment_date: Option<DateTime<Utc>>,
    pub version: u64,
}

impl From<&OrderLedger> for LedgerView {
    fn from(ledger: &OrderLedger) -> Self {
        Self {
            order_id: ledger.order_id(),
            total_amount: ledger.total_amount(),
            amount_paid: ledger.amount_paid(),
            balance_due: ledger.balance_due(),
            payment_status: ledger.payment_status(),
            last_payment_date: ledger.last_payment_date(),
            next_payment_date: ledger.next_payment_date(),
            version: ledger.version(),
        }
    }
}

#[derive(Debug)]
struct OrderRecord {
    ledger: OrderLedger,
    events: Vec<LedgerEvent>,
}

/// Every order's ledger and event history, keyed by order id
#[derive(Debug, Default)]
pub struct LedgerStore {
    orders: DashMap<OrderId, OrderRecord>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an order with its initial total (`opened` event)
    ///
    /// The event is decided against a fresh ledger before anything is
    /// stored, so a rejected open leaves no trace of the order.
    ///
    /// # Arguments
    ///
    /// * `order` - Id of the new order
    /// * `total_amount` - Amount owed, in minor units
    /// * `who` - Actor and time recorded on the `opened` event
    ///
    /// # Returns
    ///
    /// The view of the freshly opened order
    ///
    /// # Errors
    ///
    /// - `OrderAlreadyExists` if the order was opened before
    /// - `InvalidAmount` if `total_amount` is not positive
    pub fn open_order(
        &self,
        order: OrderId,
        total_amount: Amount,
        who: Attribution,
    ) -> Result<LedgerView, PaymentError> {
        let Entry::Vacant(slot) = self.orders.entry(order) else {
            return Err(PaymentError::order_already_exists(order));
        };

        let mut ledger = OrderLedger::empty(order);
        let event = ledger.open_event(total_amount, who)?;
        ledger.apply(&event)?;
        let view = LedgerView::from(&ledger);
        slot.insert(OrderRecord {
            ledger,
            events: vec![event],
        });

        info!(order, total = %total_amount, "order opened");
        Ok(view)
    }

    /// Current read-only view of an order
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if the order was never opened
    pub fn view(&self, order: OrderId) -> Result<LedgerView, PaymentError> {
        self.orders
            .get(&order)
            .filter(|record| record.ledger.is_open())
            .map(|record| LedgerView::from(&record.ledger))
            .ok_or_else(|| PaymentError::order_not_found(order))
    }

    /// Views of every open order, sorted by order id
    pub fn views(&self) -> Vec<LedgerView> {
        let mut views: Vec<LedgerView> = self
            .orders
            .iter()
            .filter(|record| record.ledger.is_open())
            .map(|record| LedgerView::from(&record.ledger))
            .collect();
        views.sort_by_key(|view| view.order_id);
        views
    }

    /// Copy of an order's event history
    pub fn history(&self, order: OrderId) -> Result<Vec<LedgerEvent>, PaymentError> {
        self.orders
            .get(&order)
            .filter(|record| record.ledger.is_open())
            .map(|record| record.events.clone())
            .ok_or_else(|| PaymentError::order_not_found(order))
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|record| record.ledger.is_open())
            .map(|record| *record.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Credit a succeeded transaction's principal (`payment_updated` event)
    ///
    /// Idempotent on the transaction id: applying the same transaction again
    /// appends nothing and returns the current view.
    ///
    /// # Arguments
    ///
    /// * `tx` - Settled transaction; only its principal is credited
    /// * `expected_version` - Ledger version the caller read
    /// * `who` - Actor and note recorded on the event
    ///
    /// # Errors
    ///
    /// - `TransactionNotSettled` if `tx` has not succeeded
    /// - `LedgerConflict` if the ledger moved past `expected_version`
    /// - `ArithmeticOverflow` if the paid amount would overflow
    pub fn apply_payment(
        &self,
        tx: &Transaction,
        expected_version: u64,
        who: Attribution,
    ) -> Result<LedgerView, PaymentError> {
        let credit = Credit::from_transaction(tx)?;
        self.apply_credit(tx.order_id(), &credit, expected_version, who)
    }

    /// Credit a confirmed amount that did not go through a rail
    pub fn apply_credit(
        &self,
        order: OrderId,
        credit: &Credit,
        expected_version: u64,
        who: Attribution,
    ) -> Result<LedgerView, PaymentError> {
        self.commit(order, expected_version, |ledger| {
            if ledger.has_applied(&credit.id) {
                debug!(order, credit = %credit.id, "credit already applied");
                return Ok(None);
            }
            ledger.payment_event(credit, who)
        })
    }

    /// Discount (negative `delta`) or surcharge (`balance_adjusted` event)
    ///
    /// # Errors
    ///
    /// `InvalidAdjustment` if `delta` is zero or the total would go below
    /// zero, plus the version and lookup errors every command can return
    pub fn apply_adjustment(
        &self,
        order: OrderId,
        delta: Amount,
        expected_version: u64,
        who: Attribution,
    ) -> Result<LedgerView, PaymentError> {
        self.commit(order, expected_version, |ledger| {
            ledger.adjustment_event(delta, who).map(Some)
        })
    }

    /// Manager approval with optional initial payment (`approved` event)
    pub fn approve(
        &self,
        order: OrderId,
        initial_payment: Option<&Credit>,
        next_payment_date: Option<DateTime<Utc>>,
        expected_version: u64,
        who: Attribution,
    ) -> Result<LedgerView, PaymentError> {
        self.commit(order, expected_version, |ledger| {
            ledger
                .approval_event(initial_payment, next_payment_date, who)
                .map(Some)
        })
    }

    /// Run `command` against the current version, reloading and retrying on
    /// `LedgerConflict` up to `retry_limit` times
    ///
    /// # Arguments
    ///
    /// * `order` - Order whose version is read before each attempt
    /// * `retry_limit` - Retries after the first attempt
    /// * `command` - Called with the store and the freshly read version
    ///
    /// # Returns
    ///
    /// The first result that is not a conflict, or the last conflict once the
    /// retries are used up
    pub fn reapply<F>(
        &self,
        order: OrderId,
        retry_limit: u32,
        mut command: F,
    ) -> Result<LedgerView, PaymentError>
    where
        F: FnMut(&Self, u64) -> Result<LedgerView, PaymentError>,
    {
        let mut retries = 0;
        loop {
            let version = self.view(order)?.version;
            match command(self, version) {
                Err(PaymentError::LedgerConflict { actual, .. }) if retries < retry_limit => {
                    retries += 1;
                    debug!(order, version, actual, retries, "ledger conflict, reapplying");
                }
                result => return result,
            }
        }
    }

    fn commit<F>(
        &self,
        order: OrderId,
        expected_version: u64,
        decide: F,
    ) -> Result<LedgerView, PaymentError>
    where
        F: FnOnce(&OrderLedger) -> Result<Option<LedgerEvent>, PaymentError>,
    {
        let mut record = self
            .orders
            .get_mut(&order)
            .filter(|record| record.ledger.is_open())
            .ok_or_else(|| PaymentError::order_not_found(order))?;

        // no-op commands never conflict
        let Some(event) = decide(&record.ledger)? else {
            return Ok(LedgerView::from(&record.ledger));
        };
        if record.ledger.version() != expected_version {
            return Err(PaymentError::ledger_conflict(
                order,
                expected_version,
                record.ledger.version(),
            ));
        }

        record.ledger.apply(&event)?;
        info!(
            order,
            action = event.action.as_str(),
            sequence = event.sequence,
            paid = %event.after.amount_paid,
            total = %event.after.total_amount,
            status = %event.after.payment_status,
            actor = %event.actor,
            "ledger updated"
        );
        record.events.push(event);
        Ok(LedgerView::from(&record.ledger))
    }
}

#[async_trait]
impl OrderHistory for LedgerStore {
    async fn get_order_history(&self, order: OrderId) -> Result<Vec<LedgerEvent>, PaymentError> {
        self.history(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedgerAction;
    use std::sync::Arc;
    use uuid::Uuid;

    fn who() -> Attribution {
        Attribution::new("admin", None, Utc::now())
    }

    fn credit(amount: i64) -> Credit {
        Credit {
            id: Uuid::new_v4(),
            amount: Amount::new(amount),
            at: Utc::now(),
        }
    }

    fn store_with_order(total: i64) -> LedgerStore {
        let store = LedgerStore::new();
        store.open_order(1, Amount::new(total), who()).unwrap();
        store
    }

    #[test]
    fn test_open_twice_fails() {
        let store = store_with_order(50_000);
        assert!(matches!(
            store.open_order(1, Amount::new(1), who()),
            Err(PaymentError::OrderAlreadyExists { order: 1 })
        ));
        assert_eq!(store.history(1).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_open_leaves_no_order() {
        let store = LedgerStore::new();
        assert!(store.open_order(2, Amount::ZERO, who()).is_err());
        assert!(matches!(store.view(2), Err(PaymentError::OrderNotFound { .. })));
        assert!(store.views().is_empty());
        assert!(store.orders.is_empty());

        let view = store.open_order(2, Amount::new(500), who()).unwrap();
        assert_eq!(view.version, 1);
    }

    #[test]
    fn test_each_command_appends_one_event() {
        let store = store_with_order(50_000);
        let v = store.view(1).unwrap().version;
        let view = store.apply_credit(1, &credit(20_000), v, who()).unwrap();
        let view = store
            .apply_adjustment(1, Amount::new(-5_000), view.version, who())
            .unwrap();

        let history = store.history(1).unwrap();
        let actions: Vec<LedgerAction> = history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                LedgerAction::Opened,
                LedgerAction::PaymentUpdated,
                LedgerAction::BalanceAdjusted
            ]
        );
        assert_eq!(view.total_amount, Amount::new(45_000));
        assert_eq!(view.balance_due, Amount::new(25_000));
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = store_with_order(50_000);
        let stale = store.view(1).unwrap().version;
        store.apply_credit(1, &credit(10_000), stale, who()).unwrap();

        assert!(matches!(
            store.apply_credit(1, &credit(10_000), stale, who()),
            Err(PaymentError::LedgerConflict { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn test_reapplied_credit_is_a_no_op_even_when_stale() {
        let store = store_with_order(50_000);
        let c = credit(10_000);
        store.apply_credit(1, &c, 1, who()).unwrap();
        let view = store.apply_credit(1, &c, 1, who()).unwrap();

        assert_eq!(view.amount_paid, Amount::new(10_000));
        assert_eq!(store.history(1).unwrap().len(), 2);
    }

    #[test]
    fn test_reapply_reloads_after_conflict() {
        let store = store_with_order(50_000);
        let mut calls = 0;
        let view = store
            .reapply(1, 3, |store, version| {
                calls += 1;
                if calls == 1 {
                    // a competing writer lands first
                    store.apply_credit(1, &credit(5_000), version, who())?;
                }
                store.apply_credit(1, &credit(10_000), version, who())
            })
            .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(view.amount_paid, Amount::new(15_000));
    }

    #[test]
    fn test_reapply_gives_up_after_retry_limit() {
        let store = store_with_order(50_000);
        let mut calls = 0;
        let result = store.reapply(1, 2, |store, version| {
            calls += 1;
            // every attempt loses the race
            store.apply_credit(1, &credit(1_000), version, who())?;
            store.apply_credit(1, &credit(10_000), version, who())
        });

        assert!(matches!(result, Err(PaymentError::LedgerConflict { .. })));
        assert_eq!(calls, 3);
        assert_eq!(store.view(1).unwrap().amount_paid, Amount::new(3_000));
    }

    #[test]
    fn test_history_replays_to_current_state() {
        let store = store_with_order(50_000);
        store.apply_credit(1, &credit(20_000), 1, who()).unwrap();
        store.apply_credit(1, &credit(30_000), 2, who()).unwrap();

        let history = store.history(1).unwrap();
        let replayed = OrderLedger::replay(1, &history).unwrap();
        assert_eq!(LedgerView::from(&replayed), store.view(1).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_lose_credits() {
        let store = Arc::new(store_with_order(1_000_000));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let c = credit(1_000);
                    store.reapply(1, 100, |store, version| {
                        store.apply_credit(1, &c, version, who())
                    })
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let view = store.view(1).unwrap();
        assert_eq!(view.amount_paid, Amount::new(16_000));
        assert_eq!(view.version, 17);
    }
}
