//! Timeout and idempotency guard around a rail adapter
//!
//! Every adapter registered with the engine is wrapped in a [`GuardedAdapter`]:
//! submissions are bounded by the configured timeout, and each idempotency key
//! is submitted to the inner adapter at most once. Later submissions with the
//! same key (including concurrent ones) receive the original outcome until
//! the key's retention period has passed.

use crate::core::expiring::ExpiringMap;
use crate::core::traits::RailAdapter;
use crate::types::{IdempotencyKey, Outcome, RailKind, RailRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::warn;

pub struct GuardedAdapter {
    inner: Arc<dyn RailAdapter>,
    timeout: Duration,
    outcomes: ExpiringMap<IdempotencyKey, Arc<OnceCell<Outcome>>>,
}

impl GuardedAdapter {
    /// Wrap `inner` with a timeout and an outcome cache
    ///
    /// # Arguments
    ///
    /// * `inner` - Adapter that talks to the rail
    /// * `timeout` - Upper bound on one submission
    /// * `retention` - How long an outcome is replayed for its key; must be
    ///   at least `timeout` so in-flight submissions are never swept
    pub fn new(inner: Arc<dyn RailAdapter>, timeout: Duration, retention: Duration) -> Self {
        Self {
            inner,
            timeout,
            outcomes: ExpiringMap::new(retention.max(timeout)),
        }
    }

    /// Outcome already recorded for `key`, if any
    pub fn recorded(&self, key: &IdempotencyKey) -> Option<Outcome> {
        self.outcomes.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys whose outcome is still retained
    pub fn retained(&self) -> usize {
        self.outcomes.len()
    }
}

#[async_trait]
impl RailAdapter for GuardedAdapter {
    fn kind(&self) -> RailKind {
        self.inner.kind()
    }

    async fn submit(&self, request: &RailRequest) -> Outcome {
        // map guard is released before awaiting so other keys are not blocked
        let cell = self
            .outcomes
            .get_or_insert_with(request.idempotency_key.clone(), || Arc::new(OnceCell::new()));

        cell.get_or_init(|| async {
            match tokio::time::timeout(self.timeout, self.inner.submit(request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        rail = %request.rail,
                        reference = %request.merchant_reference,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "rail did not answer in time"
                    );
                    Outcome::TimedOut
                }
            }
        })
        .await
        .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rails::CashAdapter;
    use crate::core::rails::MobileMoneyAdapter;
    use crate::core::sandbox::{GatewayBehavior, ScriptedGateway};
    use crate::config::EngineConfig;
    use crate::types::{Amount, Credential, Operator, Rail};
    use chrono::Utc;

    fn request(key: &str) -> RailRequest {
        RailRequest {
            rail: Rail::MobileMoney(Operator::Mtn),
            principal: Amount::new(50_000),
            fee: Amount::new(1_000),
            credential: Credential::MobileMoney {
                phone: "0772123456".to_string(),
                pin: "1234".to_string(),
            },
            idempotency_key: IdempotencyKey::derive(
                1,
                key,
                Amount::new(50_000),
                Utc::now(),
                Duration::from_secs(60),
                1,
            ),
            merchant_reference: "ORDER-1".to_string(),
        }
    }

    fn momo(gateway: Arc<ScriptedGateway>) -> Arc<dyn RailAdapter> {
        Arc::new(MobileMoneyAdapter::new(gateway, &EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_repeated_key_is_a_no_op() {
        let gateway = Arc::new(ScriptedGateway::approving("mtn"));
        let guarded = GuardedAdapter::new(momo(gateway.clone()), Duration::from_secs(1), Duration::from_secs(60));
        let req = request("mtn_momo");

        let first = guarded.submit(&req).await;
        let second = guarded.submit(&req).await;

        assert!(first.is_success());
        assert_eq!(first, second);
        assert_eq!(gateway.charges(), 1);
        assert_eq!(guarded.recorded(&req.idempotency_key), Some(first));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_charge_once() {
        let gateway = Arc::new(ScriptedGateway::new(
            "mtn",
            GatewayBehavior::Delay(Duration::from_millis(20)),
        ));
        let guarded = Arc::new(GuardedAdapter::new(momo(gateway.clone()), Duration::from_secs(1), Duration::from_secs(60)));
        let req = request("mtn_momo");

        let (a, b) = tokio::join!(guarded.submit(&req), guarded.submit(&req));
        assert_eq!(a, b);
        assert_eq!(gateway.charges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_becomes_timeout_and_is_cached() {
        let gateway = Arc::new(ScriptedGateway::new("mtn", GatewayBehavior::Hang));
        let guarded = GuardedAdapter::new(momo(gateway.clone()), Duration::from_secs(30), Duration::from_secs(60));
        let req = request("mtn_momo");

        assert_eq!(guarded.submit(&req).await, Outcome::TimedOut);
        assert_eq!(guarded.submit(&req).await, Outcome::TimedOut);
        assert_eq!(gateway.charges(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_submit_separately() {
        let guarded = GuardedAdapter::new(Arc::new(CashAdapter), Duration::from_secs(1), Duration::from_secs(60));
        let mut first = request("cash");
        first.rail = Rail::Cash;
        first.credential = Credential::Cash;
        let mut second = first.clone();
        second.idempotency_key =
            IdempotencyKey::derive(1, "cash", Amount::new(1_000), Utc::now(), Duration::from_secs(60), 2);

        let a = guarded.submit(&first).await;
        let b = guarded.submit(&second).await;
        assert_ne!(a.external_ref(), b.external_ref());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_are_dropped_after_retention() {
        let gateway = Arc::new(ScriptedGateway::approving("mtn"));
        let guarded = GuardedAdapter::new(
            momo(gateway.clone()),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        let first = request("mtn_momo");
        guarded.submit(&first).await;
        assert!(guarded.recorded(&first.idempotency_key).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        let mut later = first.clone();
        later.idempotency_key =
            IdempotencyKey::derive(1, "mtn_momo", Amount::new(50_000), Utc::now(), Duration::from_secs(60), 2);
        guarded.submit(&later).await;

        assert!(guarded.recorded(&first.idempotency_key).is_none());
        assert_eq!(guarded.retained(), 1);
        assert_eq!(gateway.charges(), 2);
    }
}
