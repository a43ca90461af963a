//! Rail adapters
//!
//! The rail set is closed, so the registry holds exactly one adapter per
//! [`RailKind`] and dispatch is an exhaustive match. Each adapter is wrapped
//! in a [`GuardedAdapter`] that bounds its latency and deduplicates keys.

pub mod card;
pub mod cash;
pub mod guarded;
pub mod mobile_money;

pub use card::{luhn_valid, CardAdapter, CardBrand};
pub use cash::CashAdapter;
pub use guarded::GuardedAdapter;
pub use mobile_money::MobileMoneyAdapter;

use crate::config::EngineConfig;
use crate::core::sandbox::ScriptedGateway;
use crate::core::traits::{RailAdapter, RailGateway};
use crate::types::{PaymentError, Rail, RailKind};
use std::sync::Arc;

pub struct RailAdapters {
    mobile_money: GuardedAdapter,
    card: GuardedAdapter,
    cash: GuardedAdapter,
}

impl RailAdapters {
    /// Register one adapter per rail kind
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if an adapter is registered under the wrong kind.
    pub fn new(
        config: &EngineConfig,
        mobile_money: Arc<dyn RailAdapter>,
        card: Arc<dyn RailAdapter>,
        cash: Arc<dyn RailAdapter>,
    ) -> Result<Self, PaymentError> {
        for (expected, adapter) in [
            (RailKind::MobileMoney, &mobile_money),
            (RailKind::Card, &card),
            (RailKind::Cash, &cash),
        ] {
            if adapter.kind() != expected {
                return Err(PaymentError::invalid_config(format!(
                    "{} adapter registered for {} rail",
                    adapter.kind(),
                    expected
                )));
            }
        }

        let timeout = config.adapter_timeout;
        let retention = config.idempotency_retention();
        Ok(Self {
            mobile_money: GuardedAdapter::new(mobile_money, timeout, retention),
            card: GuardedAdapter::new(card, timeout, retention),
            cash: GuardedAdapter::new(cash, timeout, retention),
        })
    }

    /// Standard adapters over the given operator and acquirer gateways
    pub fn with_gateways(
        config: &EngineConfig,
        operator_gateway: Arc<dyn RailGateway>,
        card_gateway: Arc<dyn RailGateway>,
    ) -> Result<Self, PaymentError> {
        Self::new(
            config,
            Arc::new(MobileMoneyAdapter::new(operator_gateway, config)),
            Arc::new(CardAdapter::new(card_gateway)),
            Arc::new(CashAdapter),
        )
    }

    /// Standard adapters over always-approving sandbox gateways
    pub fn sandbox(config: &EngineConfig) -> Result<Self, PaymentError> {
        Self::with_gateways(
            config,
            Arc::new(ScriptedGateway::approving("momo")),
            Arc::new(ScriptedGateway::approving("card")),
        )
    }

    pub fn for_rail(&self, rail: Rail) -> &GuardedAdapter {
        match rail.kind() {
            RailKind::MobileMoney => &self.mobile_money,
            RailKind::Card => &self.card,
            RailKind::Cash => &self.cash,
        }
    }
}
