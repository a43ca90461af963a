//! Mobile-money rail
//!
//! Performs the operator-side checks (number belongs to the rail's operator,
//! PIN shape) before pushing the USSD prompt through the operator gateway.

use crate::config::EngineConfig;
use crate::core::resolver::NetworkResolver;
use crate::core::traits::{RailAdapter, RailGateway};
use crate::types::{Credential, Outcome, Rail, RailKind, RailRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct MobileMoneyAdapter {
    gateway: Arc<dyn RailGateway>,
    resolver: NetworkResolver,
    pin_length: usize,
}

impl MobileMoneyAdapter {
    pub fn new(gateway: Arc<dyn RailGateway>, config: &EngineConfig) -> Self {
        Self {
            gateway,
            resolver: NetworkResolver::new(config),
            pin_length: config.pin_length,
        }
    }
}

#[async_trait]
impl RailAdapter for MobileMoneyAdapter {
    fn kind(&self) -> RailKind {
        RailKind::MobileMoney
    }

    async fn submit(&self, request: &RailRequest) -> Outcome {
        let (operator, phone, pin) = match (&request.rail, &request.credential) {
            (Rail::MobileMoney(operator), Credential::MobileMoney { phone, pin }) => {
                (*operator, phone, pin)
            }
            _ => return Outcome::declined("mobile money rail requires a phone number and PIN"),
        };

        // A number with a known prefix must belong to the operator charged
        if let Some(owner) = self.resolver.match_prefix(phone) {
            if owner != operator {
                return Outcome::declined(format!(
                    "number is registered with {}, not {}",
                    owner, operator
                ));
            }
        }
        if pin.len() != self.pin_length || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Outcome::declined("invalid PIN");
        }

        debug!(
            operator = %operator,
            ussd = operator.ussd_code(),
            gateway = self.gateway.name(),
            "pushing payment prompt"
        );
        self.gateway.charge(request).await
    }
}
