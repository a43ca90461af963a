//! Engine configuration snapshot
//!
//! [`EngineConfig`] is loaded once and passed around as `Arc<EngineConfig>`.
//! It is never mutated in place: overrides produce a new snapshot with a bumped
//! `version`, so every transaction can be traced back to the exact catalog and
//! limits it was priced with.

use crate::types::{
    FeeBand, FeeSchedule, Operator, PaymentError, PaymentMethodDescriptor, Rail,
};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

pub const ENV_ADAPTER_TIMEOUT_MS: &str = "CHECKOUT_ADAPTER_TIMEOUT_MS";
pub const ENV_IDEMPOTENCY_WINDOW_SECS: &str = "CHECKOUT_IDEMPOTENCY_WINDOW_SECS";
pub const ENV_LEDGER_RETRY_LIMIT: &str = "CHECKOUT_LEDGER_RETRY_LIMIT";

/// Phone prefixes owned by one operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub prefixes: Vec<String>,
    pub operator: Operator,
}

impl PrefixRule {
    pub fn new(operator: Operator, prefixes: &[&str]) -> Self {
        Self {
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            operator,
        }
    }
}

/// Immutable, versioned engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub version: u64,
    pub methods: Vec<PaymentMethodDescriptor>,
    /// Evaluated in order; first matching prefix wins
    pub prefix_rules: Vec<PrefixRule>,
    pub default_operator: Operator,
    pub pin_length: usize,
    pub adapter_timeout: Duration,
    pub idempotency_window: Duration,
    /// Reload-and-reapply attempts after a ledger version conflict
    pub ledger_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            methods: default_catalog(),
            prefix_rules: vec![
                PrefixRule::new(Operator::Mtn, &["077", "078", "079"]),
                PrefixRule::new(Operator::Airtel, &["070", "075"]),
                PrefixRule::new(Operator::Utl, &["074"]),
            ],
            default_operator: Operator::Mtn,
            pin_length: 4,
            adapter_timeout: Duration::from_secs(30),
            idempotency_window: Duration::from_secs(60),
            ledger_retry_limit: 3,
        }
    }
}

impl EngineConfig {
    /// Built-in catalog with limits taken from the environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source
    ///
    /// Unparseable or zero values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let read = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(value) if value > 0 => Some(value),
                _ => {
                    warn!(variable = key, value = %raw, "ignoring invalid configuration value");
                    None
                }
            }
        };

        Self {
            adapter_timeout: read(ENV_ADAPTER_TIMEOUT_MS)
                .map(Duration::from_millis)
                .unwrap_or(default.adapter_timeout),
            idempotency_window: read(ENV_IDEMPOTENCY_WINDOW_SECS)
                .map(Duration::from_secs)
                .unwrap_or(default.idempotency_window),
            ledger_retry_limit: read(ENV_LEDGER_RETRY_LIMIT)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default.ledger_retry_limit),
            ..default
        }
    }

    /// New snapshot with the adapter timeout replaced
    pub fn with_adapter_timeout(&self, timeout: Duration) -> Self {
        Self {
            version: self.version + 1,
            adapter_timeout: timeout,
            ..self.clone()
        }
    }

    /// New snapshot with the idempotency window replaced
    pub fn with_idempotency_window(&self, window: Duration) -> Self {
        Self {
            version: self.version + 1,
            idempotency_window: window,
            ..self.clone()
        }
    }

    /// How long idempotency state must stay reachable
    ///
    /// A key can only recur while its window bucket is current, and an
    /// in-flight submission must outlive the adapter timeout, so the longer
    /// of the two bounds the retention.
    pub fn idempotency_retention(&self) -> Duration {
        self.idempotency_window
            .max(Duration::from_secs(1))
            .max(self.adapter_timeout)
    }

    /// Look up a catalog entry by id
    pub fn method(&self, id: &str) -> Result<&PaymentMethodDescriptor, PaymentError> {
        self.methods
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| PaymentError::unknown_method(id))
    }

    /// Structural checks on the catalog
    ///
    /// Fee-schedule consistency across descriptors is checked separately when
    /// the fee calculator is built.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.pin_length == 0 {
            return Err(PaymentError::invalid_config("pin_length must be positive"));
        }
        if self.adapter_timeout.is_zero() {
            return Err(PaymentError::invalid_config("adapter timeout must be positive"));
        }

        let mut seen = HashSet::new();
        for method in &self.methods {
            if !seen.insert(method.id.as_str()) {
                return Err(PaymentError::invalid_config(format!(
                    "duplicate payment method '{}'",
                    method.id
                )));
            }
            let kind = method.rail_kind().ok_or_else(|| PaymentError::UnresolvedRail {
                method: method.id.clone(),
            })?;
            if method.rails.iter().any(|rail| rail.kind() != kind) {
                return Err(PaymentError::invalid_config(format!(
                    "payment method '{}' mixes rail kinds",
                    method.id
                )));
            }
            if let Some((rail, _)) = method
                .fee_tiers
                .iter()
                .find(|(rail, _)| !method.supports(*rail))
            {
                return Err(PaymentError::invalid_config(format!(
                    "payment method '{}' prices unsupported rail {}",
                    method.id, rail
                )));
            }
        }
        Ok(())
    }
}

fn mtn_fees() -> FeeSchedule {
    FeeSchedule::new(vec![
        FeeBand::new(30_000, 600),
        FeeBand::new(50_000, 1_000),
        FeeBand::new(100_000, 1_500),
        FeeBand::new(i64::MAX, 2_500),
    ])
}

fn airtel_fees() -> FeeSchedule {
    FeeSchedule::new(vec![
        FeeBand::new(30_000, 500),
        FeeBand::new(50_000, 800),
        FeeBand::new(100_000, 1_200),
        FeeBand::new(i64::MAX, 2_000),
    ])
}

fn utl_fees() -> FeeSchedule {
    FeeSchedule::flat(1_000)
}

fn tags(features: &[&str]) -> Vec<String> {
    features.iter().map(|f| f.to_string()).collect()
}

fn mobile_money_method(id: &str, display_name: &str, operator: Operator) -> PaymentMethodDescriptor {
    let rail = Rail::MobileMoney(operator);
    let fees = match operator {
        Operator::Mtn => mtn_fees(),
        Operator::Airtel => airtel_fees(),
        Operator::Utl => utl_fees(),
    };
    PaymentMethodDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        rails: vec![rail],
        fee_tiers: vec![(rail, fees)],
        average_latency: Duration::from_secs(15),
        features: tags(&["ussd_prompt", "pin_confirmation"]),
    }
}

/// The built-in catalog
pub fn default_catalog() -> Vec<PaymentMethodDescriptor> {
    let mtn = Rail::MobileMoney(Operator::Mtn);
    let airtel = Rail::MobileMoney(Operator::Airtel);
    let utl = Rail::MobileMoney(Operator::Utl);

    vec![
        PaymentMethodDescriptor {
            id: "mobile_money".to_string(),
            display_name: "Mobile Money".to_string(),
            rails: vec![mtn, airtel, utl],
            fee_tiers: vec![(mtn, mtn_fees()), (airtel, airtel_fees()), (utl, utl_fees())],
            average_latency: Duration::from_secs(15),
            features: tags(&["ussd_prompt", "pin_confirmation", "operator_autodetect"]),
        },
        mobile_money_method("mtn_momo", "MTN Mobile Money", Operator::Mtn),
        mobile_money_method("airtel_money", "Airtel Money", Operator::Airtel),
        mobile_money_method("utl_money", "UTL Money", Operator::Utl),
        PaymentMethodDescriptor {
            id: "card".to_string(),
            display_name: "Credit/Debit Card".to_string(),
            rails: vec![Rail::Card],
            fee_tiers: vec![],
            average_latency: Duration::from_secs(5),
            features: tags(&["visa", "mastercard", "amex"]),
        },
        PaymentMethodDescriptor {
            id: "cash".to_string(),
            display_name: "Cash on Delivery".to_string(),
            rails: vec![Rail::Cash],
            fee_tiers: vec![],
            average_latency: Duration::ZERO,
            features: tags(&["pay_on_delivery"]),
        },
    ]
}
