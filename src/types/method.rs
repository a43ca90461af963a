//! Payment rails and the payment-method catalog
//!
//! A [`Rail`] is the channel that actually moves the money. The set is closed:
//! mobile money (one variant per operator), card, and cash. A
//! [`PaymentMethodDescriptor`] is what the payer picks at checkout; it names the
//! rails it may route to and carries their fee tiers.

use crate::types::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Catalog identifier of a payment method (e.g. `"mtn_momo"`)
pub type MethodId = String;

/// Mobile-money network operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Mtn,
    Airtel,
    Utl,
}

impl Operator {
    /// USSD short code the payer dials to approve a prompt
    pub fn ussd_code(self) -> &'static str {
        match self {
            Operator::Mtn => "*165#",
            Operator::Airtel => "*185#",
            Operator::Utl => "*165#",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Mtn => "mtn",
            Operator::Airtel => "airtel",
            Operator::Utl => "utl",
        };
        f.write_str(name)
    }
}

/// A concrete payment rail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    MobileMoney(Operator),
    Card,
    Cash,
}

/// Rail without its operator; selects the adapter and the credential shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RailKind {
    MobileMoney,
    Card,
    Cash,
}

impl Rail {
    pub fn kind(self) -> RailKind {
        match self {
            Rail::MobileMoney(_) => RailKind::MobileMoney,
            Rail::Card => RailKind::Card,
            Rail::Cash => RailKind::Cash,
        }
    }

    pub fn operator(self) -> Option<Operator> {
        match self {
            Rail::MobileMoney(operator) => Some(operator),
            Rail::Card | Rail::Cash => None,
        }
    }
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rail::MobileMoney(operator) => write!(f, "mobile_money:{}", operator),
            Rail::Card => f.write_str("card"),
            Rail::Cash => f.write_str("cash"),
        }
    }
}

impl fmt::Display for RailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RailKind::MobileMoney => "mobile_money",
            RailKind::Card => "card",
            RailKind::Cash => "cash",
        };
        f.write_str(name)
    }
}

/// One fee tier: amounts up to and including `threshold` pay `fee`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBand {
    pub threshold: Amount,
    pub fee: Amount,
}

impl FeeBand {
    pub const fn new(threshold: i64, fee: i64) -> Self {
        Self {
            threshold: Amount::new(threshold),
            fee: Amount::new(fee),
        }
    }
}

/// Ordered fee tiers for one rail, evaluated top to bottom
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub bands: Vec<FeeBand>,
}

impl FeeSchedule {
    pub fn new(bands: Vec<FeeBand>) -> Self {
        Self { bands }
    }

    /// A single flat fee regardless of amount
    pub fn flat(fee: i64) -> Self {
        Self::new(vec![FeeBand::new(i64::MAX, fee)])
    }
}

/// Static catalog entry for a payment method the payer can choose
///
/// Immutable once loaded; shared through the engine configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentMethodDescriptor {
    pub id: MethodId,
    pub display_name: String,

    /// Rails this method may route to. The first entry is the preferred rail
    /// when resolution cannot pick one from the credential.
    pub rails: Vec<Rail>,

    /// Fee tiers for metered rails of this method. Rails without an entry are
    /// not metered.
    pub fee_tiers: Vec<(Rail, FeeSchedule)>,

    pub average_latency: Duration,
    pub features: Vec<String>,
}

impl PaymentMethodDescriptor {
    /// All rails of one descriptor share a kind
    pub fn rail_kind(&self) -> Option<RailKind> {
        self.rails.first().map(|rail| rail.kind())
    }

    pub fn supports(&self, rail: Rail) -> bool {
        self.rails.contains(&rail)
    }
}
