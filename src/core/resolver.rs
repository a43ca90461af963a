//! Network resolution
//!
//! Maps a method descriptor plus the payer credential to the rail that will
//! carry the payment. Card and cash rails are fixed by the credential; for
//! mobile money the operator is detected from the phone prefix.

use crate::config::{EngineConfig, PrefixRule};
use crate::types::{Credential, Operator, PaymentMethodDescriptor, Rail};

/// Pure prefix-table resolver built from a configuration snapshot
#[derive(Debug, Clone)]
pub struct NetworkResolver {
    rules: Vec<PrefixRule>,
    default_operator: Operator,
}

impl NetworkResolver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rules: config.prefix_rules.clone(),
            default_operator: config.default_operator,
        }
    }

    /// Operator owning `phone`, or the configured default when no prefix matches
    pub fn detect_operator(&self, phone: &str) -> Operator {
        self.match_prefix(phone).unwrap_or(self.default_operator)
    }

    /// Operator owning `phone` if a prefix rule matches
    pub fn match_prefix(&self, phone: &str) -> Option<Operator> {
        let normalized = normalize_phone(phone);
        self.rules
            .iter()
            .find(|rule| rule.prefixes.iter().any(|p| normalized.starts_with(p.as_str())))
            .map(|rule| rule.operator)
    }

    /// Rail for this descriptor and credential
    ///
    /// Never fails. A descriptor pinned to a single mobile-money operator keeps
    /// it; otherwise the detected operator is used when the descriptor supports
    /// it, then the descriptor's preferred rail, then the default operator.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Catalog entry the payer selected
    /// * `credential` - Payer details; only the phone number is inspected
    ///
    /// # Returns
    ///
    /// The rail the payment will be submitted on. The same inputs always give
    /// the same rail.
    pub fn resolve(&self, descriptor: &PaymentMethodDescriptor, credential: &Credential) -> Rail {
        match credential {
            Credential::Card(_) => Rail::Card,
            Credential::Cash => Rail::Cash,
            Credential::MobileMoney { phone, .. } => {
                let mobile: Vec<Rail> = descriptor
                    .rails
                    .iter()
                    .copied()
                    .filter(|rail| rail.operator().is_some())
                    .collect();
                if let [only] = mobile.as_slice() {
                    return *only;
                }

                let detected = Rail::MobileMoney(self.detect_operator(phone));
                if mobile.contains(&detected) || mobile.is_empty() {
                    detected
                } else {
                    mobile[0]
                }
            }
        }
    }
}

/// Canonical local form of a phone number
///
/// Drops spaces, dashes, brackets and `+`, and rewrites the `256` country code
/// to a leading `0`.
///
/// # Examples
///
/// ```
/// use checkout_engine::core::resolver::normalize_phone;
///
/// assert_eq!(normalize_phone("+256 772-123-456"), "0772123456");
/// ```
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+' | '(' | ')'))
        .collect();
    match digits.strip_prefix("256") {
        Some(rest) => format!("0{}", rest),
        None => digits,
    }
}
