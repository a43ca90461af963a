//! Card rail
//!
//! Detects the card brand and runs the Luhn checksum before handing the charge
//! to the acquirer gateway. Brand detection is also used for display.

use crate::core::traits::{RailAdapter, RailGateway};
use crate::types::{Credential, Outcome, RailKind, RailRequest};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Diners,
    Jcb,
    Unknown,
}

impl CardBrand {
    /// Brand from the leading digits of the card number
    pub fn detect(number: &str) -> Self {
        let digits: String = number.chars().filter(char::is_ascii_digit).collect();
        let two = digits.get(..2).unwrap_or("");

        if digits.starts_with('4') {
            CardBrand::Visa
        } else if matches!(two, "51" | "52" | "53" | "54" | "55") {
            CardBrand::Mastercard
        } else if matches!(two, "34" | "37") {
            CardBrand::Amex
        } else if digits.starts_with("6011") || two == "65" {
            CardBrand::Discover
        } else if matches!(two, "30" | "36" | "38" | "39") {
            CardBrand::Diners
        } else if two == "35" {
            CardBrand::Jcb
        } else {
            CardBrand::Unknown
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Amex => "amex",
            CardBrand::Discover => "discover",
            CardBrand::Diners => "diners",
            CardBrand::Jcb => "jcb",
            CardBrand::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Luhn checksum over the digits of `number`
///
/// Non-digit characters are skipped; fewer than two digits never passes.
pub fn luhn_valid(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 2 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

pub struct CardAdapter {
    gateway: Arc<dyn RailGateway>,
}

impl CardAdapter {
    pub fn new(gateway: Arc<dyn RailGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl RailAdapter for CardAdapter {
    fn kind(&self) -> RailKind {
        RailKind::Card
    }

    async fn submit(&self, request: &RailRequest) -> Outcome {
        let Credential::Card(card) = &request.credential else {
            return Outcome::declined("card rail requires card details");
        };
        if !luhn_valid(&card.number) {
            return Outcome::declined("card number is invalid");
        }
        if CardBrand::detect(&card.number) == CardBrand::Unknown {
            return Outcome::declined("card brand is not accepted");
        }
        self.gateway.charge(request).await
    }
}
