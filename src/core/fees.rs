//! Tiered fee calculation
//!
//! Fees are looked up per rail in ordered bands: the first band whose
//! threshold is at least the amount wins, and amounts above every threshold
//! pay the last band's fee. Rails with no schedule (card, cash) are free.

use crate::config::EngineConfig;
use crate::types::{Amount, FeeSchedule, PaymentError, Rail};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    schedules: HashMap<Rail, FeeSchedule>,
}

impl FeeCalculator {
    /// Collect the fee schedules of every catalog entry
    ///
    /// Two descriptors may price the same rail only with identical schedules,
    /// so a fee never depends on which descriptor the payer picked.
    pub fn from_config(config: &EngineConfig) -> Result<Self, PaymentError> {
        let mut schedules: HashMap<Rail, FeeSchedule> = HashMap::new();

        for method in &config.methods {
            for (rail, schedule) in &method.fee_tiers {
                if schedule.bands.is_empty() {
                    return Err(PaymentError::invalid_config(format!(
                        "empty fee schedule for {} in '{}'",
                        rail, method.id
                    )));
                }
                if let Some(existing) = schedules.get(rail) {
                    if existing != schedule {
                        return Err(PaymentError::invalid_config(format!(
                            "conflicting fee schedules for {}",
                            rail
                        )));
                    }
                } else {
                    schedules.insert(*rail, schedule.clone());
                }
            }
        }

        Ok(Self { schedules })
    }

    /// Fee for sending `amount` over `rail`
    ///
    /// # Arguments
    ///
    /// * `rail` - Resolved rail; cash and unscheduled rails are free
    /// * `amount` - Principal in minor units
    ///
    /// # Returns
    ///
    /// The fee of the first band whose threshold covers `amount`, or of the
    /// last band when none does
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is zero or negative.
    pub fn compute_fee(&self, rail: Rail, amount: Amount) -> Result<Amount, PaymentError> {
        if !amount.is_positive() {
            return Err(PaymentError::invalid_amount(amount.to_string()));
        }
        if rail == Rail::Cash {
            return Ok(Amount::ZERO);
        }

        let Some(schedule) = self.schedules.get(&rail) else {
            return Ok(Amount::ZERO);
        };

        let fee = schedule
            .bands
            .iter()
            .find(|band| amount <= band.threshold)
            .or_else(|| schedule.bands.last())
            .map(|band| band.fee)
            .unwrap_or(Amount::ZERO);
        Ok(fee)
    }
}
