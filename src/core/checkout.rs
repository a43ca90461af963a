//! Checkout session state machine
//!
//! ```text
//! selecting ──select_method──▶ details ──submit──▶ processing ──▶ succeeded
//!     ▲                           │                    │
//!     │                        cancel                  └────────▶ failed
//!     │                           ▼                                  │
//!     │                       abandoned                              │
//!     └──────────────────────────retry───────────────────────────────┘
//! ```
//!
//! A session is one payer's attempt to pay part of an order. It never talks
//! to rails or the ledger itself; [`CheckoutEngine::submit`] drives the
//! processing step and reports back through
//! [`start_processing`](CheckoutSession::start_processing) and
//! [`complete`](CheckoutSession::complete).
//!
//! [`CheckoutEngine::submit`]: crate::core::engine::CheckoutEngine::submit

use crate::config::EngineConfig;
use crate::core::resolver::normalize_phone;
use crate::types::{
    Amount, CardDetails, Credential, FieldError, MethodId, OrderId, PaymentError, RailKind,
    Transaction, TransactionId, TransactionStatus,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutState {
    Selecting,
    Details { method: MethodId },
    Processing {
        method: MethodId,
        transaction_id: TransactionId,
    },
    Succeeded(Transaction),
    Failed(Transaction),
    Abandoned,
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::Selecting => "selecting",
            CheckoutState::Details { .. } => "details",
            CheckoutState::Processing { .. } => "processing",
            CheckoutState::Succeeded(_) => "succeeded",
            CheckoutState::Failed(_) => "failed",
            CheckoutState::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    order_id: OrderId,
    amount: Amount,
    attempt: u32,
    reference: Option<String>,
    state: CheckoutState,
    config: Arc<EngineConfig>,
}

impl CheckoutSession {
    pub(crate) fn new(order_id: OrderId, amount: Amount, config: Arc<EngineConfig>) -> Self {
        Self {
            order_id,
            amount,
            attempt: 1,
            reference: None,
            state: CheckoutState::Selecting,
            config,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// 1-based attempt counter; bumped by every retry
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Tag the session with the caller's request reference
    ///
    /// Sessions without a reference that pay the same order, method and
    /// amount within one idempotency window are treated as one payment. A
    /// reference marks the session as a distinct request, so only sessions
    /// sharing both the reference and those fields collapse.
    ///
    /// # Arguments
    ///
    /// * `reference` - Caller-side identity of the request
    ///
    /// # Returns
    ///
    /// The session, for chaining after [`CheckoutEngine::begin`]
    ///
    /// [`CheckoutEngine::begin`]: crate::core::engine::CheckoutEngine::begin
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// Terminal transaction, if the session reached one
    pub fn transaction(&self) -> Option<&Transaction> {
        match &self.state {
            CheckoutState::Succeeded(tx) | CheckoutState::Failed(tx) => Some(tx),
            _ => None,
        }
    }

    /// Human-readable reason of a failed attempt
    pub fn failure_reason(&self) -> Option<String> {
        match &self.state {
            CheckoutState::Failed(tx) => tx.failure().map(|f| f.user_message()),
            _ => None,
        }
    }

    /// Pick (or change) the payment method
    ///
    /// # Errors
    ///
    /// - `UnknownMethod` if `method_id` is not in the catalog
    /// - `InvalidTransition` outside `selecting` and `details`
    pub fn select_method(&mut self, method_id: &str) -> Result<(), PaymentError> {
        match self.state {
            CheckoutState::Selecting | CheckoutState::Details { .. } => {
                self.config.method(method_id)?;
                self.state = CheckoutState::Details {
                    method: method_id.to_string(),
                };
                Ok(())
            }
            _ => Err(self.transition_error("details")),
        }
    }

    /// Return from details to method selection
    pub fn back(&mut self) -> Result<(), PaymentError> {
        match self.state {
            CheckoutState::Details { .. } => {
                self.state = CheckoutState::Selecting;
                Ok(())
            }
            _ => Err(self.transition_error("selecting")),
        }
    }

    /// Abandon the checkout; only allowed before processing starts
    pub fn cancel(&mut self) -> Result<(), PaymentError> {
        match self.state {
            CheckoutState::Selecting | CheckoutState::Details { .. } => {
                self.state = CheckoutState::Abandoned;
                Ok(())
            }
            _ => Err(self.transition_error("abandoned")),
        }
    }

    /// Start over after a failure, keeping the order and amount
    pub fn retry(&mut self) -> Result<(), PaymentError> {
        match self.state {
            CheckoutState::Failed(_) => {
                self.attempt += 1;
                self.state = CheckoutState::Selecting;
                Ok(())
            }
            _ => Err(self.transition_error("selecting")),
        }
    }

    /// Check the credential against the selected method
    ///
    /// Returns the selected method id. Every problem is reported at once as
    /// `ValidationFailed`, and the session stays in `details`.
    pub fn validate_details(&self, credential: &Credential) -> Result<MethodId, PaymentError> {
        let CheckoutState::Details { method } = &self.state else {
            return Err(self.transition_error("processing"));
        };
        let descriptor = self.config.method(method)?;
        let expected = descriptor.rail_kind().ok_or_else(|| PaymentError::UnresolvedRail {
            method: method.clone(),
        })?;

        let errors = if credential.kind() != expected {
            vec![FieldError::new(
                "method",
                format!("{} requires {} details", descriptor.display_name, expected),
            )]
        } else {
            match credential {
                Credential::MobileMoney { phone, pin } => {
                    mobile_money_errors(phone, pin, self.config.pin_length)
                }
                Credential::Card(card) => card_errors(card),
                Credential::Cash => Vec::new(),
            }
        };

        if errors.is_empty() {
            Ok(method.clone())
        } else {
            Err(PaymentError::validation(errors))
        }
    }

    /// `details → processing`
    pub(crate) fn start_processing(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<(), PaymentError> {
        match &self.state {
            CheckoutState::Details { method } => {
                self.state = CheckoutState::Processing {
                    method: method.clone(),
                    transaction_id,
                };
                Ok(())
            }
            _ => Err(self.transition_error("processing")),
        }
    }

    /// `processing → succeeded | failed` with the settled transaction
    pub(crate) fn complete(&mut self, tx: Transaction) -> Result<(), PaymentError> {
        match &self.state {
            CheckoutState::Processing { transaction_id, .. } if *transaction_id == tx.id() => {
                self.state = match tx.status() {
                    TransactionStatus::Succeeded => CheckoutState::Succeeded(tx),
                    TransactionStatus::Failed => CheckoutState::Failed(tx),
                    TransactionStatus::Pending | TransactionStatus::Processing => {
                        return Err(PaymentError::invalid_transition(
                            "processing",
                            "unsettled",
                        ))
                    }
                };
                Ok(())
            }
            _ => Err(self.transition_error("settled")),
        }
    }

    fn transition_error(&self, to: &str) -> PaymentError {
        PaymentError::invalid_transition(self.state.name(), to)
    }
}

fn digits_only(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn mobile_money_errors(phone: &str, pin: &str, pin_length: usize) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let normalized = normalize_phone(phone);
    if phone.trim().is_empty() {
        errors.push(FieldError::new("phone", "is required"));
    } else if normalized.len() != 10 || !normalized.starts_with('0') || !digits_only(&normalized) {
        errors.push(FieldError::new("phone", "must look like 07XXXXXXXX"));
    }

    if pin.is_empty() {
        errors.push(FieldError::new("pin", "is required"));
    } else if pin.len() != pin_length || !digits_only(pin) {
        errors.push(FieldError::new("pin", format!("must be {} digits", pin_length)));
    }
    errors
}

fn card_errors(card: &CardDetails) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let number: String = card.number.chars().filter(|c| !c.is_whitespace()).collect();
    if number.is_empty() {
        errors.push(FieldError::new("card_number", "is required"));
    } else if !(13..=19).contains(&number.len()) || !digits_only(&number) {
        errors.push(FieldError::new("card_number", "must be 13 to 19 digits"));
    }

    let expiry_ok = card
        .expiry
        .trim()
        .split_once('/')
        .map(|(month, year)| {
            digits_only(month)
                && digits_only(year)
                && month.len() == 2
                && year.len() == 2
                && month.parse::<u32>().is_ok_and(|m| (1..=12).contains(&m))
        })
        .unwrap_or(false);
    if card.expiry.trim().is_empty() {
        errors.push(FieldError::new("card_expiry", "is required"));
    } else if !expiry_ok {
        errors.push(FieldError::new("card_expiry", "must be MM/YY"));
    }

    let cvv = card.cvv.trim();
    if cvv.is_empty() {
        errors.push(FieldError::new("card_cvv", "is required"));
    } else if !(3..=4).contains(&cvv.len()) || !digits_only(cvv) {
        errors.push(FieldError::new("card_cvv", "must be 3 or 4 digits"));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn session() -> CheckoutSession {
        CheckoutSession::new(1, Amount::new(50_000), Arc::new(EngineConfig::default()))
    }

    fn momo(phone: &str, pin: &str) -> Credential {
        Credential::MobileMoney {
            phone: phone.to_string(),
            pin: pin.to_string(),
        }
    }

    fn card(number: &str, expiry: &str, cvv: &str) -> Credential {
        Credential::Card(CardDetails {
            number: number.to_string(),
            expiry: expiry.to_string(),
            cvv: cvv.to_string(),
        })
    }

    fn field_names(error: PaymentError) -> Vec<&'static str> {
        match error {
            PaymentError::ValidationFailed { errors } => errors.iter().map(|e| e.field).collect(),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_select_then_cancel() {
        let mut s = session();
        s.select_method("mtn_momo").unwrap();
        assert_eq!(
            s.state(),
            &CheckoutState::Details {
                method: "mtn_momo".to_string()
            }
        );
        s.cancel().unwrap();
        assert_eq!(s.state(), &CheckoutState::Abandoned);
        assert!(s.select_method("card").is_err());
    }

    #[test]
    fn test_unknown_method_keeps_state() {
        let mut s = session();
        assert!(matches!(
            s.select_method("bitcoin"),
            Err(PaymentError::UnknownMethod { .. })
        ));
        assert_eq!(s.state(), &CheckoutState::Selecting);
    }

    #[test]
    fn test_cancel_not_allowed_while_processing() {
        let mut s = session();
        s.select_method("cash").unwrap();
        s.start_processing(uuid::Uuid::new_v4()).unwrap();
        assert!(matches!(
            s.cancel(),
            Err(PaymentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_retry_only_from_failed() {
        let mut s = session();
        assert!(s.retry().is_err());
        assert_eq!(s.attempt(), 1);
    }

    #[rstest]
    #[case::valid("0772123456", "1234", vec![])]
    #[case::international("+256 772 123 456", "1234", vec![])]
    #[case::missing_both("", "", vec!["phone", "pin"])]
    #[case::short_phone("07721", "1234", vec!["phone"])]
    #[case::long_pin("0772123456", "12345", vec!["pin"])]
    #[case::alpha_pin("0772123456", "12a4", vec!["pin"])]
    fn test_mobile_money_validation(
        #[case] phone: &str,
        #[case] pin: &str,
        #[case] expected: Vec<&'static str>,
    ) {
        let mut s = session();
        s.select_method("mtn_momo").unwrap();
        match s.validate_details(&momo(phone, pin)) {
            Ok(method) => {
                assert!(expected.is_empty());
                assert_eq!(method, "mtn_momo");
            }
            Err(e) => assert_eq!(field_names(e), expected),
        }
    }

    #[rstest]
    #[case::valid("4111 1111 1111 1111", "12/30", "123", vec![])]
    #[case::amex_cvv("378282246310005", "01/29", "1234", vec![])]
    #[case::short_number("4111", "12/30", "123", vec!["card_number"])]
    #[case::bad_month("4111111111111111", "13/30", "123", vec!["card_expiry"])]
    #[case::bad_format("4111111111111111", "1230", "12", vec!["card_expiry", "card_cvv"])]
    #[case::all_missing("", "", "", vec!["card_number", "card_expiry", "card_cvv"])]
    fn test_card_validation(
        #[case] number: &str,
        #[case] expiry: &str,
        #[case] cvv: &str,
        #[case] expected: Vec<&'static str>,
    ) {
        let mut s = session();
        s.select_method("card").unwrap();
        match s.validate_details(&card(number, expiry, cvv)) {
            Ok(_) => assert!(expected.is_empty()),
            Err(e) => assert_eq!(field_names(e), expected),
        }
    }

    #[test]
    fn test_credential_must_match_method() {
        let mut s = session();
        s.select_method("card").unwrap();
        let error = s.validate_details(&Credential::Cash).unwrap_err();
        assert_eq!(field_names(error), vec!["method"]);
    }

    #[test]
    fn test_validation_requires_details_state() {
        let s = session();
        assert!(matches!(
            s.validate_details(&Credential::Cash),
            Err(PaymentError::InvalidTransition { .. })
        ));
    }
}
