//! Transaction-related types
//!
//! This module defines the payer credential, the idempotency key, the rail
//! request/outcome pair exchanged with adapters, and the [`Transaction`] record
//! of one checkout attempt.

use crate::types::{Amount, MethodId, OrderId, PaymentError, Rail, RailKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Globally unique transaction identifier, generated once per attempt
pub type TransactionId = Uuid;

/// Card fields as entered by the payer
#[derive(Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
}

/// Payer credential collected in the details step
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    MobileMoney { phone: String, pin: String },
    Card(CardDetails),
    Cash,
}

impl Credential {
    pub fn kind(&self) -> RailKind {
        match self {
            Credential::MobileMoney { .. } => RailKind::MobileMoney,
            Credential::Card(_) => RailKind::Card,
            Credential::Cash => RailKind::Cash,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match self {
            Credential::MobileMoney { phone, .. } => Some(phone),
            _ => None,
        }
    }
}

// PINs, card numbers and CVVs must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::MobileMoney { phone, .. } => f
                .debug_struct("MobileMoney")
                .field("phone", phone)
                .field("pin", &"****")
                .finish(),
            Credential::Card(card) => f
                .debug_struct("Card")
                .field("last4", &last_four(&card.number))
                .finish_non_exhaustive(),
            Credential::Cash => f.write_str("Cash"),
        }
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("last4", &last_four(&self.number))
            .finish_non_exhaustive()
    }
}

fn last_four(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(char::is_ascii_digit).collect();
    digits[digits.len().saturating_sub(4)..].iter().collect()
}

/// Key that collapses duplicate submissions of one attempt to a single debit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for `(order, method, amount, timestamp bucket, attempt)`
    ///
    /// Submissions of the same attempt that land in the same `window` bucket
    /// share a key. Bumping `attempt` (an explicit retry) always yields a
    /// fresh key, and so does paying a different amount.
    pub fn derive(
        order: OrderId,
        method: &str,
        amount: Amount,
        at: DateTime<Utc>,
        window: Duration,
        attempt: u32,
    ) -> Self {
        let window_secs = window.as_secs().max(1) as i64;
        let bucket = at.timestamp().div_euclid(window_secs);

        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}:{}:{}", order, method, amount, bucket, attempt).as_bytes());
        IdempotencyKey(format!("{:x}", hasher.finalize()))
    }

    /// Narrow the key to one caller-supplied request reference
    ///
    /// Two submissions that would otherwise share a key stay distinct when
    /// their references differ, while resubmitting the same reference still
    /// collapses.
    ///
    /// # Arguments
    ///
    /// * `reference` - Identity of the request on the caller's side, such as
    ///   a row number or a client request id
    pub fn scoped(self, reference: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", self.0, reference).as_bytes());
        IdempotencyKey(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A checkout request as handed to the processing step
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub order_id: OrderId,
    pub amount: Amount,
    pub method_id: MethodId,
    pub credential: Credential,
    pub idempotency_key: IdempotencyKey,
}

/// Payload crossing the rail boundary
#[derive(Debug, Clone)]
pub struct RailRequest {
    pub rail: Rail,
    pub principal: Amount,
    pub fee: Amount,
    pub credential: Credential,
    pub idempotency_key: IdempotencyKey,
    pub merchant_reference: String,
}

/// Terminal answer of a rail for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Approved { external_ref: String },
    Declined { reason: String },
    TimedOut,
}

impl Outcome {
    pub fn declined(reason: impl Into<String>) -> Self {
        Outcome::Declined {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Approved { .. })
    }

    pub fn external_ref(&self) -> Option<&str> {
        match self {
            Outcome::Approved { external_ref } => Some(external_ref),
            _ => None,
        }
    }

    pub fn error_reason(&self) -> Option<&str> {
        match self {
            Outcome::Approved { .. } => None,
            Outcome::Declined { reason } => Some(reason),
            Outcome::TimedOut => Some("payment network did not respond in time"),
        }
    }
}

/// Lifecycle of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Succeeded | TransactionStatus::Failed)
    }
}

/// Why a rail did not approve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Declined,
    /// True outcome unknown; kept separate for diagnostics
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    /// Message suitable for showing next to a "try again" action
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::Declined => format!("Payment was declined: {}", self.reason),
            FailureKind::Timeout => {
                "The payment network did not respond in time. No balance was updated; please try again."
                    .to_string()
            }
        }
    }
}

/// One checkout attempt
///
/// Fields are private: a transaction only moves forward through
/// [`start_processing`](Transaction::start_processing) and
/// [`settle`](Transaction::settle), and nothing can touch it once it is terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: TransactionId,
    order_id: OrderId,
    method: MethodId,
    rail: Rail,
    principal: Amount,
    fee: Amount,
    debit_total: Amount,
    status: TransactionStatus,
    idempotency_key: IdempotencyKey,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    external_ref: Option<String>,
    failure: Option<Failure>,
}

impl Transaction {
    /// Create a `pending` transaction for a priced request
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the principal is not positive or the fee is negative
    /// - `ArithmeticOverflow` if `principal + fee` does not fit
    pub fn pending(
        id: TransactionId,
        request: &TransactionRequest,
        rail: Rail,
        fee: Amount,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PaymentError> {
        if !request.amount.is_positive() {
            return Err(PaymentError::invalid_amount(request.amount.to_string()));
        }
        if fee < Amount::ZERO {
            return Err(PaymentError::invalid_amount(fee.to_string()));
        }
        let debit_total = request
            .amount
            .checked_add(fee)
            .ok_or_else(|| PaymentError::arithmetic_overflow("debit total", request.order_id))?;

        Ok(Self {
            id,
            order_id: request.order_id,
            method: request.method_id.clone(),
            rail,
            principal: request.amount,
            fee,
            debit_total,
            status: TransactionStatus::Pending,
            idempotency_key: request.idempotency_key.clone(),
            created_at,
            resolved_at: None,
            external_ref: None,
            failure: None,
        })
    }

    /// `pending → processing`
    pub fn start_processing(&mut self) -> Result<(), PaymentError> {
        if self.status != TransactionStatus::Pending {
            return Err(PaymentError::invalid_transition(
                self.status_name(),
                "processing",
            ));
        }
        self.status = TransactionStatus::Processing;
        Ok(())
    }

    /// `processing → succeeded | failed` according to the rail outcome
    pub fn settle(&mut self, outcome: &Outcome, at: DateTime<Utc>) -> Result<(), PaymentError> {
        if self.status != TransactionStatus::Processing {
            return Err(PaymentError::invalid_transition(self.status_name(), "settled"));
        }

        match outcome {
            Outcome::Approved { external_ref } => {
                self.status = TransactionStatus::Succeeded;
                self.external_ref = Some(external_ref.clone());
            }
            Outcome::Declined { reason } => {
                self.status = TransactionStatus::Failed;
                self.failure = Some(Failure {
                    kind: FailureKind::Declined,
                    reason: reason.clone(),
                });
            }
            Outcome::TimedOut => {
                self.status = TransactionStatus::Failed;
                self.failure = Some(Failure {
                    kind: FailureKind::Timeout,
                    reason: "timeout".to_string(),
                });
            }
        }
        self.resolved_at = Some(at);
        Ok(())
    }

    fn status_name(&self) -> &'static str {
        match self.status {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn rail(&self) -> Rail {
        self.rail
    }

    pub fn principal(&self) -> Amount {
        self.principal
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Amount withdrawn from the payer: `principal + fee`
    pub fn debited(&self) -> Amount {
        self.debit_total
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Receipt number shown to the payer, e.g. `RCP-20261016-1A2B3C4D`
    pub fn receipt_number(&self) -> String {
        let stamp = self.resolved_at.unwrap_or(self.created_at).format("%Y%m%d");
        let short = self.id.simple().to_string()[..8].to_uppercase();
        format!("RCP-{}-{}", stamp, short)
    }
}
