//! CSV format handling for replay commands and ledger output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to replay commands
//! - Order and summary output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Input columns
//!
//! `type,order,amount,method,phone,pin,card_number,card_expiry,card_cvv,receipts,actor,note,reference,due_date`
//!
//! Only `type` and `order` are always required; the rest depend on the row
//! type. `receipts` is a `|`-separated list of `channel:destination` pairs.

use crate::core::ledger_store::LedgerView;
use crate::core::receipts::{ChannelKind, ReceiptTarget};
use crate::core::reconciliation::LedgerSummary;
use crate::types::{Amount, CardDetails, Credential, OrderId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::io::Write;

const DEFAULT_ACTOR: &str = "replay";

/// CSV record structure for deserialization
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub order: OrderId,
    pub amount: Option<String>,
    pub method: Option<String>,
    pub phone: Option<String>,
    pub pin: Option<String>,
    pub card_number: Option<String>,
    pub card_expiry: Option<String>,
    pub card_cvv: Option<String>,
    pub receipts: Option<String>,
    pub actor: Option<String>,
    pub note: Option<String>,
    pub reference: Option<String>,
    pub due_date: Option<String>,
}

/// One row of a replay file
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayCommand {
    /// Create an order with its total
    Open {
        order: OrderId,
        total: Amount,
        actor: String,
    },
    /// Checkout through a rail
    Pay {
        order: OrderId,
        amount: Amount,
        method: String,
        credential: Credential,
        receipts: Vec<ReceiptTarget>,
        actor: String,
    },
    /// Discount (negative) or surcharge (positive)
    Adjust {
        order: OrderId,
        delta: Amount,
        actor: String,
        note: Option<String>,
    },
    /// Manager approval with optional initial payment and due date
    Approve {
        order: OrderId,
        initial_payment: Option<Amount>,
        next_payment_date: Option<DateTime<Utc>>,
        actor: String,
        note: Option<String>,
    },
    /// Manual payment awaiting confirmation
    Record {
        order: OrderId,
        amount: Amount,
        method: String,
        reference: String,
        actor: String,
        note: Option<String>,
    },
    /// Counterparty confirmation of a recorded payment
    Confirm {
        order: OrderId,
        reference: String,
        actor: String,
    },
}

impl ReplayCommand {
    pub fn order(&self) -> OrderId {
        match self {
            ReplayCommand::Open { order, .. }
            | ReplayCommand::Pay { order, .. }
            | ReplayCommand::Adjust { order, .. }
            | ReplayCommand::Approve { order, .. }
            | ReplayCommand::Record { order, .. }
            | ReplayCommand::Confirm { order, .. } => *order,
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &str, record: &CsvRecord) -> Result<String, String> {
    present(value).ok_or_else(|| format!("{} row for order {} requires {}", record.kind, record.order, field))
}

fn parse_amount(raw: &str, order: OrderId) -> Result<Amount, String> {
    raw.parse::<Amount>()
        .map_err(|_| format!("Invalid amount '{}' for order {}", raw, order))
}

/// Parse `sms:0772123456|email:payer@example.com`
pub fn parse_receipt_targets(raw: &str) -> Result<Vec<ReceiptTarget>, String> {
    raw.split('|')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (channel, destination) = part
                .split_once(':')
                .ok_or_else(|| format!("Invalid receipt target '{}'", part))?;
            let channel: ChannelKind = channel.parse().map_err(|e| format!("{}", e))?;
            Ok(ReceiptTarget::new(channel, destination.trim()))
        })
        .collect()
}

fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("Invalid due date '{}'", raw))
}

fn credential_from(record: &CsvRecord) -> Credential {
    if let Some(number) = present(record.card_number.clone()) {
        Credential::Card(CardDetails {
            number,
            expiry: present(record.card_expiry.clone()).unwrap_or_default(),
            cvv: present(record.card_cvv.clone()).unwrap_or_default(),
        })
    } else if record.phone.is_some() || record.pin.is_some() {
        Credential::MobileMoney {
            phone: present(record.phone.clone()).unwrap_or_default(),
            pin: present(record.pin.clone()).unwrap_or_default(),
        }
    } else {
        Credential::Cash
    }
}

/// Convert a CsvRecord to a ReplayCommand
///
/// # Returns
///
/// Result containing either:
/// - Ok(ReplayCommand) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(record: CsvRecord) -> Result<ReplayCommand, String> {
    let order = record.order;
    let actor = present(record.actor.clone()).unwrap_or_else(|| DEFAULT_ACTOR.to_string());
    let note = present(record.note.clone());

    match record.kind.trim().to_lowercase().as_str() {
        "open" => {
            let total = required(record.amount.clone(), "an amount", &record)?;
            Ok(ReplayCommand::Open {
                order,
                total: parse_amount(&total, order)?,
                actor,
            })
        }
        "pay" => {
            let amount = required(record.amount.clone(), "an amount", &record)?;
            let method = required(record.method.clone(), "a method", &record)?;
            let receipts = match present(record.receipts.clone()) {
                Some(raw) => parse_receipt_targets(&raw)?,
                None => Vec::new(),
            };
            Ok(ReplayCommand::Pay {
                order,
                amount: parse_amount(&amount, order)?,
                credential: credential_from(&record),
                method,
                receipts,
                actor,
            })
        }
        "adjust" => {
            let delta = required(record.amount.clone(), "an amount", &record)?;
            Ok(ReplayCommand::Adjust {
                order,
                delta: parse_amount(&delta, order)?,
                actor,
                note,
            })
        }
        "approve" => {
            let initial_payment = present(record.amount.clone())
                .map(|raw| parse_amount(&raw, order))
                .transpose()?;
            let next_payment_date = present(record.due_date.clone())
                .map(|raw| parse_due_date(&raw))
                .transpose()?;
            Ok(ReplayCommand::Approve {
                order,
                initial_payment,
                next_payment_date,
                actor,
                note,
            })
        }
        "record" => {
            let amount = required(record.amount.clone(), "an amount", &record)?;
            let reference = required(record.reference.clone(), "a reference", &record)?;
            Ok(ReplayCommand::Record {
                order,
                amount: parse_amount(&amount, order)?,
                method: present(record.method.clone()).unwrap_or_else(|| "manual".to_string()),
                reference,
                actor,
                note,
            })
        }
        "confirm" => {
            let reference = required(record.reference.clone(), "a reference", &record)?;
            Ok(ReplayCommand::Confirm {
                order,
                reference,
                actor,
            })
        }
        _ => Err(format!(
            "Invalid row type: '{}' for order {}",
            record.kind, order
        )),
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.to_rfc3339()).unwrap_or_default()
}

/// Write order ledgers to CSV format
///
/// Orders are sorted by id for deterministic output.
pub fn write_orders_csv(views: &[LedgerView], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "order",
            "total_amount",
            "amount_paid",
            "balance_due",
            "payment_status",
            "last_payment_date",
            "next_payment_date",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = views.to_vec();
    sorted.sort_by_key(|view| view.order_id);

    for view in sorted {
        writer
            .write_record(&[
                view.order_id.to_string(),
                view.total_amount.to_string(),
                view.amount_paid.to_string(),
                view.balance_due.to_string(),
                view.payment_status.to_string(),
                format_date(view.last_payment_date),
                format_date(view.next_payment_date),
            ])
            .map_err(|e| format!("Failed to write order record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Write reconciliation summaries to CSV format
pub fn write_summary_csv(summaries: &[LedgerSummary], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "order",
            "transaction_count",
            "sum_paid",
            "average_payment",
            "percent_paid",
            "last_payment_date",
            "payment_status",
            "transitions",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = summaries.to_vec();
    sorted.sort_by_key(|summary| summary.order_id);

    for summary in sorted {
        let transitions = summary
            .transitions
            .iter()
            .map(|t| format!("{}>{}", t.from, t.to))
            .collect::<Vec<_>>()
            .join("|");
        writer
            .write_record(&[
                summary.order_id.to_string(),
                summary.transaction_count.to_string(),
                summary.sum_paid.to_string(),
                summary.average_payment.to_string(),
                summary.percent_paid.to_string(),
                format_date(summary.last_payment_date),
                summary.payment_status.to_string(),
                transitions,
            ])
            .map_err(|e| format!("Failed to write summary record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentStatus;
    use rstest::rstest;

    fn record(kind: &str, amount: Option<&str>) -> CsvRecord {
        CsvRecord {
            kind: kind.to_string(),
            order: 7,
            amount: amount.map(str::to_string),
            ..CsvRecord::default()
        }
    }

    #[test]
    fn test_convert_pay_with_mobile_money() {
        let mut r = record("pay", Some("50000"));
        r.method = Some("mtn_momo".to_string());
        r.phone = Some("0772123456".to_string());
        r.pin = Some("1234".to_string());
        r.receipts = Some("sms:0772123456|whatsapp:+256772123456".to_string());

        let ReplayCommand::Pay {
            amount,
            credential,
            receipts,
            actor,
            ..
        } = convert_csv_record(r).unwrap()
        else {
            panic!("expected pay");
        };
        assert_eq!(amount, Amount::new(50_000));
        assert_eq!(credential.phone(), Some("0772123456"));
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[1].channel, ChannelKind::Chat);
        assert_eq!(actor, DEFAULT_ACTOR);
    }

    #[test]
    fn test_convert_pay_without_credentials_is_cash() {
        let mut r = record("pay", Some("100"));
        r.method = Some("cash".to_string());
        assert!(matches!(
            convert_csv_record(r).unwrap(),
            ReplayCommand::Pay { credential: Credential::Cash, .. }
        ));
    }

    #[test]
    fn test_convert_approve_with_due_date() {
        let mut r = record("approve", Some("10000"));
        r.due_date = Some("2026-11-01".to_string());
        let ReplayCommand::Approve {
            initial_payment,
            next_payment_date,
            ..
        } = convert_csv_record(r).unwrap()
        else {
            panic!("expected approve");
        };
        assert_eq!(initial_payment, Some(Amount::new(10_000)));
        assert_eq!(
            next_payment_date.map(|d| d.to_rfc3339()),
            Some("2026-11-01T00:00:00+00:00".to_string())
        );
    }

    #[rstest]
    #[case::unknown_type(record("refund", Some("1")), "Invalid row type")]
    #[case::open_without_amount(record("open", None), "requires an amount")]
    #[case::pay_without_method(record("pay", Some("1")), "requires a method")]
    #[case::decimal_amount(record("open", Some("10.5")), "Invalid amount")]
    #[case::record_without_reference(record("record", Some("1")), "requires a reference")]
    fn test_conversion_errors(#[case] input: CsvRecord, #[case] expected: &str) {
        let error = convert_csv_record(input).unwrap_err();
        assert!(error.contains(expected), "unexpected error: {}", error);
    }

    #[test]
    fn test_receipt_target_errors() {
        assert!(parse_receipt_targets("fax:123").is_err());
        assert!(parse_receipt_targets("sms").is_err());
        assert!(parse_receipt_targets("").unwrap().is_empty());
    }

    #[test]
    fn test_write_orders_csv_sorted() {
        let view = |order_id: OrderId| LedgerView {
            order_id,
            total_amount: Amount::new(50_000),
            amount_paid: Amount::new(20_000),
            balance_due: Amount::new(30_000),
            payment_status: PaymentStatus::PartiallyPaid,
            last_payment_date: None,
            next_payment_date: None,
            version: 2,
        };
        let mut output = Vec::new();
        write_orders_csv(&[view(2), view(1)], &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "order,total_amount,amount_paid,balance_due,payment_status,last_payment_date,next_payment_date"
        );
        assert_eq!(lines[1], "1,50000,20000,30000,partially_paid,,");
        assert!(lines[2].starts_with("2,"));
    }
}
