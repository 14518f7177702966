//! Shared types for the receipt pipeline.

use std::fmt;

use chrono::Utc;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ── Correlation id ──────────────────────────────────────────────────

/// Per-message identifier: `{unix-millis}-{random suffix}`.
///
/// Generated once by the entry point and threaded explicitly through the
/// pipeline. Namespaces archived attachments and the receipt URL stored in
/// the ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh id from the current time and an 8-char random suffix.
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(format!("{}-{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Receipt ─────────────────────────────────────────────────────────

/// Currency detected on a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "JPY")]
    Jpy,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Currency {
    /// Wire code, also the ledger column the amount is written to.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Jpy => "JPY",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Expense category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Travel,
    Equipment,
    Services,
    #[serde(rename = "SAAS")]
    Saas,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Travel => "Travel",
            Self::Equipment => "Equipment",
            Self::Services => "Services",
            Self::Saas => "SAAS",
        }
    }
}

/// One purchased line on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LineItem {
    pub name_of_product: String,
    /// Decimal amount as extracted (string, not re-formatted).
    pub amount: String,
    pub quantity: i64,
}

impl LineItem {
    /// `amount * quantity` rounded to cents, half away from zero.
    /// `None` when the amount is not a decimal number.
    pub fn line_total(&self) -> Option<Decimal> {
        let amount = self.amount.trim().parse::<Decimal>().ok()?;
        amount
            .checked_mul(Decimal::from(self.quantity))
            .map(|total| total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

/// Structured extraction of a purchase transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Receipt {
    /// `YYYYMMDD`, compared verbatim against exchange-rate dates.
    #[serde(rename = "dateYYYYMMDD")]
    pub date: String,
    #[serde(rename = "nameOfCompany")]
    pub company: String,
    #[serde(rename = "totalAmount")]
    pub total_amount: String,
    pub currency: Currency,
    #[serde(rename = "invoiceOrReceiptFullAttachmentFileName")]
    pub attachment_file_name: String,
    pub category: Category,
    #[serde(rename = "lineItems")]
    pub line_items: Vec<LineItem>,
}

// ── Classification ──────────────────────────────────────────────────

/// Classifier output exactly as declared by the response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationResponse {
    #[serde(rename = "isReceipt")]
    pub is_receipt: bool,
    #[serde(default)]
    pub receipt: Option<Receipt>,
}

/// Typed classification the pipeline branches on.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    NotReceipt,
    Receipt(Receipt),
}

impl ClassificationResponse {
    /// `is_receipt` is authoritative: a payload alongside `false` is discarded,
    /// while `true` without a payload is a contract violation.
    pub fn into_classification(self) -> Result<Classification, PipelineError> {
        match (self.is_receipt, self.receipt) {
            (false, _) => Ok(Classification::NotReceipt),
            (true, Some(receipt)) => Ok(Classification::Receipt(receipt)),
            (true, None) => Err(PipelineError::InconsistentClassification),
        }
    }
}

// ── Ledger outcome ──────────────────────────────────────────────────

/// Result of recording a receipt in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Recorded { record_id: String },
    Failed { error: String },
}

impl LedgerOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Recorded { .. } => "recorded",
            Self::Failed { .. } => "failed",
        }
    }
}

// ── Process outcome ─────────────────────────────────────────────────

/// Why a message produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Neither a text nor an HTML body.
    EmptyContent,
    /// Classifier said it is not a receipt.
    NotReceipt,
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Dropped {
        reason: DropReason,
    },
    Replied {
        correlation_id: CorrelationId,
        ledger: LedgerOutcome,
        /// Blob keys that were stored.
        archived: Vec<String>,
        /// One message per failed upload.
        upload_failures: Vec<String>,
    },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dropped { .. } => "dropped",
            Self::Replied { .. } => "replied",
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn sample_receipt_json() -> serde_json::Value {
        serde_json::json!({
            "dateYYYYMMDD": "20240101",
            "nameOfCompany": "Acme",
            "totalAmount": "42.00",
            "currency": "USD",
            "category": "Equipment",
            "invoiceOrReceiptFullAttachmentFileName": "",
            "lineItems": [{"nameOfProduct": "Widget", "amount": "42.00", "quantity": 1}]
        })
    }

    #[test]
    fn receipt_deserializes_from_wire_names() {
        let receipt: Receipt = serde_json::from_value(sample_receipt_json()).unwrap();
        assert_eq!(receipt.date, "20240101");
        assert_eq!(receipt.company, "Acme");
        assert_eq!(receipt.currency, Currency::Usd);
        assert_eq!(receipt.category, Category::Equipment);
        assert_eq!(receipt.line_items[0].name_of_product, "Widget");
        assert_eq!(receipt.line_items[0].quantity, 1);
    }

    #[test]
    fn receipt_rejects_unknown_enum_values() {
        let mut json = sample_receipt_json();
        json["currency"] = "EUR".into();
        assert!(serde_json::from_value::<Receipt>(json).is_err());

        let mut json = sample_receipt_json();
        json["category"] = "Food".into();
        assert!(serde_json::from_value::<Receipt>(json).is_err());
    }

    #[test]
    fn saas_and_unknown_use_wire_spelling() {
        assert_eq!(serde_json::to_value(Category::Saas).unwrap(), "SAAS");
        assert_eq!(serde_json::to_value(Currency::Unknown).unwrap(), "unknown");
        assert_eq!(Currency::Jpy.code(), "JPY");
    }

    #[test]
    fn not_receipt_is_authoritative_over_spurious_payload() {
        let response = ClassificationResponse {
            is_receipt: false,
            receipt: Some(serde_json::from_value(sample_receipt_json()).unwrap()),
        };
        assert_eq!(
            response.into_classification().unwrap(),
            Classification::NotReceipt
        );
    }

    #[test]
    fn receipt_flag_without_payload_is_inconsistent() {
        let response = ClassificationResponse {
            is_receipt: true,
            receipt: None,
        };
        assert!(matches!(
            response.into_classification(),
            Err(PipelineError::InconsistentClassification)
        ));
    }

    #[test]
    fn receipt_flag_with_payload_yields_receipt() {
        let json = serde_json::json!({"isReceipt": true, "receipt": sample_receipt_json()});
        let response: ClassificationResponse = serde_json::from_value(json).unwrap();
        match response.into_classification().unwrap() {
            Classification::Receipt(r) => assert_eq!(r.total_amount, "42.00"),
            Classification::NotReceipt => panic!("expected receipt"),
        }
    }

    #[test]
    fn null_receipt_deserializes_as_none() {
        let response: ClassificationResponse =
            serde_json::from_str(r#"{"isReceipt": false, "receipt": null}"#).unwrap();
        assert!(response.receipt.is_none());
    }

    #[test]
    fn line_total_multiplies_amount_by_quantity() {
        let item = LineItem {
            name_of_product: "Cable".into(),
            amount: "2.50".into(),
            quantity: 3,
        };
        assert_eq!(item.line_total(), Some(dec!(7.50)));

        let bad = LineItem {
            name_of_product: "Mystery".into(),
            amount: "n/a".into(),
            quantity: 2,
        };
        assert!(bad.line_total().is_none());
    }

    #[test]
    fn line_total_rounds_half_cents_up() {
        for (amount, quantity, expected) in [
            ("3.125", 1, dec!(3.13)),
            ("0.125", 1, dec!(0.13)),
            ("0.625", 1, dec!(0.63)),
            ("1.0025", 5, dec!(5.01)),
            ("-3.125", 1, dec!(-3.13)),
        ] {
            let item = LineItem {
                name_of_product: "Tie".into(),
                amount: amount.into(),
                quantity,
            };
            assert_eq!(item.line_total(), Some(expected), "{amount} x {quantity}");
        }
    }

    #[test]
    fn correlation_id_shape() {
        let id = CorrelationId::generate();
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 8);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert_ne!(id, CorrelationId::generate());
    }

    #[test]
    fn ledger_outcome_serialization_is_tagged() {
        let json = serde_json::to_value(LedgerOutcome::Recorded {
            record_id: "rec1".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "recorded");
        assert_eq!(json["record_id"], "rec1");
        assert_eq!(LedgerOutcome::failed("boom").label(), "failed");
    }
}
