//! Shared stubs for integration tests (no real API calls).

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use receipt_relay::channels::{Attachment, ReplySender};
use receipt_relay::error::{ChannelError, LlmError, StoreError};
use receipt_relay::llm::ReceiptClassifier;
use receipt_relay::pipeline::reply::ReplyEmail;
use receipt_relay::pipeline::types::ClassificationResponse;
use receipt_relay::store::ledger::{
    ExchangeRateFields, ExchangeRateRecord, InsertResult, LedgerTable,
};

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw email with an HTML body and no attachments.
pub const HTML_RECEIPT: &str = "From: Acme Store <orders@acme.example>\r\n\
To: receipts@me.example\r\n\
Subject: Your Acme order\r\n\
Message-ID: <acme-1@acme.example>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Thanks for your purchase, Total: $42.00</p>\r\n";

/// Raw email with an HTML body and one PDF attachment.
pub const HTML_RECEIPT_WITH_PDF: &str = "From: Acme Store <orders@acme.example>\r\n\
Subject: Invoice\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Thanks for your purchase, Total: $42.00</p>\r\n\
--b\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--b--\r\n";

/// Attachment-only email; has no text or HTML body.
pub const NO_BODY: &str = "From: scanner@me.example\r\n\
Subject: scan\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"scan.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--b--\r\n";

/// The classifier answer for the Acme receipt.
pub fn acme_response(file_name: &str) -> ClassificationResponse {
    serde_json::from_value(json!({
        "isReceipt": true,
        "receipt": {
            "dateYYYYMMDD": "20240101",
            "nameOfCompany": "Acme",
            "totalAmount": "42.00",
            "currency": "USD",
            "category": "Equipment",
            "invoiceOrReceiptFullAttachmentFileName": file_name,
            "lineItems": [{"nameOfProduct": "Widget", "amount": "42.00", "quantity": 1}]
        }
    }))
    .unwrap()
}

/// Classifier that returns a fixed response, or an empty-response error.
pub struct StubClassifier {
    pub response: Option<ClassificationResponse>,
    pub calls: AtomicUsize,
}

impl StubClassifier {
    pub fn answering(response: ClassificationResponse) -> Self {
        Self {
            response: Some(response),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReceiptClassifier for StubClassifier {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn classify(
        &self,
        _body: &str,
        _attachments: &[Attachment],
    ) -> Result<ClassificationResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().ok_or_else(|| LlmError::EmptyResponse {
            provider: "stub".into(),
            reason: "empty message content".into(),
        })
    }
}

/// In-memory ledger table with one exchange rate for 2024-01-01.
#[derive(Default)]
pub struct StubTable {
    pub inserted: Mutex<Vec<Map<String, Value>>>,
}

#[async_trait]
impl LedgerTable for StubTable {
    async fn list_exchange_rates(&self) -> Result<Vec<ExchangeRateRecord>, StoreError> {
        Ok(vec![ExchangeRateRecord {
            id: "recRate20240101".into(),
            fields: ExchangeRateFields {
                date: "20240101".into(),
                jpy_per_usd: 141.0,
            },
        }])
    }

    async fn insert_row(&self, fields: Map<String, Value>) -> Result<InsertResult, StoreError> {
        self.inserted.lock().unwrap().push(fields);
        Ok(InsertResult::Created { id: "rec123".into() })
    }
}

/// Reply sender that records instead of sending.
#[derive(Default)]
pub struct RecordingReplies {
    pub sent: Mutex<Vec<ReplyEmail>>,
}

#[async_trait]
impl ReplySender for RecordingReplies {
    async fn send(&self, reply: ReplyEmail) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(reply);
        Ok(())
    }
}
