//! Ledger recording: exchange-rate lookup plus one row per receipt in an
//! Airtable-style tabular store.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::pipeline::types::{CorrelationId, Currency, LedgerOutcome, Receipt};

/// Rows fetched from the exchange-rate table per lookup.
pub const RATE_LOOKUP_LIMIT: u32 = 100;

/// Ledger column names.
pub mod fields {
    pub const SHORT_DESCRIPTION: &str = "Short Description";
    pub const DATE: &str = "Date";
    pub const CATEGORY: &str = "Category";
    pub const NOTES: &str = "Notes";
    pub const RECEIPT: &str = "Receipt";
}

pub const UNKNOWN_CURRENCY_MESSAGE: &str = "Unknown currency; receipt was not recorded in the ledger";

/// One row of the exchange-rate table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExchangeRateRecord {
    pub id: String,
    pub fields: ExchangeRateFields,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExchangeRateFields {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "JPY per USD")]
    pub jpy_per_usd: f64,
}

/// Outcome of a ledger insert call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    Created { id: String },
    Rejected { status: u16, body: String },
}

/// The tabular store operations the recorder needs.
#[async_trait]
pub trait LedgerTable: Send + Sync {
    /// Most recent exchange-rate rows, newest first.
    async fn list_exchange_rates(&self) -> Result<Vec<ExchangeRateRecord>, StoreError>;

    /// Insert one ledger row with the given column values.
    async fn insert_row(&self, fields: Map<String, Value>) -> Result<InsertResult, StoreError>;
}

/// Columns written for one receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub description: String,
    pub rate_record_id: String,
    pub currency: Currency,
    pub amount: String,
    pub category: String,
    pub notes: String,
    pub receipt_url: String,
}

impl LedgerRow {
    /// Column map; the amount lands in the column named after the currency.
    pub fn to_fields(&self) -> Map<String, Value> {
        let amount = self
            .amount
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(self.amount.clone()));

        let mut map = Map::new();
        map.insert(fields::SHORT_DESCRIPTION.into(), json!(self.description));
        map.insert(fields::DATE.into(), json!([self.rate_record_id]));
        map.insert(self.currency.code().into(), amount);
        map.insert(fields::CATEGORY.into(), json!(self.category));
        map.insert(fields::NOTES.into(), json!(self.notes));
        map.insert(fields::RECEIPT.into(), json!([{ "url": self.receipt_url }]));
        map
    }
}

/// `{base}/{correlationId}/{fileName}` with the base's trailing slash removed.
pub fn receipt_url(uploads_base_url: &str, correlation_id: &CorrelationId, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        uploads_base_url.trim_end_matches('/'),
        correlation_id,
        file_name
    )
}

/// Records receipts in the ledger.
pub struct LedgerRecorder {
    table: Arc<dyn LedgerTable>,
    uploads_base_url: String,
}

impl LedgerRecorder {
    pub fn new(table: Arc<dyn LedgerTable>, uploads_base_url: impl Into<String>) -> Self {
        Self {
            table,
            uploads_base_url: uploads_base_url.into(),
        }
    }

    /// Look up the exchange rate for the receipt date and insert a ledger row.
    ///
    /// Known failure cases come back as `LedgerOutcome::Failed`; transport and
    /// decoding problems are returned as `Err` for the caller to fold in.
    pub async fn record_receipt(
        &self,
        receipt: &Receipt,
        correlation_id: &CorrelationId,
    ) -> Result<LedgerOutcome, StoreError> {
        if receipt.currency == Currency::Unknown {
            debug!(correlation_id = %correlation_id, "Skipping ledger: unknown currency");
            return Ok(LedgerOutcome::failed(UNKNOWN_CURRENCY_MESSAGE));
        }

        let rates = self.table.list_exchange_rates().await?;
        let Some(rate) = rates.iter().find(|r| r.fields.date == receipt.date) else {
            warn!(
                correlation_id = %correlation_id,
                date = %receipt.date,
                searched = rates.len(),
                "No exchange rate for receipt date"
            );
            return Ok(LedgerOutcome::failed(format!(
                "No exchange rate found for date {}",
                receipt.date
            )));
        };

        let row = LedgerRow {
            description: receipt.company.clone(),
            rate_record_id: rate.id.clone(),
            currency: receipt.currency,
            amount: receipt.total_amount.clone(),
            category: receipt.category.label().to_string(),
            notes: receipt
                .line_items
                .iter()
                .map(|item| item.name_of_product.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            receipt_url: receipt_url(
                &self.uploads_base_url,
                correlation_id,
                &receipt.attachment_file_name,
            ),
        };

        match self.table.insert_row(row.to_fields()).await? {
            InsertResult::Created { id } => {
                info!(correlation_id = %correlation_id, record_id = %id, "Ledger row created");
                Ok(LedgerOutcome::Recorded { record_id: id })
            }
            InsertResult::Rejected { status, body } => {
                warn!(
                    correlation_id = %correlation_id,
                    status,
                    body = %body,
                    "Ledger insert rejected"
                );
                Ok(LedgerOutcome::failed(format!(
                    "Failed to insert ledger record (HTTP {status})"
                )))
            }
        }
    }
}

// ── Airtable client ─────────────────────────────────────────────────

/// Configuration for the Airtable-backed ledger.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: SecretString,
    /// e.g. `https://api.airtable.com/v0/appXXXXXXXX`
    pub base_path: String,
    pub rates_table: String,
    pub ledger_table: String,
}

/// `LedgerTable` over the Airtable REST API.
pub struct AirtableClient {
    config: AirtableConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RecordList<T> {
    records: Vec<T>,
}

#[derive(Deserialize)]
struct CreatedRecord {
    id: String,
}

impl AirtableClient {
    pub fn new(config: AirtableConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> Result<reqwest::Url, StoreError> {
        let mut url = reqwest::Url::parse(&self.config.base_path).map_err(|e| StoreError::Request {
            store: "airtable".into(),
            reason: format!("invalid base path {}: {e}", self.config.base_path),
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Request {
                store: "airtable".into(),
                reason: format!("base path cannot hold a table: {}", self.config.base_path),
            })?
            .pop_if_empty()
            .push(table);
        Ok(url)
    }

    fn request_error(e: reqwest::Error) -> StoreError {
        StoreError::Request {
            store: "airtable".into(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl LedgerTable for AirtableClient {
    async fn list_exchange_rates(&self) -> Result<Vec<ExchangeRateRecord>, StoreError> {
        let url = self.table_url(&self.config.rates_table)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(self.config.api_key.expose_secret())
            .query(&[
                ("maxRecords", RATE_LOOKUP_LIMIT.to_string()),
                ("sort[0][field]", fields::DATE.to_string()),
                ("sort[0][direction]", "desc".to_string()),
            ])
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::request_error)?;
        if !status.is_success() {
            return Err(StoreError::Status {
                store: "airtable".into(),
                status: status.as_u16(),
                body,
            });
        }

        parse_rate_list(&body)
    }

    async fn insert_row(&self, fields: Map<String, Value>) -> Result<InsertResult, StoreError> {
        let url = self.table_url(&self.config.ledger_table)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&json!({ "records": [{ "fields": fields }] }))
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::request_error)?;
        if status != reqwest::StatusCode::OK {
            return Ok(InsertResult::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        parse_created_id(&body).map(|id| InsertResult::Created { id })
    }
}

pub(crate) fn parse_rate_list(body: &str) -> Result<Vec<ExchangeRateRecord>, StoreError> {
    serde_json::from_str::<RecordList<ExchangeRateRecord>>(body)
        .map(|list| list.records)
        .map_err(|e| StoreError::Schema {
            store: "airtable".into(),
            reason: format!("exchange rates: {e}"),
        })
}

pub(crate) fn parse_created_id(body: &str) -> Result<String, StoreError> {
    let list: RecordList<CreatedRecord> =
        serde_json::from_str(body).map_err(|e| StoreError::Schema {
            store: "airtable".into(),
            reason: format!("insert response: {e}"),
        })?;
    list.records
        .into_iter()
        .next()
        .map(|r| r.id)
        .ok_or_else(|| StoreError::Schema {
            store: "airtable".into(),
            reason: "insert response contained no records".into(),
        })
}
