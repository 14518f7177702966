//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::channels::email::EmailConfig;
use crate::channels::routes::DEFAULT_MAX_BODY_BYTES;
use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::store::ledger::AirtableConfig;

/// Variable source; `std::env::var` in production, a map in tests.
pub type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_RATES_TABLE: &str = "Exchange Rates";
const DEFAULT_LEDGER_TABLE: &str = "Expenses";
const DEFAULT_BLOB_DIR: &str = "./data/uploads";
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Where archived attachments go.
#[derive(Debug, Clone)]
pub enum BlobStoreConfig {
    /// `PUT {url}/{key}` with an optional bearer token.
    Http {
        url: String,
        token: Option<SecretString>,
    },
    /// Files under a local directory.
    Local { root: PathBuf },
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub airtable: AirtableConfig,
    /// Public base URL that archived attachments are served from.
    pub uploads_base_url: String,
    /// Prefix for ledger record links in replies.
    pub ledger_record_url_base: Option<String>,
    pub blob_store: BlobStoreConfig,
    pub email: EmailConfig,
    pub http_port: u16,
    /// Largest raw message the webhook accepts.
    pub max_body_bytes: usize,
    /// Directory for daily-rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let llm = LlmConfig {
            api_key: SecretString::from(required("OPENAI_API_KEY")?),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
            model: get("RECEIPT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
        };

        let airtable = AirtableConfig {
            api_key: SecretString::from(required("AIRTABLE_API_KEY")?),
            base_path: required("AIRTABLE_BASE_PATH")?,
            rates_table: get("AIRTABLE_RATES_TABLE").unwrap_or_else(|| DEFAULT_RATES_TABLE.into()),
            ledger_table: get("AIRTABLE_LEDGER_TABLE")
                .unwrap_or_else(|| DEFAULT_LEDGER_TABLE.into()),
        };

        let blob_store = match get("BLOB_STORE_URL") {
            Some(url) => BlobStoreConfig::Http {
                url,
                token: get("BLOB_STORE_TOKEN").map(SecretString::from),
            },
            None => BlobStoreConfig::Local {
                root: PathBuf::from(get("BLOB_STORE_DIR").unwrap_or_else(|| DEFAULT_BLOB_DIR.into())),
            },
        };

        let http_port = match get("RECEIPT_HTTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RECEIPT_HTTP_PORT".into(),
                message: format!("not a port number: {raw}"),
            })?,
            None => DEFAULT_HTTP_PORT,
        };

        let max_body_bytes = match get("RECEIPT_MAX_BODY_BYTES") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RECEIPT_MAX_BODY_BYTES".into(),
                message: format!("not a byte count: {raw}"),
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            llm,
            airtable,
            uploads_base_url: required("UPLOADS_BASE_URL")?,
            ledger_record_url_base: get("LEDGER_RECORD_URL_BASE"),
            blob_store,
            email: EmailConfig::from_lookup(&get)?,
            http_port,
            max_body_bytes,
            log_dir: get("RECEIPT_LOG_DIR").map(PathBuf::from),
        })
    }
}
