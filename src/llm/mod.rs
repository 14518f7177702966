//! Receipt classification via a language model.
//!
//! The pipeline only sees the `ReceiptClassifier` trait. The shipped backend
//! talks to an OpenAI-compatible `/chat/completions` endpoint and asks for
//! strict structured output (see `schema`).

pub mod openai;
pub mod provider;
pub mod schema;

pub use openai::OpenAiClassifier;
pub use provider::ReceiptClassifier;

use std::sync::Arc;

/// Configuration for creating a classifier.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
}

/// Create a classifier from configuration.
pub fn create_classifier(config: &LlmConfig) -> Arc<dyn ReceiptClassifier> {
    tracing::info!("Using OpenAI classifier (model: {})", config.model);
    Arc::new(OpenAiClassifier::new(
        config.api_key.clone(),
        &config.base_url,
        &config.model,
    ))
}
