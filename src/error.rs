//! Error types for receipt-relay.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Inbound/outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Classifier (LLM provider) errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} returned no classification: {reason}")]
    EmptyResponse { provider: String, reason: String },

    #[error("Classification from {provider} does not match schema: {reason}")]
    SchemaMismatch { provider: String, reason: String },
}

/// Blob store and tabular store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request to {store} failed: {reason}")]
    Request { store: String, reason: String },

    #[error("{store} responded with HTTP {status}: {body}")]
    Status {
        store: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response shape from {store}: {reason}")]
    Schema { store: String, reason: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Email parsing failed: {0}")]
    Email(#[source] ChannelError),

    #[error("Classification failed: {0}")]
    Classifier(#[from] LlmError),

    #[error("Classifier reported a receipt but returned no receipt payload")]
    InconsistentClassification,

    #[error("Reply failed: {0}")]
    Reply(#[source] ChannelError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_lift_into_top_level() {
        fn classify() -> Result<()> {
            let failed: std::result::Result<(), PipelineError> =
                Err(PipelineError::from(LlmError::AuthFailed {
                    provider: "openai".into(),
                }));
            failed?;
            Ok(())
        }

        let err = classify().unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::Classifier(LlmError::AuthFailed { .. }))
        ));
        assert_eq!(
            err.to_string(),
            "Pipeline error: Classification failed: Authentication failed for provider openai"
        );
    }

    #[test]
    fn missing_variable_message_names_it() {
        let err: Error = ConfigError::MissingEnvVar("OPENAI_API_KEY".into()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required environment variable: OPENAI_API_KEY"
        );
    }
}
