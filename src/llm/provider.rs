//! Classifier provider trait.

use async_trait::async_trait;

use crate::channels::email_types::Attachment;
use crate::error::LlmError;
use crate::pipeline::types::ClassificationResponse;

/// Decides whether an email is a receipt and extracts it.
///
/// Implementations return the schema-shaped response; the pipeline turns it
/// into a `Classification`. Output is not deterministic across calls.
#[async_trait]
pub trait ReceiptClassifier: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Classify an email body together with its attachments.
    async fn classify(
        &self,
        body: &str,
        attachments: &[Attachment],
    ) -> Result<ClassificationResponse, LlmError>;
}
