//! Receipt processor: parse, classify, archive, record, reply.
//!
//! Flow per message:
//! 1. Parse raw MIME (drop silently when there is no body)
//! 2. Classify with the LLM (stop silently when not a receipt)
//! 3. Start attachment uploads without waiting on them
//! 4. Record the ledger row (failures become part of the reply)
//! 5. Compose and send the reply
//! 6. Join the uploads, logging any that failed

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::channels::email::{ReplySender, SmtpReplySender};
use crate::channels::email_types::parse_email;
use crate::config::{AppConfig, BlobStoreConfig};
use crate::error::PipelineError;
use crate::llm::{ReceiptClassifier, create_classifier};
use crate::pipeline::reply::compose_reply;
use crate::pipeline::types::{
    Classification, CorrelationId, DropReason, LedgerOutcome, ProcessOutcome,
};
use crate::store::blob::{
    BlobStore, HttpBlobStore, LocalBlobStore, UploadHandle, archive_attachments,
};
use crate::store::ledger::{AirtableClient, LedgerRecorder};

/// Envelope delivered alongside the raw message by the receiving mechanism.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Runs one inbound message through the whole pipeline.
///
/// Holds no per-message state; `handle` can be called concurrently.
pub struct ReceiptProcessor {
    classifier: Arc<dyn ReceiptClassifier>,
    blobs: Arc<dyn BlobStore>,
    ledger: LedgerRecorder,
    replies: Arc<dyn ReplySender>,
    ledger_link_base: Option<String>,
}

impl ReceiptProcessor {
    pub fn new(
        classifier: Arc<dyn ReceiptClassifier>,
        blobs: Arc<dyn BlobStore>,
        ledger: LedgerRecorder,
        replies: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            classifier,
            blobs,
            ledger,
            replies,
            ledger_link_base: None,
        }
    }

    /// Link ledger records in replies as `{base}/{record_id}`.
    /// Wire the production classifier, blob store, ledger and SMTP sender.
    pub fn from_config(config: &AppConfig) -> crate::error::Result<Self> {
        let blobs: Arc<dyn BlobStore> = match config.blob_store {
            BlobStoreConfig::Http { ref url, ref token } => {
                Arc::new(HttpBlobStore::new(url, token.clone())?)
            }
            BlobStoreConfig::Local { ref root } => Arc::new(LocalBlobStore::new(root.clone())),
        };

        let ledger = LedgerRecorder::new(
            Arc::new(AirtableClient::new(config.airtable.clone())),
            config.uploads_base_url.clone(),
        );

        Ok(Self::new(
            create_classifier(&config.llm),
            blobs,
            ledger,
            Arc::new(SmtpReplySender::new(config.email.clone())),
        )
        .with_ledger_link_base(config.ledger_record_url_base.clone()))
    }

    pub fn with_ledger_link_base(mut self, base: Option<String>) -> Self {
        self.ledger_link_base = base;
        self
    }

    /// Handle a single raw message.
    pub async fn handle(
        &self,
        raw: &[u8],
        envelope: &Envelope,
        correlation_id: &CorrelationId,
    ) -> Result<ProcessOutcome, PipelineError> {
        let email = parse_email(raw, envelope.from.as_deref()).map_err(PipelineError::Email)?;

        info!(
            correlation_id = %correlation_id,
            sender = %email.sender,
            recipient = envelope.to.as_deref().unwrap_or("-"),
            attachments = email.attachments.len(),
            "Processing inbound email"
        );

        let Some(body) = email.body() else {
            info!(correlation_id = %correlation_id, "Email has no text or HTML body; dropping");
            return Ok(ProcessOutcome::Dropped {
                reason: DropReason::EmptyContent,
            });
        };

        let response = self.classifier.classify(body, &email.attachments).await?;
        let receipt = match response.into_classification()? {
            Classification::NotReceipt => {
                info!(correlation_id = %correlation_id, "Not a receipt; no reply sent");
                return Ok(ProcessOutcome::Dropped {
                    reason: DropReason::NotReceipt,
                });
            }
            Classification::Receipt(receipt) => receipt,
        };

        debug!(
            correlation_id = %correlation_id,
            model = self.classifier.model_name(),
            company = %receipt.company,
            date = %receipt.date,
            currency = %receipt.currency,
            items = receipt.line_items.len(),
            "Receipt extracted"
        );

        let uploads = archive_attachments(Arc::clone(&self.blobs), correlation_id, &email.attachments);

        let ledger = self
            .ledger
            .record_receipt(&receipt, correlation_id)
            .await
            .unwrap_or_else(|e| {
                error!(correlation_id = %correlation_id, error = %e, "Ledger recording failed");
                LedgerOutcome::failed(e.to_string())
            });

        let reply = compose_reply(&email, &receipt, &ledger, self.ledger_link_base.as_deref());
        let sent = self.replies.send(reply).await;

        let (archived, upload_failures) = join_uploads(correlation_id, uploads).await;

        sent.map_err(PipelineError::Reply)?;

        info!(
            correlation_id = %correlation_id,
            ledger = ledger.label(),
            archived = archived.len(),
            upload_failures = upload_failures.len(),
            "Receipt reply sent"
        );

        Ok(ProcessOutcome::Replied {
            correlation_id: correlation_id.clone(),
            ledger,
            archived,
            upload_failures,
        })
    }
}

/// Await every upload once. Failures are logged and collected, never raised.
async fn join_uploads(
    correlation_id: &CorrelationId,
    uploads: Vec<UploadHandle>,
) -> (Vec<String>, Vec<String>) {
    let mut archived = Vec::new();
    let mut failures = Vec::new();

    for result in join_all(uploads).await {
        match result {
            Ok(Ok(key)) => archived.push(key),
            Ok(Err(e)) => {
                warn!(correlation_id = %correlation_id, error = %e, "Attachment upload failed");
                failures.push(e.to_string());
            }
            Err(e) => {
                error!(correlation_id = %correlation_id, error = %e, "Attachment upload task panicked");
                failures.push(format!("upload task failed: {e}"));
            }
        }
    }

    (archived, failures)
}
