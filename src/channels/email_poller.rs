//! IMAP poller: fetches unseen mail and hands each message to the processor.
//!
//! Messages are marked \Seen during fetch, so each one is processed at most
//! once. Self-sent and non-allowlisted mail is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::email::{EmailConfig, FetchedEmail, is_sender_allowed};
use crate::pipeline::processor::{Envelope, ReceiptProcessor};
use crate::pipeline::types::{CorrelationId, ProcessOutcome};

/// Spawn a background task that polls IMAP and processes new mail.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling.
pub fn spawn_email_poller(
    config: EmailConfig,
    processor: Arc<ReceiptProcessor>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Email poller started, polling every {}s on {}",
            config.poll_interval_secs,
            config.imap_host.as_deref().unwrap_or("-")
        );

        let mut tick = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Email poller shutting down");
                return;
            }

            poll_once(&config, &processor).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: fetch unseen → filter → process.
async fn poll_once(config: &EmailConfig, processor: &ReceiptProcessor) {
    let cfg = config.clone();
    let fetch_result =
        tokio::task::spawn_blocking(move || super::email::fetch_unseen_imap(&cfg)).await;

    let messages = match fetch_result {
        Ok(Ok(msgs)) => msgs,
        Ok(Err(e)) => {
            error!("Email poll failed: {e}");
            return;
        }
        Err(e) => {
            error!("Email poll task panicked: {e}");
            return;
        }
    };

    if messages.is_empty() {
        return;
    }

    debug!("Fetched {} unseen emails", messages.len());

    for message in messages {
        if !should_process(config, &message) {
            continue;
        }

        let correlation_id = CorrelationId::generate();
        let envelope = Envelope {
            from: Some(message.sender.clone()),
            to: Some(config.from_address.clone()),
        };

        match processor.handle(&message.raw, &envelope, &correlation_id).await {
            Ok(ProcessOutcome::Dropped { reason }) => {
                debug!(uid = %message.uid, correlation_id = %correlation_id, ?reason, "Email dropped");
            }
            Ok(outcome) => {
                info!(uid = %message.uid, correlation_id = %correlation_id, outcome = outcome.label(), "Email processed");
            }
            Err(e) => {
                error!(uid = %message.uid, correlation_id = %correlation_id, error = %e, "Email processing failed");
            }
        }
    }
}

/// Self-loop prevention plus the sender allowlist.
fn should_process(config: &EmailConfig, message: &FetchedEmail) -> bool {
    if message.sender.eq_ignore_ascii_case(&config.from_address) {
        debug!(sender = %message.sender, "Skipping self-sent email");
        return false;
    }

    if !is_sender_allowed(&config.allowed_senders, &message.sender) {
        warn!("Blocked email from {}", message.sender);
        return false;
    }

    true
}
