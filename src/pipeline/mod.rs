//! Receipt processing pipeline.
//!
//! Every inbound message, whether from the webhook or the IMAP poller, flows through:
//! 1. `parse_email`: raw MIME to `InboundEmail`
//! 2. `ReceiptClassifier::classify`: receipt or not, with extracted fields
//! 3. Attachment archiving and ledger recording
//! 4. `compose_reply`: summary sent back to the sender

pub mod processor;
pub mod reply;
pub mod types;

pub use processor::{Envelope, ReceiptProcessor};
