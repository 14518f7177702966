//! Mail I/O: MIME parsing, SMTP replies, the IMAP poller and the HTTP webhook.

pub mod email;
pub mod email_poller;
pub mod email_types;
pub mod routes;

pub use email::{EmailConfig, ReplySender, SmtpReplySender};
pub use email_types::{Attachment, InboundEmail};
pub use routes::{AppState, inbound_routes};
