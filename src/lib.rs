//! Receipt Relay: turns emailed receipts into ledger rows and summary replies.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
