//! External storage: attachment blobs and the tabular ledger.

pub mod blob;
pub mod ledger;

pub use blob::{BlobStore, HttpBlobStore, LocalBlobStore};
pub use ledger::{AirtableClient, AirtableConfig, LedgerRecorder, LedgerTable};
