//! Per-site storage: authoritative engine, replica store, channel front
//!
//! Each site owns:
//! - A primary SQLite store (catalog + loans), mutated only by the engine
//!   under a single site-wide mutex around each transaction
//! - A replica SQLite store with the identical schema, written only by the
//!   replica receiver applying the paired site's mutation events

pub mod engine;
pub mod replica;
pub mod schema;
pub mod service;

pub use engine::{Availability, CatalogItem, CommitReceipt, Loan, StorageEngine};
pub use replica::{ReplicaReceiver, ReplicaStore};
pub use service::{StorageClient, StorageJob, StorageReply, StorageRequest};
