//! # Search Sync Repository
//!
//! The document store the read side is kept in. This crate provides the
//! [`DocumentStore`] contract, an OpenSearch implementation, an in-memory
//! implementation and [`DocumentIndex`], a typed client bound to one index.

pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod types;

pub use client::DocumentIndex;
pub use config::{DocumentIndexConfig, DEFAULT_MAX_BATCH_SIZE};
pub use errors::SearchError;
pub use interfaces::DocumentStore;
pub use memory::InMemoryStore;
pub use opensearch::{BasicAuth, OpenSearchStore};
pub use types::{BatchOperationResult, BatchOperationSummary, IndexStatus};
