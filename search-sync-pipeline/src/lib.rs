//! # Search Sync Pipeline
//!
//! This crate keeps the search index in line with the write side by moving
//! change events through a broker and applying them to the document store.
//!
//! ## Architecture
//!
//! 1. **Publisher**: serializes a change event and hands it to the broker
//! 2. **Consumer**: polls one topic, classifies each message and commits its
//!    offset only after the message was handled
//! 3. **Reconcile**: one routine per entity kind and operation, applying an
//!    event to the document store idempotently
//! 4. **Bootstrap**: makes sure every index exists before consumption starts
//! 5. **Orchestrator**: runs one consumer loop per stream until shutdown
//!
//! The broker is reached through the [`broker::MessageSource`] and
//! [`broker::MessageSink`] traits, with Kafka and in-memory implementations.

pub mod backfill;
pub mod bootstrap;
pub mod broker;
pub mod consumer;
pub mod errors;
pub mod orchestrator;
pub mod publisher;
pub mod reconcile;
pub mod wire;

pub use errors::{ClassifyError, PipelineError, PublishError};
