//! Broker seam.
//!
//! The consumer loop reads through [`MessageSource`] and the publisher writes
//! through [`MessageSink`]. [`kafka`] talks to a real cluster; [`memory`] is a
//! single-process broker for local runs and tests.

pub mod kafka;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::PipelineError;

pub use kafka::{KafkaSink, KafkaSource};
pub use memory::{InMemoryBroker, InMemorySource};

/// A message received from the broker, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    /// The message key as a string, if it is UTF-8.
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| std::str::from_utf8(k).ok())
    }
}

/// Ordered, committable message stream for one consumer group.
#[async_trait]
pub trait MessageSource: Send {
    /// Start receiving messages from `topic`, resuming after the group's last
    /// committed offset (or from the earliest retained message).
    async fn subscribe(&mut self, topic: &str) -> Result<(), PipelineError>;

    /// Wait up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived in time.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, PipelineError>;

    /// Record that `message` and everything before it in its partition is done.
    async fn commit(&mut self, message: &InboundMessage) -> Result<(), PipelineError>;

    /// Move the read position back so that `message` is delivered again.
    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), PipelineError>;

    /// Make every commit durable, then leave the group. Uncommitted
    /// messages are redelivered to the next member.
    async fn close(&mut self);
}

/// A rejected send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct SendError {
    /// Whether the same send may succeed if tried again.
    pub transient: bool,
    pub reason: String,
}

impl SendError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            transient: true,
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            transient: false,
            reason: reason.into(),
        }
    }
}

/// Keyed message producer. Messages with the same key keep their order.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one message and wait for the broker to acknowledge it.
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SendError>;

    /// Wait until every in-flight message is acknowledged or `timeout` passes.
    async fn flush(&self, timeout: Duration) -> Result<(), SendError>;
}
