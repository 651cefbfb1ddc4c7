//! Publish error types.

use search_sync_shared::ShapeError;
use thiserror::Error;

/// Errors returned to the write side when an event could not be published.
///
/// A publish failure happens after the write committed, so every one of these
/// leaves the search index behind the authoritative store until it is
/// re-synced.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event violates the change event shape rules.
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] ShapeError),

    /// The event could not be serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The broker rejected the message with a non-transient error.
    #[error("Broker error: {0}")]
    BrokerError(String),

    /// Every attempt failed with a transient error.
    #[error("Publish failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Pending messages could not be flushed at shutdown.
    #[error("Flush error: {0}")]
    FlushError(String),
}

impl PublishError {
    /// Create a broker error.
    pub fn broker(msg: impl Into<String>) -> Self {
        Self::BrokerError(msg.into())
    }

    /// Whether publishing the same event later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::FlushError(_))
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
