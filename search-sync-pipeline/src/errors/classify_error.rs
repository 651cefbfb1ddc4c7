//! Classification error types.

use search_sync_shared::ShapeError;
use thiserror::Error;

/// Reasons a broker message could not be turned into a change event.
///
/// Every variant is permanent: the same bytes will never classify, so the
/// consumer drops the message and commits its offset.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("message has no payload")]
    EmptyPayload,

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no id field")]
    MissingId,

    #[error("payload id is not a UUID: {0}")]
    InvalidId(String),

    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),

    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    #[error("payload matches no known event shape")]
    Unclassifiable,

    #[error("payload does not decode as a {kind} snapshot: {reason}")]
    Payload { kind: String, reason: String },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}
