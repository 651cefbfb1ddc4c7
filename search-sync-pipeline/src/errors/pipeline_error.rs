//! Pipeline error types.

use search_sync_repository::SearchError;
use search_sync_shared::{EntityKind, Operation};
use thiserror::Error;

use crate::errors::{ClassifyError, PublishError};

/// Errors that can occur in the search sync pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Kafka or other broker transport error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// A message could not be turned into a change event.
    #[error("Classification error: {0}")]
    ClassificationError(#[from] ClassifyError),

    /// Applying an event to the document store failed.
    #[error("Reconciliation error: {0}")]
    ReconciliationError(#[from] SearchError),

    /// An event could not be projected onto its document.
    #[error("Projection error: {0}")]
    ProjectionError(String),

    /// No routine is registered for the event's kind and operation.
    #[error("No reconciliation routine for {kind} {operation}")]
    NoRoutine { kind: EntityKind, operation: Operation },

    /// Publishing an event failed.
    #[error("Publish error: {0}")]
    PublishError(#[from] PublishError),
}

impl PipelineError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a projection error.
    pub fn projection(msg: impl Into<String>) -> Self {
        Self::ProjectionError(msg.into())
    }

    /// Whether the failed operation may succeed if tried again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::KafkaError(_) => true,
            Self::ReconciliationError(e) => e.is_transient(),
            Self::PublishError(e) => e.is_transient(),
            Self::ClassificationError(_)
            | Self::ProjectionError(_)
            | Self::NoRoutine { .. } => false,
        }
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_follows_source() {
        assert!(PipelineError::kafka("broker down").is_transient());
        assert!(PipelineError::from(SearchError::connection("refused")).is_transient());
        assert!(!PipelineError::from(SearchError::invalid_query("bad")).is_transient());
        assert!(!PipelineError::from(ClassifyError::NotAnObject).is_transient());
        assert!(!PipelineError::NoRoutine {
            kind: EntityKind::Todo,
            operation: Operation::Deleted
        }
        .is_transient());
    }

    #[test]
    fn test_no_routine_message() {
        let err = PipelineError::NoRoutine {
            kind: EntityKind::Product,
            operation: Operation::Updated,
        };
        assert_eq!(err.to_string(), "No reconciliation routine for product updated");
    }
}
