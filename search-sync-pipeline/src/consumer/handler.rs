//! Per-message handlers run by the consumer loop.

use async_trait::async_trait;
use tracing::{debug, warn};

use search_sync_shared::EntityKind;

use crate::broker::InboundMessage;
use crate::consumer::classify::classify;
use crate::errors::PipelineError;
use crate::reconcile::ReconcilerRegistry;

/// Outcome of a handled message. Both outcomes commit the offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Processed,
    /// The message can never be applied and is skipped.
    Dropped(String),
}

/// Handles one message. An `Err` leaves the offset uncommitted so the message
/// is delivered again.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> Result<Disposition, PipelineError>;
}

/// Classifies domain change events and runs their reconciliation routine.
pub struct ChangeEventHandler {
    registry: ReconcilerRegistry,
    default_kind: EntityKind,
}

impl ChangeEventHandler {
    /// `default_kind` is the entity kind of messages that do not name one.
    pub fn new(registry: ReconcilerRegistry, default_kind: EntityKind) -> Self {
        Self {
            registry,
            default_kind,
        }
    }
}

#[async_trait]
impl MessageHandler for ChangeEventHandler {
    async fn handle(&self, message: &InboundMessage) -> Result<Disposition, PipelineError> {
        let classified = match classify(message.payload.as_deref(), self.default_kind) {
            Ok(classified) => classified,
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Dropping unclassifiable message"
                );
                return Ok(Disposition::Dropped(e.to_string()));
            }
        };

        let event = classified.event;
        debug!(
            offset = message.offset,
            kind = %event.kind,
            operation = %event.operation(),
            id = %event.id,
            by = ?classified.by,
            "Message classified"
        );

        match self.registry.dispatch(&event).await {
            Ok(()) => Ok(Disposition::Processed),
            Err(e @ PipelineError::NoRoutine { .. }) => {
                warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %e,
                    "Dropping event without a routine"
                );
                Ok(Disposition::Dropped(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Receives change-data-capture messages from the write-side store.
///
/// Nothing is reconciled from this stream yet; every message is logged and
/// committed.
// TODO: project CDC row images into the todo index once their format is agreed with the write side.
#[derive(Debug, Default)]
pub struct CdcHandler;

#[async_trait]
impl MessageHandler for CdcHandler {
    async fn handle(&self, message: &InboundMessage) -> Result<Disposition, PipelineError> {
        warn!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            bytes = message.payload.as_ref().map_or(0, Vec::len),
            "CDC message received but not reconciled"
        );
        Ok(Disposition::Processed)
    }
}
