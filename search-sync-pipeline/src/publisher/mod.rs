//! Event publisher.
//!
//! Serializes change events and sends them to the broker keyed by entity id,
//! so that all events of one entity land on the same partition in order.
//!
//! Publishing happens after the write-side transaction committed. A failure
//! here leaves the write side and the read model apart until the entity is
//! written again; it is logged as such and returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use search_sync_shared::ChangeEvent;

use crate::broker::MessageSink;
use crate::errors::PublishError;
use crate::wire;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-backoff retry policy for transient broker errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

pub struct EventPublisher {
    sink: Arc<dyn MessageSink>,
    retry: RetryPolicy,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn MessageSink>, retry: RetryPolicy) -> Self {
        Self { sink, retry }
    }

    /// Publish an event to `topic`, keyed by the entity id.
    pub async fn publish(&self, topic: &str, event: &ChangeEvent) -> Result<(), PublishError> {
        self.publish_keyed(topic, &event.id.to_string(), event).await
    }

    /// Publish an event under an explicit partition key.
    #[instrument(skip(self, event), fields(kind = %event.kind, operation = %event.operation(), id = %event.id))]
    pub async fn publish_keyed(
        &self,
        topic: &str,
        key: &str,
        event: &ChangeEvent,
    ) -> Result<(), PublishError> {
        let result = self.try_publish(topic, key, event).await;
        if let Err(e) = &result {
            error!(
                topic = %topic,
                entity_id = %event.id,
                error = %e,
                "Failed to publish change event; read model will miss this change until the entity is written again"
            );
        }
        result
    }

    async fn try_publish(
        &self,
        topic: &str,
        key: &str,
        event: &ChangeEvent,
    ) -> Result<(), PublishError> {
        event.validate()?;
        let payload = wire::encode(event)?;

        let mut attempt = 1;
        loop {
            match self.sink.send(topic, key, payload.as_bytes()).await {
                Ok(()) => {
                    debug!(topic = %topic, key = %key, attempt, "Change event published");
                    return Ok(());
                }
                Err(e) if !e.transient => return Err(PublishError::broker(e.reason)),
                Err(e) if attempt >= self.retry.max_attempts => {
                    return Err(PublishError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.reason,
                    });
                }
                Err(e) => {
                    warn!(
                        topic = %topic,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Transient publish failure, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Flush outstanding messages and release the producer.
    pub async fn close(self) -> Result<(), PublishError> {
        self.sink
            .flush(FLUSH_TIMEOUT)
            .await
            .map_err(|e| PublishError::FlushError(e.reason))
    }
}
