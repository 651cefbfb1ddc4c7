//! In-process broker.
//!
//! Each topic is a single-partition append-only log. Committed offsets are
//! tracked per consumer group, so a source created for a group resumes where
//! the last one for that group committed. Faults can be injected on both the
//! read and the write side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::broker::{InboundMessage, MessageSink, MessageSource, SendError};
use crate::errors::PipelineError;

#[derive(Debug, Clone)]
struct StoredMessage {
    key: Vec<u8>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Vec<StoredMessage>>,
    committed: HashMap<(String, String), i64>,
    transport_errors: HashMap<String, usize>,
    failing_sends: Option<(usize, bool)>,
}

/// Shared handle to an in-process broker. Clones see the same topics.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    arrivals: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source reading on behalf of `group_id`.
    pub fn source(&self, group_id: impl Into<String>) -> InMemorySource {
        InMemorySource {
            broker: self.clone(),
            group_id: group_id.into(),
            topic: None,
            position: 0,
        }
    }

    /// Append a raw message, bypassing any injected send failures.
    pub async fn append(&self, topic: &str, key: &str, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = self.state.lock().await;
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(StoredMessage {
                key: key.as_bytes().to_vec(),
                payload: payload.into(),
            });
            (log.len() - 1) as i64
        };
        self.arrivals.notify_waiters();
        offset
    }

    /// Payloads of every message in a topic, in offset order.
    pub async fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|log| log.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Keys of every message in a topic, in offset order.
    pub async fn keys(&self, topic: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|log| {
                log.iter()
                    .map(|m| String::from_utf8_lossy(&m.key).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Next offset the group will read from `topic`, if it ever committed.
    pub async fn committed_offset(&self, group_id: &str, topic: &str) -> Option<i64> {
        self.state
            .lock()
            .await
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }

    /// Make the next `count` polls on `topic` fail with a transport error.
    pub async fn inject_transport_errors(&self, topic: &str, count: usize) {
        self.state
            .lock()
            .await
            .transport_errors
            .insert(topic.to_string(), count);
    }

    /// Make the next `count` sends fail.
    pub async fn fail_next_sends(&self, count: usize, transient: bool) {
        self.state.lock().await.failing_sends = Some((count, transient));
    }
}

#[async_trait]
impl MessageSink for InMemoryBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SendError> {
        {
            let mut state = self.state.lock().await;
            if let Some((remaining, transient)) = state.failing_sends {
                if remaining > 0 {
                    state.failing_sends = Some((remaining - 1, transient));
                    return Err(SendError {
                        transient,
                        reason: "injected send failure".to_string(),
                    });
                }
                state.failing_sends = None;
            }
        }

        let offset = self.append(topic, key, payload).await;
        debug!(topic = %topic, key = %key, offset, "Message appended");
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), SendError> {
        Ok(())
    }
}

/// One consumer-group member of an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySource {
    broker: InMemoryBroker,
    group_id: String,
    topic: Option<String>,
    position: i64,
}

impl InMemorySource {
    fn take_message(&self, state: &mut BrokerState, topic: &str) -> Result<Option<InboundMessage>, PipelineError> {
        if let Some(remaining) = state.transport_errors.get_mut(topic) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PipelineError::kafka("injected transport error"));
            }
        }

        Ok(state
            .topics
            .get(topic)
            .and_then(|log| log.get(self.position as usize))
            .map(|stored| InboundMessage {
                topic: topic.to_string(),
                partition: 0,
                offset: self.position,
                key: Some(stored.key.clone()),
                payload: Some(stored.payload.clone()),
            }))
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn subscribe(&mut self, topic: &str) -> Result<(), PipelineError> {
        let committed = self
            .broker
            .state
            .lock()
            .await
            .committed
            .get(&(self.group_id.clone(), topic.to_string()))
            .copied();

        self.position = committed.unwrap_or(0);
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, PipelineError> {
        let topic = self
            .topic
            .clone()
            .ok_or_else(|| PipelineError::kafka("poll before subscribe"))?;

        let arrived = self.broker.arrivals.notified();
        tokio::pin!(arrived);
        // Register interest before looking, so an append in between is not missed.
        arrived.as_mut().enable();

        {
            let mut state = self.broker.state.lock().await;
            if let Some(message) = self.take_message(&mut state, &topic)? {
                self.position += 1;
                return Ok(Some(message));
            }
        }

        if tokio::time::timeout(timeout, arrived).await.is_err() {
            return Ok(None);
        }

        let mut state = self.broker.state.lock().await;
        let message = self.take_message(&mut state, &topic)?;
        if message.is_some() {
            self.position += 1;
        }
        Ok(message)
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), PipelineError> {
        self.broker
            .state
            .lock()
            .await
            .committed
            .insert((self.group_id.clone(), message.topic.clone()), message.offset + 1);
        Ok(())
    }

    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), PipelineError> {
        self.position = message.offset;
        Ok(())
    }

    async fn close(&mut self) {
        self.topic = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_commit_and_resume() {
        let broker = InMemoryBroker::new();
        broker.send("todo-events", "a", b"one").await.unwrap();
        broker.send("todo-events", "b", b"two").await.unwrap();

        let mut source = broker.source("group");
        source.subscribe("todo-events").await.unwrap();
        let first = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(first.key_str(), Some("a"));
        source.commit(&first).await.unwrap();
        source.close().await;

        let mut resumed = broker.source("group");
        resumed.subscribe("todo-events").await.unwrap();
        let next = resumed.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(next.offset, 1);
        assert_eq!(next.payload.as_deref(), Some(&b"two"[..]));
        assert_eq!(broker.committed_offset("group", "todo-events").await, Some(1));
    }

    #[tokio::test]
    async fn test_rewind_redelivers() {
        let broker = InMemoryBroker::new();
        broker.send("t", "k", b"x").await.unwrap();

        let mut source = broker.source("g");
        source.subscribe("t").await.unwrap();
        let message = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(source.poll(Duration::from_millis(10)).await.unwrap().is_none());

        source.rewind(&message).await.unwrap();
        let again = source.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again, message);
    }

    #[tokio::test]
    async fn test_poll_wakes_on_append() {
        let broker = InMemoryBroker::new();
        let mut source = broker.source("g");
        source.subscribe("t").await.unwrap();

        let producer = broker.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.send("t", "k", b"late").await.unwrap();
        });

        let message = source.poll(Duration::from_secs(5)).await.unwrap();
        assert_eq!(message.unwrap().payload.as_deref(), Some(&b"late"[..]));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let broker = InMemoryBroker::new();
        broker.fail_next_sends(1, true).await;
        let err = broker.send("t", "k", b"x").await.unwrap_err();
        assert!(err.transient);
        assert!(broker.send("t", "k", b"x").await.is_ok());

        broker.inject_transport_errors("t", 1).await;
        let mut source = broker.source("g");
        source.subscribe("t").await.unwrap();
        assert!(source.poll(Duration::from_millis(10)).await.is_err());
        assert!(source.poll(Duration::from_millis(10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let broker = InMemoryBroker::new();
        broker.send("t", "k", b"x").await.unwrap();

        let mut first = broker.source("one");
        first.subscribe("t").await.unwrap();
        let message = first.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        first.commit(&message).await.unwrap();

        let mut second = broker.source("two");
        second.subscribe("t").await.unwrap();
        assert_eq!(
            second.poll(Duration::from_millis(10)).await.unwrap().unwrap().offset,
            0
        );
    }
}
