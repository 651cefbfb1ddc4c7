//! End-to-end behaviour of the sync pipeline over the in-memory broker and
//! document store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use search_sync_pipeline::broker::{InMemoryBroker, MessageSink};
use search_sync_pipeline::consumer::{ChangeEventHandler, ConsumerLoop, StreamConfig, StreamStats};
use search_sync_pipeline::publisher::{EventPublisher, RetryPolicy};
use search_sync_pipeline::reconcile::ReconcilerRegistry;
use search_sync_repository::{DocumentIndex, DocumentStore, InMemoryStore};
use search_sync_shared::{
    ChangeEvent, EntityKind, SearchQuery, TodoDocument, TodoSnapshot,
};

const TOPIC: &str = "todo-events";
const GROUP: &str = "todo-consumer-group";

struct Harness {
    store: Arc<InMemoryStore>,
    broker: InMemoryBroker,
    todos: DocumentIndex<TodoDocument>,
    publisher: EventPublisher,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let broker = InMemoryBroker::new();
        Self {
            todos: DocumentIndex::new(store.clone() as Arc<dyn DocumentStore>),
            publisher: EventPublisher::new(Arc::new(broker.clone()), RetryPolicy::no_retry()),
            store,
            broker,
        }
    }

    /// Start a consumer for the todo stream.
    fn consume(&self) -> (CancellationToken, tokio::task::JoinHandle<StreamStats>) {
        let registry = ReconcilerRegistry::standard(self.store.clone() as Arc<dyn DocumentStore>);
        let consumer = ConsumerLoop::new(
            StreamConfig::new("todos", TOPIC)
                .with_poll_timeout(Duration::from_millis(10))
                .with_redelivery_backoff(Duration::from_millis(20)),
            Box::new(self.broker.source(GROUP)),
            Arc::new(ChangeEventHandler::new(registry, EntityKind::Todo)),
        );
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { consumer.run(token).await.unwrap() });
        (cancel, handle)
    }

    async fn wait_for_commit(&self, offset: i64) {
        for _ in 0..400 {
            if self.broker.committed_offset(GROUP, TOPIC).await == Some(offset) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("offset {} was never committed", offset);
    }
}

#[tokio::test]
async fn test_buy_milk_is_indexed_then_removed() {
    let harness = Harness::new();
    let (cancel, handle) = harness.consume();
    let id = Uuid::new_v4();

    harness
        .publisher
        .publish(TOPIC, &ChangeEvent::created(id, TodoSnapshot::new("Buy milk"), Utc::now()))
        .await
        .unwrap();
    harness.wait_for_commit(1).await;

    let doc = harness.todos.get(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(doc.title, "Buy milk");

    harness
        .publisher
        .publish(TOPIC, &ChangeEvent::deleted(EntityKind::Todo, id))
        .await
        .unwrap();
    harness.wait_for_commit(2).await;

    assert!(harness.todos.get(&id.to_string()).await.unwrap().is_none());

    cancel.cancel();
    let stats = handle.await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(harness.broker.keys(TOPIC).await, vec![id.to_string(), id.to_string()]);
}

#[tokio::test]
async fn test_duplicate_delivery_yields_one_document() {
    let harness = Harness::new();
    let id = Uuid::new_v4();
    let event = ChangeEvent::created(
        id,
        TodoSnapshot::new("Buy milk").with_priority(1),
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    );
    harness.publisher.publish(TOPIC, &event).await.unwrap();
    harness.publisher.publish(TOPIC, &event).await.unwrap();

    let (cancel, handle) = harness.consume();
    harness.wait_for_commit(2).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(harness.store.document_count("todos").await, 1);
    let doc = harness.todos.get(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(doc.priority, 1);
}

#[tokio::test]
async fn test_update_after_create_wins_in_full() {
    let harness = Harness::new();
    let id = Uuid::new_v4();
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let updated_at = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();

    harness
        .publisher
        .publish(
            TOPIC,
            &ChangeEvent::created(
                id,
                TodoSnapshot::new("Buy milk").with_description("2 litres").with_priority(2),
                created_at,
            ),
        )
        .await
        .unwrap();
    harness
        .publisher
        .publish(
            TOPIC,
            &ChangeEvent::updated(id, TodoSnapshot::new("Buy oat milk").completed(true), updated_at),
        )
        .await
        .unwrap();

    let (cancel, handle) = harness.consume();
    harness.wait_for_commit(2).await;
    cancel.cancel();
    handle.await.unwrap();

    let doc = harness.todos.get(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(doc.title, "Buy oat milk");
    assert!(doc.is_completed);
    assert_eq!(doc.description, None);
    assert_eq!(doc.priority, 0);
    assert_eq!(doc.created_at, created_at);
    assert_eq!(doc.updated_at, Some(updated_at));
}

#[tokio::test]
async fn test_delete_of_unknown_entity_is_committed() {
    let harness = Harness::new();
    harness
        .publisher
        .publish(TOPIC, &ChangeEvent::deleted(EntityKind::Todo, Uuid::new_v4()))
        .await
        .unwrap();

    let (cancel, handle) = harness.consume();
    harness.wait_for_commit(1).await;
    cancel.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_legacy_untagged_messages_are_classified() {
    let harness = Harness::new();
    let created = Uuid::new_v4();
    let updated = Uuid::new_v4();
    let deleted = Uuid::new_v4();

    let messages = [
        format!(r#"{{"Id":"{}","Title":"Buy milk","CreatedAt":"2024-05-01T12:00:00Z"}}"#, created),
        format!(
            r#"{{"id":"{}","title":"Walk dog","createdAt":"2024-05-01T12:00:00Z","updatedAt":"2024-05-03T12:00:00Z"}}"#,
            updated
        ),
        format!(r#"{{"id":"{}"}}"#, deleted),
        r#"{"title":"no id at all"}"#.to_string(),
    ];
    for message in &messages {
        harness.broker.append(TOPIC, "legacy", message.as_bytes()).await;
    }

    let (cancel, handle) = harness.consume();
    harness.wait_for_commit(4).await;
    cancel.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.dropped, 1);
    let doc = harness.todos.get(&created.to_string()).await.unwrap().unwrap();
    assert_eq!(doc.title, "Buy milk");
    let doc = harness.todos.get(&updated.to_string()).await.unwrap().unwrap();
    assert!(doc.updated_at.is_some());
}

#[tokio::test]
async fn test_reconcile_failure_redelivers_same_message() {
    let harness = Harness::new();
    let id = Uuid::new_v4();
    harness.store.set_unavailable(true);
    harness
        .publisher
        .publish(TOPIC, &ChangeEvent::created(id, TodoSnapshot::new("Buy milk"), Utc::now()))
        .await
        .unwrap();

    let (cancel, handle) = harness.consume();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.broker.committed_offset(GROUP, TOPIC).await, None);

    harness.store.set_unavailable(false);
    harness.wait_for_commit(1).await;
    cancel.cancel();
    let stats = handle.await.unwrap();

    assert!(stats.failed >= 1);
    assert_eq!(stats.processed, 1);
    assert!(harness.todos.get(&id.to_string()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_restart_resumes_after_last_commit() {
    let harness = Harness::new();
    let first = Uuid::new_v4();
    harness
        .publisher
        .publish(TOPIC, &ChangeEvent::created(first, TodoSnapshot::new("one"), Utc::now()))
        .await
        .unwrap();

    let (cancel, handle) = harness.consume();
    harness.wait_for_commit(1).await;
    cancel.cancel();
    handle.await.unwrap();

    let second = Uuid::new_v4();
    harness
        .publisher
        .publish(TOPIC, &ChangeEvent::created(second, TodoSnapshot::new("two"), Utc::now()))
        .await
        .unwrap();

    let (cancel, handle) = harness.consume();
    harness.wait_for_commit(2).await;
    cancel.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(harness.store.document_count("todos").await, 2);
}

#[tokio::test]
async fn test_bulk_backfill_pages() {
    let harness = Harness::new();
    let documents: Vec<TodoDocument> = (0..100)
        .map(|i| {
            TodoDocument::new(
                Uuid::new_v4(),
                format!("task {}", i),
                Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
            )
        })
        .collect();

    let summary = harness.todos.bulk_upsert(&documents).await.unwrap();
    assert_eq!(summary.succeeded, 100);

    let page = harness
        .todos
        .search(&SearchQuery::match_all().page(1, 10))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total, 100);
    assert_eq!(page.items[0].title, "task 99");
}

#[tokio::test]
async fn test_publish_failure_reaches_caller() {
    let harness = Harness::new();
    harness.broker.fail_next_sends(1, false).await;

    let result = harness
        .publisher
        .publish(TOPIC, &ChangeEvent::deleted(EntityKind::Todo, Uuid::new_v4()))
        .await;

    assert!(result.is_err());
    assert!(harness.broker.messages(TOPIC).await.is_empty());
    assert!(harness.broker.send(TOPIC, "k", b"{}").await.is_ok());
}
