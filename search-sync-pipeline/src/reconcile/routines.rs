//! Upsert and delete routines over a typed document index.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use search_sync_repository::DocumentIndex;
use search_sync_shared::{
    ChangeEvent, EntitySnapshot, IndexedDocument, ProductDocument, TodoDocument,
};

use crate::errors::PipelineError;
use crate::reconcile::projection::{project_product_snapshot, project_todo_snapshot};
use crate::reconcile::Reconciler;

type ProjectFn<T> = fn(Option<&T>, Uuid, &EntitySnapshot) -> Result<T, PipelineError>;

/// Writes the projected document for Created and Updated events.
pub struct UpsertRoutine<T: IndexedDocument> {
    index: DocumentIndex<T>,
    project: ProjectFn<T>,
}

impl<T: IndexedDocument> UpsertRoutine<T> {
    pub fn new(index: DocumentIndex<T>, project: ProjectFn<T>) -> Self {
        Self { index, project }
    }
}

impl UpsertRoutine<TodoDocument> {
    pub fn todos(index: DocumentIndex<TodoDocument>) -> Self {
        Self::new(index, project_todo_snapshot)
    }
}

impl UpsertRoutine<ProductDocument> {
    pub fn products(index: DocumentIndex<ProductDocument>) -> Self {
        Self::new(index, project_product_snapshot)
    }
}

#[async_trait]
impl<T: IndexedDocument> Reconciler for UpsertRoutine<T> {
    async fn reconcile(&self, event: &ChangeEvent) -> Result<(), PipelineError> {
        let snapshot = event.snapshot().ok_or_else(|| {
            PipelineError::projection(format!("{} event for {} has no snapshot", event.operation(), event.id))
        })?;

        // The current document only matters when the snapshot lacks a creation time.
        let current = match snapshot.created_at() {
            Some(_) => None,
            None => self.index.get(&event.id.to_string()).await?,
        };

        let document = (self.project)(current.as_ref(), event.id, snapshot)?;
        self.index.upsert(&document).await?;

        debug!(
            index = %self.index.name(),
            doc_id = %event.id,
            operation = %event.operation(),
            "Document reconciled"
        );
        Ok(())
    }
}

/// Removes the document for Deleted events.
pub struct DeleteRoutine<T: IndexedDocument> {
    index: DocumentIndex<T>,
}

impl<T: IndexedDocument> DeleteRoutine<T> {
    pub fn new(index: DocumentIndex<T>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl<T: IndexedDocument> Reconciler for DeleteRoutine<T> {
    async fn reconcile(&self, event: &ChangeEvent) -> Result<(), PipelineError> {
        self.index.delete(&event.id.to_string()).await?;

        debug!(index = %self.index.name(), doc_id = %event.id, "Document removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use search_sync_repository::{DocumentStore, InMemoryStore, SearchError};
    use search_sync_shared::TodoSnapshot;
    use std::sync::Arc;

    fn todo_index(store: &Arc<InMemoryStore>) -> DocumentIndex<TodoDocument> {
        DocumentIndex::new(store.clone() as Arc<dyn DocumentStore>)
    }

    #[tokio::test]
    async fn test_created_twice_yields_one_identical_document() {
        let store = Arc::new(InMemoryStore::new());
        let index = todo_index(&store);
        let routine = UpsertRoutine::todos(index.clone());
        let id = Uuid::new_v4();
        let event = ChangeEvent::created(
            id,
            TodoSnapshot::new("Buy milk"),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        );

        routine.reconcile(&event).await.unwrap();
        let once = index.get(&id.to_string()).await.unwrap();
        routine.reconcile(&event).await.unwrap();
        let twice = index.get(&id.to_string()).await.unwrap();

        assert!(once.is_some());
        assert_eq!(once, twice);
        assert_eq!(store.document_count("todos").await, 1);
    }

    #[tokio::test]
    async fn test_update_without_creation_time_keeps_existing_one() {
        let store = Arc::new(InMemoryStore::new());
        let index = todo_index(&store);
        let routine = UpsertRoutine::todos(index.clone());
        let id = Uuid::new_v4();
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let updated_at = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();

        routine
            .reconcile(&ChangeEvent::created(id, TodoSnapshot::new("Buy milk"), created_at))
            .await
            .unwrap();
        routine
            .reconcile(&ChangeEvent::updated(id, TodoSnapshot::new("Buy oat milk"), updated_at))
            .await
            .unwrap();

        let doc = index.get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(doc.title, "Buy oat milk");
        assert_eq!(doc.created_at, created_at);
        assert_eq!(doc.updated_at, Some(updated_at));
    }

    #[tokio::test]
    async fn test_delete_absent_document_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let routine = DeleteRoutine::new(todo_index(&store));

        let event = ChangeEvent::deleted(TodoDocument::KIND, Uuid::new_v4());

        assert!(routine.reconcile(&event).await.is_ok());
        assert!(routine.reconcile(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(InMemoryStore::new());
        let routine = UpsertRoutine::todos(todo_index(&store));
        store.set_unavailable(true);

        let event = ChangeEvent::created(Uuid::new_v4(), TodoSnapshot::new("x"), Utc::now());
        let result = routine.reconcile(&event).await;

        assert!(matches!(
            result,
            Err(PipelineError::ReconciliationError(SearchError::ConnectionError(_)))
        ));
    }

    #[tokio::test]
    async fn test_upsert_rejects_deleted_event() {
        let store = Arc::new(InMemoryStore::new());
        let routine = UpsertRoutine::todos(todo_index(&store));

        let event = ChangeEvent::deleted(TodoDocument::KIND, Uuid::new_v4());

        assert!(matches!(
            routine.reconcile(&event).await,
            Err(PipelineError::ProjectionError(_))
        ));
    }
}
