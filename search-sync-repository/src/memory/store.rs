//! In-memory document store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::SearchError;
use crate::interfaces::DocumentStore;
use crate::memory::matching;
use crate::types::{BatchOperationResult, BatchOperationSummary};
use search_sync_shared::{SearchPage, SearchQuery};

#[derive(Debug, Default)]
struct MemoryIndex {
    settings: Value,
    documents: BTreeMap<String, Value>,
}

/// A [`DocumentStore`] held entirely in process memory.
///
/// Used for local runs without a search cluster and as the store behind the
/// pipeline tests. Writes to a missing index create it implicitly, like
/// OpenSearch's dynamic index creation. The store can be switched to
/// unavailable to simulate a backend outage.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a connection error until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of documents in an index; zero if it does not exist.
    pub async fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(|idx| idx.documents.len())
            .unwrap_or(0)
    }

    /// Settings the index was created with.
    pub async fn index_settings(&self, index: &str) -> Option<Value> {
        self.indices
            .read()
            .await
            .get(index)
            .map(|idx| idx.settings.clone())
    }

    fn check_available(&self) -> Result<(), SearchError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::connection("in-memory store is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        self.check_available()?;
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        self.check_available()?;
        let mut indices = self.indices.write().await;
        if !indices.contains_key(index) {
            indices.insert(
                index.to_string(),
                MemoryIndex {
                    settings: settings.clone(),
                    documents: BTreeMap::new(),
                },
            );
            info!(index = %index, "Index created");
        }
        Ok(())
    }

    async fn upsert_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), SearchError> {
        self.check_available()?;
        if !document.is_object() {
            return Err(SearchError::index(format!(
                "document {} is not a JSON object",
                id
            )));
        }
        self.indices
            .write()
            .await
            .entry(index.to_string())
            .or_default()
            .documents
            .insert(id.to_string(), document.clone());

        debug!(index = %index, doc_id = %id, "Document upserted");
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[(String, Value)],
    ) -> Result<BatchOperationSummary, SearchError> {
        self.check_available()?;
        let mut indices = self.indices.write().await;
        let target = indices.entry(index.to_string()).or_default();

        let results = documents
            .iter()
            .map(|(id, document)| {
                if document.is_object() {
                    target.documents.insert(id.clone(), document.clone());
                    BatchOperationResult::ok(id.clone())
                } else {
                    BatchOperationResult::failed(id.clone(), "document is not a JSON object")
                }
            })
            .collect();

        Ok(BatchOperationSummary::from_results(results))
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        self.check_available()?;
        if let Some(idx) = self.indices.write().await.get_mut(index) {
            idx.documents.remove(id);
        }
        debug!(index = %index, doc_id = %id, "Document deleted");
        Ok(())
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, SearchError> {
        self.check_available()?;
        Ok(self
            .indices
            .read()
            .await
            .get(index)
            .and_then(|idx| idx.documents.get(id).cloned()))
    }

    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
        text_fields: &[(&str, f32)],
    ) -> Result<SearchPage<Value>, SearchError> {
        self.check_available()?;
        query.validate()?;

        let indices = self.indices.read().await;
        let idx = indices
            .get(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;

        let mut scored: Vec<(f32, &Value)> = idx
            .documents
            .values()
            .filter_map(|doc| matching::score(doc, &query.mode, text_fields).map(|s| (s, doc)))
            .collect();
        scored.sort_by(matching::compare);

        let total = scored.len() as u64;
        let items = scored
            .into_iter()
            .skip(query.offset())
            .take(query.page_size)
            .map(|(_, doc)| doc.clone())
            .collect();

        Ok(SearchPage {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[(&str, f32)] = &[("title", 3.0), ("description", 1.0)];

    fn todo(id: &str, title: &str, created_at: &str) -> (String, Value) {
        (
            id.to_string(),
            json!({ "id": id, "title": title, "isCompleted": false, "createdAt": created_at }),
        )
    }

    #[tokio::test]
    async fn test_upsert_overwrites_whole_document() {
        let store = InMemoryStore::new();

        store
            .upsert_document("todos", "1", &json!({ "id": "1", "title": "a", "description": "x" }))
            .await
            .unwrap();
        store
            .upsert_document("todos", "1", &json!({ "id": "1", "title": "b" }))
            .await
            .unwrap();

        let doc = store.get_document("todos", "1").await.unwrap().unwrap();
        assert_eq!(doc, json!({ "id": "1", "title": "b" }));
        assert_eq!(store.document_count("todos").await, 1);
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = InMemoryStore::new();

        assert!(store.delete_document("todos", "missing").await.is_ok());
        assert!(store.get_document("todos", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_index_keeps_existing_documents() {
        let store = InMemoryStore::new();
        store.create_index("todos", &json!({ "v": 1 })).await.unwrap();
        store
            .upsert_document("todos", "1", &json!({ "id": "1" }))
            .await
            .unwrap();

        store.create_index("todos", &json!({ "v": 2 })).await.unwrap();

        assert!(store.index_exists("todos").await.unwrap());
        assert_eq!(store.document_count("todos").await, 1);
        assert_eq!(store.index_settings("todos").await, Some(json!({ "v": 1 })));
    }

    #[tokio::test]
    async fn test_search_pagination_and_ordering() {
        let store = InMemoryStore::new();
        let documents: Vec<(String, Value)> = (0..25)
            .map(|i| {
                todo(
                    &format!("{:02}", i),
                    "task",
                    &format!("2024-01-01T00:00:{:02}Z", i),
                )
            })
            .collect();
        store.bulk_upsert("todos", &documents).await.unwrap();

        let page = store
            .search("todos", &SearchQuery::match_all().page(1, 10), FIELDS)
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items.len(), 10);
        // newest first
        assert_eq!(page.items[0]["id"], "24");

        let last = store
            .search("todos", &SearchQuery::match_all().page(3, 10), FIELDS)
            .await
            .unwrap();
        assert_eq!(last.items.len(), 5);
        assert_eq!(last.items[4]["id"], "00");
    }

    #[tokio::test]
    async fn test_search_free_text_and_filter() {
        let store = InMemoryStore::new();
        store
            .bulk_upsert(
                "todos",
                &[
                    todo("1", "Buy milk", "2024-01-01T00:00:00Z"),
                    todo("2", "Walk the dog", "2024-01-02T00:00:00Z"),
                ],
            )
            .await
            .unwrap();

        let page = store
            .search("todos", &SearchQuery::parse("mlik").unwrap(), FIELDS)
            .await
            .unwrap();
        // a transposition is two edits, beyond AUTO for a four-letter term
        assert_eq!(page.total, 0);

        let page = store
            .search("todos", &SearchQuery::parse("mlk").unwrap(), FIELDS)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0]["id"], "1");

        let page = store
            .search("todos", &SearchQuery::parse("title:dog").unwrap(), FIELDS)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0]["id"], "2");
    }

    #[tokio::test]
    async fn test_search_rejects_invalid_page() {
        let store = InMemoryStore::new();
        store.create_index("todos", &json!({})).await.unwrap();

        let result = store
            .search("todos", &SearchQuery::match_all().page(0, 10), FIELDS)
            .await;
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_search_missing_index() {
        let store = InMemoryStore::new();
        let result = store.search("todos", &SearchQuery::match_all(), FIELDS).await;
        assert!(matches!(result, Err(SearchError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_operation() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.upsert_document("todos", "1", &json!({})).await,
            Err(SearchError::ConnectionError(_))
        ));
        assert!(store.delete_document("todos", "1").await.is_err());
        assert!(!store.health_check().await.unwrap());

        store.set_unavailable(false);
        assert!(store.upsert_document("todos", "1", &json!({})).await.is_ok());
    }
}
