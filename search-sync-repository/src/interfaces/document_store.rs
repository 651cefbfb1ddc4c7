//! Document store trait definition.
//!
//! This module defines the abstract interface for the read-side document store,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchError;
use crate::types::BatchOperationSummary;
use search_sync_shared::{SearchPage, SearchQuery};

/// Abstract interface for the document store.
///
/// Documents are plain JSON objects addressed by `(index, id)`. Typed access
/// goes through [`DocumentIndex`](crate::DocumentIndex), which serializes
/// documents and supplies their mapping and text fields.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, SearchError>`. No method retries internally;
/// retry policy belongs to the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check whether an index exists.
    ///
    /// # Arguments
    ///
    /// * `index` - Name of the index
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the index exists
    /// * `Ok(false)` - If it does not
    /// * `Err(SearchError)` - If the check fails to execute
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    /// Create an index with the given settings and mappings.
    ///
    /// Creating an index that already exists is not an error.
    ///
    /// # Arguments
    ///
    /// * `index` - Name of the index
    /// * `settings` - Settings and mappings body
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index exists afterwards
    /// * `Err(SearchError::IndexCreationError)` - If creation fails
    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError>;

    /// Write a full document, replacing any document with the same id.
    ///
    /// # Arguments
    ///
    /// * `index` - Name of the index
    /// * `id` - Document identifier
    /// * `document` - The complete document body
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was written
    /// * `Err(SearchError)` - If the write fails
    async fn upsert_document(&self, index: &str, id: &str, document: &Value)
        -> Result<(), SearchError>;

    /// Write many documents in one request.
    ///
    /// Used for backfill and seeding, not for the steady-state event path.
    /// Written documents are visible to searches once this returns.
    ///
    /// # Arguments
    ///
    /// * `index` - Name of the index
    /// * `documents` - `(id, document)` pairs
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Per-item outcome
    /// * `Err(SearchError::BulkIndexError)` - If the request as a whole fails
    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[(String, Value)],
    ) -> Result<BatchOperationSummary, SearchError>;

    /// Delete a document.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was deleted or did not exist
    /// * `Err(SearchError)` - If the deletion fails
    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError>;

    /// Fetch a document by id.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(document))` - If the document exists
    /// * `Ok(None)` - If it does not
    /// * `Err(SearchError)` - If the lookup fails
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, SearchError>;

    /// Run a paginated query.
    ///
    /// Results are ordered by relevance, then creation time descending, then id.
    ///
    /// # Arguments
    ///
    /// * `index` - Name of the index
    /// * `query` - Query mode and page
    /// * `text_fields` - Fields and boosts used by free-text queries
    ///
    /// # Returns
    ///
    /// * `Ok(SearchPage)` - The requested page and the total match count
    /// * `Err(SearchError::InvalidQuery)` - If the page bounds are invalid
    /// * `Err(SearchError)` - If the search fails
    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
        text_fields: &[(&str, f32)],
    ) -> Result<SearchPage<Value>, SearchError>;

    /// Check if the backend is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the backend is healthy
    /// * `Ok(false)` - If the backend is unhealthy
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}
