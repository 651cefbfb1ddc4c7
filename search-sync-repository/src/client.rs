//! Typed document index client.
//!
//! This module provides the client that application code uses to read and write
//! one kind of document. It owns the serialization of documents, supplies the
//! index mapping and text fields, and enforces the bulk batch size limit.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::DocumentIndexConfig;
use crate::errors::SearchError;
use crate::interfaces::DocumentStore;
use crate::types::{BatchOperationSummary, IndexStatus};
use search_sync_shared::{IndexedDocument, SearchPage, SearchQuery};

/// Client for the index holding documents of type `T`.
pub struct DocumentIndex<T: IndexedDocument> {
    store: Arc<dyn DocumentStore>,
    config: DocumentIndexConfig,
    _document: PhantomData<fn() -> T>,
}

impl<T: IndexedDocument> Clone for DocumentIndex<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            _document: PhantomData,
        }
    }
}

impl<T: IndexedDocument> DocumentIndex<T> {
    /// Create a new DocumentIndex with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, DocumentIndexConfig::default())
    }

    /// Create a new DocumentIndex with custom configuration.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: DocumentIndexConfig) -> Self {
        Self {
            store,
            config,
            _document: PhantomData,
        }
    }

    /// Name of the underlying index.
    pub fn name(&self) -> &'static str {
        T::index_name()
    }

    /// The store this client writes to.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Check if batch size exceeds the configured limit.
    fn validate_batch_size(&self, size: usize) -> Result<(), SearchError> {
        if let Some(max) = self.config.max_batch_size {
            if size > max {
                return Err(SearchError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool, SearchError> {
        self.store.index_exists(self.name()).await
    }

    /// Create the index with the document type's settings and mappings.
    pub async fn create(&self) -> Result<(), SearchError> {
        self.store
            .create_index(self.name(), &T::index_settings())
            .await
    }

    /// Create the index unless it already exists.
    pub async fn ensure(&self) -> Result<IndexStatus, SearchError> {
        if self.exists().await? {
            return Ok(IndexStatus::Existed);
        }
        self.create().await?;
        Ok(IndexStatus::Created)
    }

    /// Write a full document, replacing any previous version.
    pub async fn upsert(&self, document: &T) -> Result<(), SearchError> {
        let body = serde_json::to_value(document)?;
        self.store
            .upsert_document(self.name(), &document.document_id(), &body)
            .await
    }

    /// Write many documents in one request.
    ///
    /// Fails with `BulkIndexError` if any item was rejected; the error names the
    /// first rejected document. The batch size is limited by the configured
    /// `max_batch_size`.
    #[instrument(skip(self, documents), fields(index = %self.name(), count = documents.len()))]
    pub async fn bulk_upsert(&self, documents: &[T]) -> Result<BatchOperationSummary, SearchError> {
        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }

        self.validate_batch_size(documents.len())?;

        let bodies = documents
            .iter()
            .map(|doc| Ok((doc.document_id(), serde_json::to_value(doc)?)))
            .collect::<Result<Vec<_>, SearchError>>()?;

        let summary = self.store.bulk_upsert(self.name(), &bodies).await?;

        if let Some(first) = summary.first_error() {
            warn!(
                failed = summary.failed,
                first_id = %first.id,
                "Bulk upsert had rejected documents"
            );
            return Err(SearchError::bulk_index(format!(
                "{} of {} documents rejected, first {}: {}",
                summary.failed,
                summary.total,
                first.id,
                first.error.as_deref().unwrap_or("unknown error")
            )));
        }

        info!(succeeded = summary.succeeded, "Bulk upsert complete");
        Ok(summary)
    }

    /// Delete a document. Deleting an absent document succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), SearchError> {
        self.store.delete_document(self.name(), id).await
    }

    /// Fetch a document by id.
    pub async fn get(&self, id: &str) -> Result<Option<T>, SearchError> {
        self.store
            .get_document(self.name(), id)
            .await?
            .map(|value| serde_json::from_value(value).map_err(|e| SearchError::parse(e.to_string())))
            .transpose()
    }

    /// Run a paginated query over this index.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage<T>, SearchError> {
        let page = self
            .store
            .search(self.name(), query, T::text_fields())
            .await?;
        page.try_map(|value| serde_json::from_value(value).map_err(|e| SearchError::parse(e.to_string())))
    }
}
