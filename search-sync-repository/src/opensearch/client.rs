//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `DocumentStore`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    params::Refresh,
    BulkParts, DeleteParts, GetParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::DocumentStore;
use crate::opensearch::queries::build_search_body;
use crate::types::{BatchOperationResult, BatchOperationSummary};
use search_sync_shared::{SearchPage, SearchQuery};

/// Every write returns only once it is visible to search.
const WRITE_REFRESH: Refresh = Refresh::WaitFor;

/// Credentials for HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// OpenSearch-backed document store.
///
/// # Example
///
/// ```ignore
/// let store = OpenSearchStore::new("http://localhost:9200", None)?;
/// store.upsert_document("todos", &id, &json!({ "title": "Buy milk" })).await?;
/// ```
pub struct OpenSearchStore {
    client: OpenSearch,
}

impl OpenSearchStore {
    /// Create a new OpenSearch store connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `auth` - Basic-auth credentials, if the cluster requires them
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchStore)` - A new store instance
    /// * `Err(SearchError)` - If connection setup fails
    pub fn new(url: &str, auth: Option<BasicAuth>) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        let authenticated = auth.is_some();
        if let Some(auth) = auth {
            builder = builder.auth(Credentials::Basic(auth.username, auth.password));
        }
        let transport = builder
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, authenticated, "Created OpenSearch client");

        Ok(Self { client })
    }

    /// Read the body of a failed response for error reporting.
    async fn failure_body(response: Response) -> String {
        response.text().await.unwrap_or_default()
    }
}

/// Parse the hits of a search response into a page of `_source` documents.
fn parse_search_response(body: &Value, query: &SearchQuery) -> Result<SearchPage<Value>, SearchError> {
    let hits = body
        .get("hits")
        .ok_or_else(|| SearchError::parse("search response has no hits"))?;

    // `hits.total` is an object on current versions and a bare number on old ones
    let total = hits
        .get("total")
        .and_then(|t| t.get("value").and_then(Value::as_u64).or_else(|| t.as_u64()))
        .unwrap_or(0);

    let items = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_source").cloned())
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchPage {
        items,
        total,
        page: query.page,
        page_size: query.page_size,
    })
}

/// Turn a bulk response into per-item results.
fn parse_bulk_response(body: &Value, documents: &[(String, Value)]) -> BatchOperationSummary {
    let items = body.get("items").and_then(Value::as_array);

    let results = documents
        .iter()
        .enumerate()
        .map(|(i, (id, _))| {
            let item = items.and_then(|items| items.get(i)).and_then(|item| item.get("index"));
            match item.and_then(|item| item.get("error")) {
                Some(error) => {
                    let reason = error
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    BatchOperationResult::failed(id.clone(), reason)
                }
                None => BatchOperationResult::ok(id.clone()),
            }
        })
        .collect();

    BatchOperationSummary::from_results(results)
}

#[async_trait]
impl DocumentStore for OpenSearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        match status.as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(SearchError::query(format!(
                "Index existence check for {} failed with status {}",
                index, status
            ))),
        }
    }

    #[instrument(skip(self, settings))]
    async fn create_index(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(settings)
            .send()
            .await
            .map_err(|e| SearchError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            // another process won the race to create it
            if error_body.contains("resource_already_exists_exception") {
                warn!(index = %index, "Index already exists");
                return Ok(());
            }
            error!(status = %status, body = %error_body, "Index creation failed");
            return Err(SearchError::index_creation(format!(
                "Creating {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, "Index created");
        Ok(())
    }

    async fn upsert_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), SearchError> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .refresh(WRITE_REFRESH)
            .body(document)
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Index request failed");
            return Err(SearchError::index(format!(
                "Index failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(index = %index, doc_id = %id, "Document upserted");
        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn bulk_upsert(
        &self,
        index: &str,
        documents: &[(String, Value)],
    ) -> Result<BatchOperationSummary, SearchError> {
        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for (id, document) in documents {
            body.push(json!({ "index": { "_index": index, "_id": id } }).into());
            body.push(document.clone().into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .refresh(WRITE_REFRESH)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::bulk_index(format!(
                "Bulk failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        let summary = parse_bulk_response(&response_body, documents);

        info!(
            index = %index,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Bulk upsert finished"
        );
        Ok(summary)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .refresh(WRITE_REFRESH)
            .send()
            .await
            .map_err(|e| SearchError::delete(e.to_string()))?;

        let status = response.status_code();

        // 404 is acceptable - document may not exist
        if !status.is_success() && status.as_u16() != 404 {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Delete request failed");
            return Err(SearchError::delete(format!(
                "Delete failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(index = %index, doc_id = %id, "Document deleted");
        Ok(())
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, SearchError> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| SearchError::get(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Get request failed");
            return Err(SearchError::get(format!(
                "Get failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        Ok(body.get("_source").cloned())
    }

    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
        text_fields: &[(&str, f32)],
    ) -> Result<SearchPage<Value>, SearchError> {
        query.validate()?;

        let body = build_search_body(query, text_fields);
        debug!(index = %index, query = %body, "Executing search");

        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(SearchError::IndexNotFound(index.to_string()));
        }
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Search request failed");
            return Err(SearchError::query(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        parse_search_response(&body, query)
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        let status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        debug!(status = %status, "OpenSearch cluster health");
        Ok(status == "green" || status == "yellow")
    }
}
