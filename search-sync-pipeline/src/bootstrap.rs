//! Index bootstrap.
//!
//! Makes sure every search index exists with its mapping before consumption
//! starts. A failure here is logged and never stops the process: a missing
//! index only degrades search, the write side is unaffected.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use search_sync_repository::{DocumentIndex, DocumentStore, IndexStatus, SearchError};
use search_sync_shared::{EntityKind, IndexedDocument, ProductDocument, TodoDocument};

/// Outcome of bootstrapping one index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Existed,
    Created,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapReport {
    /// Health probe result; `None` if the probe itself failed.
    pub healthy: Option<bool>,
    pub indices: Vec<(EntityKind, IndexOutcome)>,
}

impl BootstrapReport {
    pub fn all_ready(&self) -> bool {
        self.indices
            .iter()
            .all(|(_, outcome)| !matches!(outcome, IndexOutcome::Failed(_)))
    }

    pub fn outcome(&self, kind: EntityKind) -> Option<&IndexOutcome> {
        self.indices
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }
}

/// Ensure the index of every entity kind exists.
#[instrument(skip(store))]
pub async fn bootstrap_indices(store: Arc<dyn DocumentStore>) -> BootstrapReport {
    let healthy = match store.health_check().await {
        Ok(true) => Some(true),
        Ok(false) => {
            warn!("Search backend reports unhealthy; bootstrapping anyway");
            Some(false)
        }
        Err(e) => {
            warn!(error = %e, "Search backend health check failed; bootstrapping anyway");
            None
        }
    };

    let mut indices = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        let result = match kind {
            EntityKind::Todo => ensure::<TodoDocument>(&store).await,
            EntityKind::Product => ensure::<ProductDocument>(&store).await,
        };

        let outcome = match result {
            Ok(IndexStatus::Existed) => {
                info!(index = %kind.index_name(), "Index already exists");
                IndexOutcome::Existed
            }
            Ok(IndexStatus::Created) => {
                info!(index = %kind.index_name(), "Index created");
                IndexOutcome::Created
            }
            Err(e) => {
                error!(index = %kind.index_name(), error = %e, "Failed to bootstrap index");
                IndexOutcome::Failed(e.to_string())
            }
        };
        indices.push((kind, outcome));
    }

    BootstrapReport { healthy, indices }
}

async fn ensure<T: IndexedDocument>(store: &Arc<dyn DocumentStore>) -> Result<IndexStatus, SearchError> {
    DocumentIndex::<T>::new(Arc::clone(store)).ensure().await
}
