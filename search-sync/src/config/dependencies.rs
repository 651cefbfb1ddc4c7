//! Dependency initialization and wiring for the search sync.

use std::sync::Arc;

use tracing::info;

use search_sync_pipeline::broker::{KafkaSink, KafkaSource};
use search_sync_pipeline::consumer::{
    CdcHandler, ChangeEventHandler, ConsumerLoop, MessageHandler, StreamConfig,
};
use search_sync_pipeline::orchestrator::Orchestrator;
use search_sync_pipeline::publisher::{EventPublisher, RetryPolicy};
use search_sync_pipeline::reconcile::ReconcilerRegistry;
use search_sync_repository::{DocumentIndex, DocumentStore, InMemoryStore, OpenSearchStore};
use search_sync_shared::{EntityKind, ProductDocument, TodoDocument};

use crate::config::{Settings, StoreBackend, TopicSettings};
use crate::SyncError;

/// Container for the initialized dependencies.
pub struct Dependencies {
    settings: Settings,
    store: Arc<dyn DocumentStore>,
}

impl Dependencies {
    /// Connect the document store selected by `settings`.
    ///
    /// Kafka clients are created lazily by the sub-command that needs them.
    pub fn new(settings: Settings) -> Result<Self, SyncError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            store_backend = ?settings.store_backend,
            kafka_broker = %settings.kafka_broker,
            "Initializing dependencies"
        );

        let store: Arc<dyn DocumentStore> = match settings.store_backend {
            StoreBackend::OpenSearch => {
                let client = OpenSearchStore::new(&settings.opensearch_url, settings.opensearch_auth.clone())
                    .map_err(|e| SyncError::config(format!("Failed to create OpenSearch client: {}", e)))?;
                Arc::new(client)
            }
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        };

        Ok(Self { settings, store })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn todos(&self) -> DocumentIndex<TodoDocument> {
        DocumentIndex::new(self.store())
    }

    pub fn products(&self) -> DocumentIndex<ProductDocument> {
        DocumentIndex::new(self.store())
    }

    /// Build the orchestrator with one consumer loop per configured stream.
    pub fn orchestrator(&self) -> Result<Orchestrator, SyncError> {
        let registry = ReconcilerRegistry::standard(self.store());
        let mut orchestrator = Orchestrator::new(self.store());

        orchestrator.add_stream(self.stream(
            "todos",
            &self.settings.todos,
            Arc::new(ChangeEventHandler::new(registry.clone(), EntityKind::Todo)),
        )?);
        orchestrator.add_stream(self.stream(
            "products",
            &self.settings.products,
            Arc::new(ChangeEventHandler::new(registry, EntityKind::Product)),
        )?);

        if self.settings.cdc_enabled {
            orchestrator.add_stream(self.stream("cdc", &self.settings.cdc, Arc::new(CdcHandler))?);
        }

        Ok(orchestrator)
    }

    fn stream(
        &self,
        name: &str,
        topic: &TopicSettings,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<ConsumerLoop, SyncError> {
        let source = KafkaSource::new(&self.settings.kafka_broker, &topic.group_id)?;
        info!(stream = %name, topic = %topic.topic, group_id = %topic.group_id, "Kafka consumer created");

        let config = StreamConfig::new(name, topic.topic.clone())
            .with_poll_timeout(self.settings.poll_timeout)
            .with_redelivery_backoff(self.settings.redelivery_backoff);

        Ok(ConsumerLoop::new(config, Box::new(source), handler))
    }

    /// Build a publisher over a Kafka producer.
    pub fn publisher(&self) -> Result<EventPublisher, SyncError> {
        let sink = KafkaSink::new(&self.settings.kafka_broker)?;
        let retry = RetryPolicy::new(self.settings.publish_max_attempts, self.settings.publish_backoff);
        Ok(EventPublisher::new(Arc::new(sink), retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_serves_typed_indices() {
        let settings = Settings::from_lookup(|key| (key == "STORE_BACKEND").then(|| "memory".to_string())).unwrap();
        let deps = Dependencies::new(settings).unwrap();

        assert!(deps.store().health_check().await.unwrap());
        assert_eq!(deps.todos().name(), "todos");
        assert_eq!(deps.products().name(), "products");
    }
}
