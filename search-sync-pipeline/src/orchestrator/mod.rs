//! Orchestrator for the search sync pipeline.
//!
//! Bootstraps the indices, then runs every registered consumer loop as its own
//! task with its own cancellation scope until shutdown.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use search_sync_repository::DocumentStore;

use crate::bootstrap::{bootstrap_indices, BootstrapReport};
use crate::consumer::{ConsumerLoop, StreamStats};
use crate::errors::PipelineError;

/// How one stream ended.
#[derive(Debug)]
pub struct StreamOutcome {
    pub name: String,
    pub result: Result<StreamStats, PipelineError>,
}

#[derive(Debug)]
pub struct RunReport {
    pub bootstrap: BootstrapReport,
    pub streams: Vec<StreamOutcome>,
}

pub struct Orchestrator {
    store: Arc<dyn DocumentStore>,
    streams: Vec<ConsumerLoop>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            streams: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn add_stream(&mut self, stream: ConsumerLoop) -> &mut Self {
        self.streams.push(stream);
        self
    }

    /// Token that stops every stream when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until Ctrl-C or [`Orchestrator::shutdown`], then wait for every
    /// stream to stop.
    #[instrument(skip(self), fields(streams = self.streams.len()))]
    pub async fn run(self) -> RunReport {
        info!("Starting search sync orchestrator");

        let bootstrap = bootstrap_indices(Arc::clone(&self.store)).await;
        if !bootstrap.all_ready() {
            warn!("Not every index is ready; consuming anyway");
        }

        let mut tasks = JoinSet::new();
        for stream in self.streams {
            let name = stream.name().to_string();
            let token = self.shutdown.child_token();
            tasks.spawn(async move {
                let result = stream.run(token).await;
                StreamOutcome { name, result }
            });
        }

        let signal_token = self.shutdown.clone();
        tokio::select! {
            _ = signal_token.cancelled() => {
                info!("Shutdown requested");
            }
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                }
                self.shutdown.cancel();
            }
        }

        let mut streams = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome.result {
                        Ok(stats) => info!(stream = %outcome.name, ?stats, "Stream stopped"),
                        Err(e) => error!(stream = %outcome.name, error = %e, "Stream failed"),
                    }
                    streams.push(outcome);
                }
                Err(e) => error!(error = %e, "Stream task panicked"),
            }
        }

        info!("Orchestrator shutdown complete");
        RunReport { bootstrap, streams }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, MessageSink};
    use crate::consumer::{ChangeEventHandler, StreamConfig};
    use crate::reconcile::ReconcilerRegistry;
    use search_sync_repository::InMemoryStore;
    use search_sync_shared::EntityKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_streams_run_until_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let broker = InMemoryBroker::new();
        let registry = ReconcilerRegistry::standard(store.clone());

        let mut orchestrator = Orchestrator::new(store.clone());
        for (name, topic, kind) in [
            ("todos", "todo-events", EntityKind::Todo),
            ("products", "product-events", EntityKind::Product),
        ] {
            orchestrator.add_stream(ConsumerLoop::new(
                StreamConfig::new(name, topic).with_poll_timeout(Duration::from_millis(10)),
                Box::new(broker.source(format!("{}-group", name))),
                Arc::new(ChangeEventHandler::new(registry.clone(), kind)),
            ));
        }
        let shutdown = orchestrator.shutdown_token();
        let task = tokio::spawn(orchestrator.run());

        broker
            .send(
                "product-events",
                "k",
                br#"{"id":"6f1c9a52-3c4e-4c1e-9a0b-2d5e8f7a1b3c","name":"Desk","createdAt":"2024-05-01T12:00:00Z"}"#,
            )
            .await
            .unwrap();
        for _ in 0..200 {
            if store.document_count("products").await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        let report = task.await.unwrap();

        assert!(report.bootstrap.all_ready());
        assert_eq!(report.streams.len(), 2);
        assert!(report.streams.iter().all(|s| s.result.is_ok()));
        assert_eq!(store.document_count("products").await, 1);
    }
}
