//! # Search Sync
//!
//! Entry point library for the search read-model sync: configuration,
//! dependency wiring and logging setup shared by every sub-command.

pub mod config;
pub mod logging;

pub use config::{Dependencies, Settings, StoreBackend};

use thiserror::Error;

/// Errors that can occur while starting or running the sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] search_sync_pipeline::PipelineError),

    /// Publish error.
    #[error("Publish error: {0}")]
    PublishError(#[from] search_sync_pipeline::PublishError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] search_sync_repository::SearchError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
