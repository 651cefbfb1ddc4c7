//! Per-index client settings.

/// Bulk writes larger than this are rejected unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Settings of one [`DocumentIndex`](crate::DocumentIndex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIndexConfig {
    /// Largest bulk upsert accepted; `None` accepts any size.
    pub max_batch_size: Option<usize>,
}

impl Default for DocumentIndexConfig {
    fn default() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }
}

impl DocumentIndexConfig {
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: Some(max_batch_size),
        }
    }

    /// Accept bulk upserts of any size.
    pub fn without_batch_limit() -> Self {
        Self { max_batch_size: None }
    }
}
