//! Result types for document store operations.

/// Result of a batch operation for a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperationResult {
    /// Identifier of the document.
    pub id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error reported by the backend if the operation failed.
    pub error: Option<String>,
}

impl BatchOperationResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// Allows callers to handle partial failures: the backend may accept some items of
/// a batch and reject others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// The first reported failure, if any.
    pub fn first_error(&self) -> Option<&BatchOperationResult> {
        self.results.iter().find(|r| !r.success)
    }
}

/// Outcome of making sure an index exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// The index was already there.
    Existed,
    /// The index was created by this call.
    Created,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_results() {
        let summary = BatchOperationSummary::from_results(vec![
            BatchOperationResult::ok("a"),
            BatchOperationResult::failed("b", "mapper_parsing_exception"),
            BatchOperationResult::ok("c"),
        ]);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.first_error().map(|r| r.id.as_str()), Some("b"));
    }
}
