//! Error types for the search sync pipeline.

mod classify_error;
mod pipeline_error;
mod publish_error;

pub use classify_error::ClassifyError;
pub use pipeline_error::PipelineError;
pub use publish_error::PublishError;
