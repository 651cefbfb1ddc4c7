//! Reconciliation of change events into the document store.
//!
//! One routine per entity kind and operation. Every routine is idempotent:
//! upserts write the full document under the entity id and deleting an absent
//! document succeeds, so an event may safely be applied more than once.

mod projection;
mod registry;
mod routines;

use async_trait::async_trait;

use search_sync_shared::ChangeEvent;

use crate::errors::PipelineError;

pub use projection::{project_product, project_todo};
pub use registry::ReconcilerRegistry;
pub use routines::{DeleteRoutine, UpsertRoutine};

/// Applies one change event to the document store.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, event: &ChangeEvent) -> Result<(), PipelineError>;
}
