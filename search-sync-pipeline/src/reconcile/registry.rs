//! Routing of change events to their reconciliation routine.

use std::collections::HashMap;
use std::sync::Arc;

use search_sync_repository::{DocumentIndex, DocumentStore};
use search_sync_shared::{ChangeEvent, EntityKind, Operation, ProductDocument, TodoDocument};

use crate::errors::PipelineError;
use crate::reconcile::{DeleteRoutine, Reconciler, UpsertRoutine};

/// Routines keyed by entity kind and operation.
#[derive(Clone, Default)]
pub struct ReconcilerRegistry {
    routines: HashMap<(EntityKind, Operation), Arc<dyn Reconciler>>,
}

impl ReconcilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The six routines for todos and products, writing to `store`.
    pub fn standard(store: Arc<dyn DocumentStore>) -> Self {
        let todos = DocumentIndex::<TodoDocument>::new(Arc::clone(&store));
        let products = DocumentIndex::<ProductDocument>::new(store);

        let todo_upsert: Arc<dyn Reconciler> = Arc::new(UpsertRoutine::todos(todos.clone()));
        let product_upsert: Arc<dyn Reconciler> = Arc::new(UpsertRoutine::products(products.clone()));

        let mut registry = Self::new();
        registry
            .register(EntityKind::Todo, Operation::Created, Arc::clone(&todo_upsert))
            .register(EntityKind::Todo, Operation::Updated, todo_upsert)
            .register(EntityKind::Todo, Operation::Deleted, Arc::new(DeleteRoutine::new(todos)))
            .register(EntityKind::Product, Operation::Created, Arc::clone(&product_upsert))
            .register(EntityKind::Product, Operation::Updated, product_upsert)
            .register(
                EntityKind::Product,
                Operation::Deleted,
                Arc::new(DeleteRoutine::new(products)),
            );
        registry
    }

    /// Register `routine` for a kind and operation, replacing any previous one.
    pub fn register(
        &mut self,
        kind: EntityKind,
        operation: Operation,
        routine: Arc<dyn Reconciler>,
    ) -> &mut Self {
        self.routines.insert((kind, operation), routine);
        self
    }

    pub fn contains(&self, kind: EntityKind, operation: Operation) -> bool {
        self.routines.contains_key(&(kind, operation))
    }

    /// Run the routine for `event` to completion.
    pub async fn dispatch(&self, event: &ChangeEvent) -> Result<(), PipelineError> {
        let operation = event.operation();
        let routine = self
            .routines
            .get(&(event.kind, operation))
            .ok_or(PipelineError::NoRoutine {
                kind: event.kind,
                operation,
            })?;
        routine.reconcile(event).await
    }
}
