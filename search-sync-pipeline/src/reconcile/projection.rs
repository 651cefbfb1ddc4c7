//! Projection of entity snapshots onto search documents.
//!
//! Each projection fills an owned draft from the snapshot, resolves the
//! creation timestamp, and only then produces the document. The drafts never
//! leave this module.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use search_sync_shared::{
    Dimensions, EntitySnapshot, Manufacturer, ProductDocument, ProductSnapshot, TodoDocument,
    TodoSnapshot,
};

use crate::errors::PipelineError;

/// Creation time of the projected document: the snapshot's own, else the
/// current document's, else the update time.
fn resolve_created_at(
    id: Uuid,
    snapshot: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, PipelineError> {
    snapshot
        .or(current)
        .or(updated_at)
        .ok_or_else(|| PipelineError::projection(format!("no timestamp for {}", id)))
}

#[derive(Debug)]
struct TodoDraft {
    title: String,
    description: Option<String>,
    is_completed: bool,
    priority: i32,
    due_date: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl TodoDraft {
    fn from_snapshot(snapshot: &TodoSnapshot) -> Self {
        Self {
            title: snapshot.title.clone(),
            description: snapshot.description.clone().filter(|d| !d.is_empty()),
            is_completed: snapshot.is_completed,
            priority: snapshot.priority,
            due_date: snapshot.due_date,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    fn into_document(self, id: Uuid, created_at: DateTime<Utc>) -> TodoDocument {
        TodoDocument {
            id,
            title: self.title,
            description: self.description,
            is_completed: self.is_completed,
            priority: self.priority,
            due_date: self.due_date,
            created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Build the todo document for `id` from a snapshot.
///
/// The result replaces `current` entirely; only its creation time can carry
/// over, when the snapshot has none.
pub fn project_todo(
    current: Option<&TodoDocument>,
    id: Uuid,
    snapshot: &TodoSnapshot,
) -> Result<TodoDocument, PipelineError> {
    let draft = TodoDraft::from_snapshot(snapshot);
    let created_at = resolve_created_at(
        id,
        draft.created_at,
        current.map(|doc| doc.created_at),
        draft.updated_at,
    )?;
    Ok(draft.into_document(id, created_at))
}

#[derive(Debug)]
struct ProductDraft {
    name: String,
    description: String,
    price: f64,
    category: String,
    material: String,
    manufacturing_date: Option<DateTime<Utc>>,
    status: String,
    dimensions: Dimensions,
    tags: Vec<String>,
    manufacturer: Manufacturer,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl ProductDraft {
    fn from_snapshot(snapshot: &ProductSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            description: snapshot.description.clone(),
            price: snapshot.price,
            category: snapshot.category.clone(),
            material: snapshot.material.clone(),
            manufacturing_date: snapshot.manufacturing_date,
            status: snapshot.status.clone(),
            dimensions: snapshot.dimensions.clone(),
            tags: snapshot.tags.clone(),
            manufacturer: snapshot.manufacturer.clone(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    fn into_document(self, id: Uuid, created_at: DateTime<Utc>) -> ProductDocument {
        ProductDocument {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            category: self.category,
            material: self.material,
            manufacturing_date: self.manufacturing_date,
            status: self.status,
            dimensions: self.dimensions,
            tags: self.tags,
            manufacturer: self.manufacturer,
            created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Build the product document for `id` from a snapshot.
pub fn project_product(
    current: Option<&ProductDocument>,
    id: Uuid,
    snapshot: &ProductSnapshot,
) -> Result<ProductDocument, PipelineError> {
    let draft = ProductDraft::from_snapshot(snapshot);
    let created_at = resolve_created_at(
        id,
        draft.created_at,
        current.map(|doc| doc.created_at),
        draft.updated_at,
    )?;
    Ok(draft.into_document(id, created_at))
}

/// [`project_todo`] over a snapshot of any kind.
pub(crate) fn project_todo_snapshot(
    current: Option<&TodoDocument>,
    id: Uuid,
    snapshot: &EntitySnapshot,
) -> Result<TodoDocument, PipelineError> {
    match snapshot {
        EntitySnapshot::Todo(todo) => project_todo(current, id, todo),
        other => Err(PipelineError::projection(format!(
            "expected a todo snapshot for {}, got {}",
            id,
            other.kind()
        ))),
    }
}

/// [`project_product`] over a snapshot of any kind.
pub(crate) fn project_product_snapshot(
    current: Option<&ProductDocument>,
    id: Uuid,
    snapshot: &EntitySnapshot,
) -> Result<ProductDocument, PipelineError> {
    match snapshot {
        EntitySnapshot::Product(product) => project_product(current, id, product),
        other => Err(PipelineError::projection(format!(
            "expected a product snapshot for {}, got {}",
            id,
            other.kind()
        ))),
    }
}
