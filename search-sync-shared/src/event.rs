//! Change events.
//!
//! A [`ChangeEvent`] is created at the moment a write-side mutation commits and
//! describes that mutation completely: which entity, which operation, and (for
//! creates and updates) the full entity snapshot after the write.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The kinds of entity whose writes are mirrored into the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A todo item.
    Todo,
    /// A catalogue product.
    Product,
}

impl EntityKind {
    /// Every kind, in bootstrap order.
    pub const ALL: [EntityKind; 2] = [EntityKind::Todo, EntityKind::Product];

    /// The fixed search index name for this kind.
    pub fn index_name(&self) -> &'static str {
        match self {
            EntityKind::Todo => "todos",
            EntityKind::Product => "products",
        }
    }

    /// Wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Todo => "todo",
            EntityKind::Product => "product",
        }
    }

    /// Parse a wire tag, ignoring case.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(tag.trim()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Created,
    Updated,
    Deleted,
}

impl Operation {
    /// Wire tag for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Deleted => "deleted",
        }
    }

    /// Parse a wire tag, ignoring case.
    pub fn parse(tag: &str) -> Option<Self> {
        [Operation::Created, Operation::Updated, Operation::Deleted]
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(tag.trim()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a todo after a write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TodoSnapshot {
    /// Title of the todo.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_completed: bool,
    /// Priority: 0 low, 1 medium, 2 high.
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::timestamp::deserialize_option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::timestamp::deserialize_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TodoSnapshot {
    /// Create a snapshot with a title and default values for everything else.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn completed(mut self, is_completed: bool) -> Self {
        self.is_completed = is_completed;
        self
    }
}

/// Physical dimensions of a product, in millimetres.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// Who made a product.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Manufacturer {
    pub name: String,
    pub country: String,
}

/// Snapshot of a product after a write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub material: String,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::timestamp::deserialize_option")]
    pub manufacturing_date: Option<DateTime<Utc>>,
    /// Availability, e.g. `Available`, `OutOfStock`, `Discontinued`.
    pub status: String,
    pub dimensions: Dimensions,
    pub tags: Vec<String>,
    pub manufacturer: Manufacturer,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "crate::timestamp::deserialize_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Full entity state carried by Created and Updated events.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySnapshot {
    Todo(TodoSnapshot),
    Product(ProductSnapshot),
}

impl EntitySnapshot {
    /// The kind of entity this snapshot describes.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntitySnapshot::Todo(_) => EntityKind::Todo,
            EntitySnapshot::Product(_) => EntityKind::Product,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            EntitySnapshot::Todo(todo) => todo.created_at,
            EntitySnapshot::Product(product) => product.created_at,
        }
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            EntitySnapshot::Todo(todo) => todo.updated_at,
            EntitySnapshot::Product(product) => product.updated_at,
        }
    }

    fn set_timestamps(&mut self, created_at: Option<DateTime<Utc>>, updated_at: Option<DateTime<Utc>>) {
        match self {
            EntitySnapshot::Todo(todo) => {
                todo.created_at = created_at;
                todo.updated_at = updated_at;
            }
            EntitySnapshot::Product(product) => {
                product.created_at = created_at;
                product.updated_at = updated_at;
            }
        }
    }
}

impl From<TodoSnapshot> for EntitySnapshot {
    fn from(snapshot: TodoSnapshot) -> Self {
        EntitySnapshot::Todo(snapshot)
    }
}

impl From<ProductSnapshot> for EntitySnapshot {
    fn from(snapshot: ProductSnapshot) -> Self {
        EntitySnapshot::Product(snapshot)
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Created(EntitySnapshot),
    Updated(EntitySnapshot),
    Deleted,
}

/// Violations of the per-variant shape rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("created event for {0} is missing its creation timestamp")]
    MissingCreatedAt(Uuid),

    #[error("created event for {0} must not carry an update timestamp")]
    UnexpectedUpdatedAt(Uuid),

    #[error("updated event for {0} is missing its update timestamp")]
    MissingUpdatedAt(Uuid),

    #[error("event for {id} is tagged {declared} but carries a {actual} snapshot")]
    KindMismatch {
        id: Uuid,
        declared: EntityKind,
        actual: EntityKind,
    },
}

/// One committed mutation of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Kind of the mutated entity.
    pub kind: EntityKind,
    /// Identifier of the mutated entity; also the broker partition key.
    pub id: Uuid,
    /// The mutation itself.
    pub change: Change,
}

impl ChangeEvent {
    /// A creation. The snapshot's creation timestamp is set to `created_at`
    /// and any update timestamp is cleared.
    pub fn created(id: Uuid, snapshot: impl Into<EntitySnapshot>, created_at: DateTime<Utc>) -> Self {
        let mut snapshot = snapshot.into();
        snapshot.set_timestamps(Some(created_at), None);
        Self {
            kind: snapshot.kind(),
            id,
            change: Change::Created(snapshot),
        }
    }

    /// An update. The snapshot's update timestamp is set to `updated_at`; its
    /// creation timestamp is kept if the caller supplied one.
    pub fn updated(id: Uuid, snapshot: impl Into<EntitySnapshot>, updated_at: DateTime<Utc>) -> Self {
        let mut snapshot = snapshot.into();
        let created_at = snapshot.created_at();
        snapshot.set_timestamps(created_at, Some(updated_at));
        Self {
            kind: snapshot.kind(),
            id,
            change: Change::Updated(snapshot),
        }
    }

    /// A deletion, carrying nothing but the identifier.
    pub fn deleted(kind: EntityKind, id: Uuid) -> Self {
        Self {
            kind,
            id,
            change: Change::Deleted,
        }
    }

    pub fn operation(&self) -> Operation {
        match self.change {
            Change::Created(_) => Operation::Created,
            Change::Updated(_) => Operation::Updated,
            Change::Deleted => Operation::Deleted,
        }
    }

    pub fn snapshot(&self) -> Option<&EntitySnapshot> {
        match &self.change {
            Change::Created(snapshot) | Change::Updated(snapshot) => Some(snapshot),
            Change::Deleted => None,
        }
    }

    /// Event timestamp: creation time for creates, update time for updates.
    /// Deletions carry no timestamp.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        match &self.change {
            Change::Created(snapshot) => snapshot.created_at(),
            Change::Updated(snapshot) => snapshot.updated_at(),
            Change::Deleted => None,
        }
    }

    /// Check the shape invariant: creates carry a creation timestamp and no
    /// update timestamp, updates carry an update timestamp, and the snapshot
    /// matches the declared kind.
    pub fn validate(&self) -> Result<(), ShapeError> {
        if let Some(snapshot) = self.snapshot() {
            if snapshot.kind() != self.kind {
                return Err(ShapeError::KindMismatch {
                    id: self.id,
                    declared: self.kind,
                    actual: snapshot.kind(),
                });
            }
        }

        match &self.change {
            Change::Created(snapshot) => {
                if snapshot.created_at().is_none() {
                    return Err(ShapeError::MissingCreatedAt(self.id));
                }
                if snapshot.updated_at().is_some() {
                    return Err(ShapeError::UnexpectedUpdatedAt(self.id));
                }
                Ok(())
            }
            Change::Updated(snapshot) => {
                if snapshot.updated_at().is_none() {
                    return Err(ShapeError::MissingUpdatedAt(self.id));
                }
                Ok(())
            }
            Change::Deleted => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_created_clears_update_timestamp() {
        let mut snapshot = TodoSnapshot::new("Buy milk");
        snapshot.updated_at = Some(at(50));

        let event = ChangeEvent::created(Uuid::new_v4(), snapshot, at(100));

        assert_eq!(event.kind, EntityKind::Todo);
        assert_eq!(event.operation(), Operation::Created);
        assert_eq!(event.occurred_at(), Some(at(100)));
        assert!(event.snapshot().unwrap().updated_at().is_none());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_updated_keeps_creation_timestamp() {
        let mut snapshot = TodoSnapshot::new("Buy milk");
        snapshot.created_at = Some(at(100));

        let event = ChangeEvent::updated(Uuid::new_v4(), snapshot, at(200));

        let snapshot = event.snapshot().unwrap();
        assert_eq!(snapshot.created_at(), Some(at(100)));
        assert_eq!(snapshot.updated_at(), Some(at(200)));
        assert_eq!(event.occurred_at(), Some(at(200)));
    }

    #[test]
    fn test_deleted_has_no_snapshot() {
        let id = Uuid::new_v4();
        let event = ChangeEvent::deleted(EntityKind::Product, id);

        assert_eq!(event.operation(), Operation::Deleted);
        assert!(event.snapshot().is_none());
        assert!(event.occurred_at().is_none());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_hand_built_shapes() {
        let id = Uuid::new_v4();

        let event = ChangeEvent {
            kind: EntityKind::Todo,
            id,
            change: Change::Created(TodoSnapshot::new("x").into()),
        };
        assert_eq!(event.validate(), Err(ShapeError::MissingCreatedAt(id)));

        let event = ChangeEvent {
            kind: EntityKind::Todo,
            id,
            change: Change::Updated(TodoSnapshot::new("x").into()),
        };
        assert_eq!(event.validate(), Err(ShapeError::MissingUpdatedAt(id)));

        let event = ChangeEvent {
            kind: EntityKind::Product,
            id,
            change: Change::Deleted,
        };
        assert!(event.validate().is_ok());

        let mut mismatched = ChangeEvent::created(id, TodoSnapshot::new("x"), at(1));
        mismatched.kind = EntityKind::Product;
        assert!(matches!(
            mismatched.validate(),
            Err(ShapeError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_and_operation_tags() {
        assert_eq!(EntityKind::parse("TODO"), Some(EntityKind::Todo));
        assert_eq!(EntityKind::parse(" product "), Some(EntityKind::Product));
        assert_eq!(EntityKind::parse("order"), None);
        assert_eq!(EntityKind::Todo.index_name(), "todos");
        assert_eq!(EntityKind::Product.index_name(), "products");

        assert_eq!(Operation::parse("Updated"), Some(Operation::Updated));
        assert_eq!(Operation::parse("upserted"), None);
    }

    #[test]
    fn test_snapshot_accepts_offsetless_and_long_fraction_dates() {
        let snapshot: TodoSnapshot = serde_json::from_value(serde_json::json!({
            "title": "Buy milk",
            "description": "",
            "priority": 1,
            "dueDate": "2024-05-10T00:00:00",
            "isCompleted": false,
            "createdAt": "2024-05-01T12:00:00.1234567Z"
        }))
        .unwrap();

        assert_eq!(snapshot.due_date, Some(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()));
        assert_eq!(
            snapshot.created_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::nanoseconds(123_456_700))
        );
        assert_eq!(snapshot.description.as_deref(), Some(""));
        assert_eq!(snapshot.updated_at, None);
    }

    #[test]
    fn test_product_manufacturing_date_without_offset() {
        let snapshot: ProductSnapshot = serde_json::from_value(serde_json::json!({
            "name": "Desk",
            "manufacturingDate": "2023-11-02T08:30:00"
        }))
        .unwrap();

        assert_eq!(
            snapshot.manufacturing_date,
            Some(Utc.with_ymd_and_hms(2023, 11, 2, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_date_is_an_error() {
        let result = serde_json::from_value::<TodoSnapshot>(serde_json::json!({
            "title": "Buy milk",
            "dueDate": "soon"
        }));
        assert!(result.is_err());
    }
}
