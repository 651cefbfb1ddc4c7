//! Indexed documents: the read-side projection of each entity kind.
//!
//! Each document type knows its own index name, mapping and the fields that
//! free-text queries run against, so the store can create and query an index
//! without knowing which entity it holds.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::event::{Dimensions, EntityKind, Manufacturer};

/// Field every document type uses for its creation time, and the secondary
/// sort key of every search.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A document type stored in its own search index.
pub trait IndexedDocument: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The entity kind this document projects.
    const KIND: EntityKind;

    /// The index holding documents of this type.
    fn index_name() -> &'static str {
        Self::KIND.index_name()
    }

    /// Document identifier; one document per entity.
    fn document_id(&self) -> String;

    /// Fields searched by free-text queries, with their boosts.
    fn text_fields() -> &'static [(&'static str, f32)];

    /// Index settings and mappings used when the index is created.
    fn index_settings() -> Value;
}

fn base_settings() -> Value {
    json!({
        "number_of_shards": 1,
        "number_of_replicas": 1,
        "refresh_interval": "5s"
    })
}

/// Search projection of a todo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoDocument {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TodoDocument {
    /// A fresh, incomplete, low-priority todo document.
    pub fn new(id: Uuid, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            is_completed: false,
            priority: 0,
            due_date: None,
            created_at,
            updated_at: None,
        }
    }
}

impl IndexedDocument for TodoDocument {
    const KIND: EntityKind = EntityKind::Todo;

    fn document_id(&self) -> String {
        self.id.to_string()
    }

    fn text_fields() -> &'static [(&'static str, f32)] {
        &[("title", 3.0), ("description", 1.0)]
    }

    fn index_settings() -> Value {
        json!({
            "settings": base_settings(),
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "title": {
                        "type": "text",
                        "fields": { "raw": { "type": "keyword" } }
                    },
                    "description": { "type": "text" },
                    "isCompleted": { "type": "boolean" },
                    "priority": { "type": "integer" },
                    "dueDate": { "type": "date" },
                    "createdAt": { "type": "date" },
                    "updatedAt": { "type": "date" }
                }
            }
        })
    }
}

/// Search projection of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDocument {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub material: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub manufacturer: Manufacturer,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IndexedDocument for ProductDocument {
    const KIND: EntityKind = EntityKind::Product;

    fn document_id(&self) -> String {
        self.id.to_string()
    }

    fn text_fields() -> &'static [(&'static str, f32)] {
        &[
            ("name", 3.0),
            ("description", 1.0),
            ("category", 1.5),
            ("material", 1.0),
            ("tags", 1.0),
        ]
    }

    fn index_settings() -> Value {
        json!({
            "settings": base_settings(),
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "name": {
                        "type": "text",
                        "fields": { "raw": { "type": "keyword" } }
                    },
                    "description": { "type": "text" },
                    "price": { "type": "double" },
                    "category": {
                        "type": "text",
                        "fields": { "raw": { "type": "keyword" } }
                    },
                    "material": {
                        "type": "text",
                        "fields": { "raw": { "type": "keyword" } }
                    },
                    "manufacturingDate": { "type": "date" },
                    "status": { "type": "keyword" },
                    "dimensions": {
                        "properties": {
                            "length": { "type": "double" },
                            "width": { "type": "double" },
                            "height": { "type": "double" }
                        }
                    },
                    "tags": { "type": "text" },
                    "manufacturer": {
                        "properties": {
                            "name": { "type": "text" },
                            "country": { "type": "keyword" }
                        }
                    },
                    "createdAt": { "type": "date" },
                    "updatedAt": { "type": "date" }
                }
            }
        })
    }
}
