//! Broker wire format for change events.
//!
//! One UTF-8 JSON object per event. Snapshot fields sit at the top level in
//! camelCase next to the entity `id` and two envelope fields:
//!
//! ```json
//! {"eventType":"created","entityKind":"todo","id":"…","title":"Buy milk","createdAt":"…"}
//! ```
//!
//! Deletions carry the envelope and the id only. Field names are matched
//! without regard to case (or `_`/`-` separators) on receipt.

use serde_json::{Map, Value};

use search_sync_shared::{ChangeEvent, EntitySnapshot};

pub const EVENT_TYPE_FIELD: &str = "eventType";
pub const ENTITY_KIND_FIELD: &str = "entityKind";
pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Every field name the wire format knows, in canonical spelling.
const KNOWN_FIELDS: &[&str] = &[
    EVENT_TYPE_FIELD,
    ENTITY_KIND_FIELD,
    ID_FIELD,
    CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
    "title",
    "description",
    "isCompleted",
    "priority",
    "dueDate",
    "name",
    "price",
    "category",
    "material",
    "manufacturingDate",
    "status",
    "dimensions",
    "length",
    "width",
    "height",
    "tags",
    "manufacturer",
    "country",
];

/// Serialize an event to its wire payload.
pub fn encode(event: &ChangeEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&encode_value(event)?)
}

fn encode_value(event: &ChangeEvent) -> Result<Value, serde_json::Error> {
    let snapshot = match event.snapshot() {
        Some(EntitySnapshot::Todo(todo)) => serde_json::to_value(todo)?,
        Some(EntitySnapshot::Product(product)) => serde_json::to_value(product)?,
        None => Value::Object(Map::new()),
    };

    let mut fields = match snapshot {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.insert(ID_FIELD.to_string(), Value::String(event.id.to_string()));
    fields.insert(
        EVENT_TYPE_FIELD.to_string(),
        Value::String(event.operation().as_str().to_string()),
    );
    fields.insert(
        ENTITY_KIND_FIELD.to_string(),
        Value::String(event.kind.as_str().to_string()),
    );

    Ok(Value::Object(fields))
}

/// Rename known fields to their canonical spelling and drop `null` fields,
/// recursively. Unknown fields keep their name.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (canonical_key(&k), canonicalize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn canonical_key(key: &str) -> String {
    let folded = fold(key);
    KNOWN_FIELDS
        .iter()
        .find(|known| fold(known) == folded)
        .map(|known| known.to_string())
        .unwrap_or_else(|| key.to_string())
}

fn fold(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
