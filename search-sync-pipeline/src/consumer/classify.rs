//! Turn raw broker payloads into change events.
//!
//! Messages tagged with an `eventType` discriminant are decoded directly.
//! Untagged messages from older producers are classified by their shape:
//!
//! | fields present                     | operation |
//! |------------------------------------|-----------|
//! | `createdAt`, no `updatedAt`        | created   |
//! | `updatedAt`                        | updated   |
//! | nothing but `id`                   | deleted   |
//!
//! Anything else is unclassifiable.

use serde_json::{Map, Value};
use uuid::Uuid;

use search_sync_shared::{
    Change, ChangeEvent, EntityKind, EntitySnapshot, Operation, ProductSnapshot, TodoSnapshot,
};

use crate::errors::ClassifyError;
use crate::wire::{
    canonicalize, CREATED_AT_FIELD, ENTITY_KIND_FIELD, EVENT_TYPE_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};

/// How a message's operation was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedBy {
    Discriminant,
    Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub event: ChangeEvent,
    pub by: ClassifiedBy,
}

/// Classify a message payload.
///
/// `default_kind` applies when the payload does not name its entity kind,
/// which is the case for every untagged message.
pub fn classify(payload: Option<&[u8]>, default_kind: EntityKind) -> Result<Classified, ClassifyError> {
    let bytes = match payload {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(ClassifyError::EmptyPayload),
    };
    let text = std::str::from_utf8(bytes).map_err(|_| ClassifyError::InvalidUtf8)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| ClassifyError::InvalidJson(e.to_string()))?;

    let mut fields = match canonicalize(value) {
        Value::Object(fields) => fields,
        _ => return Err(ClassifyError::NotAnObject),
    };

    let kind = match fields.remove(ENTITY_KIND_FIELD) {
        Some(tag) => {
            let tag = tag_string(tag);
            EntityKind::parse(&tag).ok_or(ClassifyError::UnknownKind(tag))?
        }
        None => default_kind,
    };
    let declared = fields
        .remove(EVENT_TYPE_FIELD)
        .map(|tag| {
            let tag = tag_string(tag);
            Operation::parse(&tag).ok_or(ClassifyError::UnknownEventType(tag))
        })
        .transpose()?;

    let id = match fields.remove(ID_FIELD) {
        Some(Value::String(raw)) => {
            Uuid::parse_str(raw.trim()).map_err(|_| ClassifyError::InvalidId(raw))?
        }
        Some(other) => return Err(ClassifyError::InvalidId(other.to_string())),
        None => return Err(ClassifyError::MissingId),
    };

    let (operation, by) = match declared {
        Some(operation) => (operation, ClassifiedBy::Discriminant),
        None => (infer_operation(&fields)?, ClassifiedBy::Shape),
    };

    let change = match operation {
        Operation::Created => Change::Created(decode_snapshot(kind, fields)?),
        Operation::Updated => Change::Updated(decode_snapshot(kind, fields)?),
        Operation::Deleted => Change::Deleted,
    };

    let event = ChangeEvent { kind, id, change };
    event.validate()?;

    Ok(Classified { event, by })
}

/// Infer the operation of an untagged payload from the fields besides `id`.
fn infer_operation(fields: &Map<String, Value>) -> Result<Operation, ClassifyError> {
    let has_created = fields.contains_key(CREATED_AT_FIELD);
    let has_updated = fields.contains_key(UPDATED_AT_FIELD);

    match (has_created, has_updated) {
        (_, true) => Ok(Operation::Updated),
        (true, false) => Ok(Operation::Created),
        (false, false) if fields.is_empty() => Ok(Operation::Deleted),
        (false, false) => Err(ClassifyError::Unclassifiable),
    }
}

fn decode_snapshot(kind: EntityKind, fields: Map<String, Value>) -> Result<EntitySnapshot, ClassifyError> {
    let value = Value::Object(fields);
    let decoded = match kind {
        EntityKind::Todo => serde_json::from_value::<TodoSnapshot>(value).map(EntitySnapshot::from),
        EntityKind::Product => {
            serde_json::from_value::<ProductSnapshot>(value).map(EntitySnapshot::from)
        }
    };
    decoded.map_err(|e| ClassifyError::Payload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

fn tag_string(tag: Value) -> String {
    match tag {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
