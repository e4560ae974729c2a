//! Last-writer-wins admission.
//!
//! The single rule deciding whether an externally observed change replaces
//! the value a consumer already holds.

use crate::Timestamp;
use crate::primitives::META_KEY;
use serde_json::Value;

/// `true` only when `incoming` is strictly newer than `current`.
///
/// A missing current stamp counts as zero; a missing incoming stamp is never
/// admitted. Ties keep the existing value.
#[must_use]
pub fn admit(current: Option<Timestamp>, incoming: Option<Timestamp>) -> bool {
    match incoming {
        Some(incoming) => incoming > current.unwrap_or_default(),
        None => false,
    }
}

/// Edit stamp carried by a stored value.
///
/// Payloads keep it under `__meta__.lastEdit`; MetaData rows carry
/// `lastEdit` at the top level.
#[must_use]
pub fn edit_stamp(value: &Value) -> Option<Timestamp> {
    value
        .get(META_KEY)
        .and_then(|meta| meta.get("lastEdit"))
        .or_else(|| value.get("lastEdit"))
        .and_then(Value::as_u64)
        .map(Timestamp)
}

/// Creation stamp carried by a stored value.
#[must_use]
pub fn created_stamp(value: &Value) -> Option<Timestamp> {
    value
        .get(META_KEY)
        .and_then(|meta| meta.get("createdOn"))
        .or_else(|| value.get("createdOn"))
        .and_then(Value::as_u64)
        .map(Timestamp)
}

/// Write `{ createdOn, lastEdit }` into a payload object.
///
/// Other keys under `__meta__` are kept. Non-object values are returned
/// unchanged.
#[must_use]
pub fn stamp(mut value: Value, created_on: Timestamp, last_edit: Timestamp) -> Value {
    if let Some(object) = value.as_object_mut() {
        let meta = object
            .entry(META_KEY)
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(serde_json::Map::new());
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("createdOn".to_string(), Value::from(created_on.millis()));
            meta.insert("lastEdit".to_string(), Value::from(last_edit.millis()));
        }
    }
    value
}
