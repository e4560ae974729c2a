//! # Collections
//!
//! One collection per record type, holding that type's JSON payloads.

use crate::{EntityId, RecordType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The payloads of a single record type.
#[derive(Debug, Clone)]
pub struct Collection {
    record_type: RecordType,
    records: BTreeMap<EntityId, Value>,
}

impl Collection {
    #[must_use]
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            records: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Value> {
        self.records.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Value)> {
        self.records.iter()
    }

    pub(crate) fn insert(&mut self, id: EntityId, value: Value) -> Option<Value> {
        self.records.insert(id, value)
    }

    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<Value> {
        self.records.remove(id)
    }
}

/// Shallow merge used by both collections and storage backends.
///
/// A non-object target is replaced by the patch.
pub fn merge_object(target: &mut Value, patch: &Map<String, Value>) {
    match target {
        Value::Object(map) => {
            for (key, value) in patch {
                map.insert(key.clone(), value.clone());
            }
        }
        other => *other = Value::Object(patch.clone()),
    }
}
