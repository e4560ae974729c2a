//! Change-feed events.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a change observed on a storage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One `{table, key, type, value}` change, as delivered by an external feed
/// or published on a session's change bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub key: EntityId,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub value: Option<Value>,
}

impl ChangeEvent {
    #[must_use]
    pub fn upsert(table: &str, key: &EntityId, kind: ChangeKind, value: Value) -> Self {
        Self {
            table: table.to_string(),
            key: key.clone(),
            kind,
            value: Some(value),
        }
    }

    #[must_use]
    pub fn delete(table: &str, key: &EntityId) -> Self {
        Self {
            table: table.to_string(),
            key: key.clone(),
            kind: ChangeKind::Delete,
            value: None,
        }
    }

    /// `true` when this event concerns the record `table`/`key`.
    #[must_use]
    pub fn targets(&self, table: &str, key: &EntityId) -> bool {
        self.table == table && &self.key == key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wire_shape() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "table": "skill",
            "key": "s1",
            "type": "delete"
        }))
        .expect("decode");
        assert_eq!(event.kind, ChangeKind::Delete);
        assert!(event.value.is_none());
        assert!(event.targets("skill", &EntityId::new("s1")));
    }
}
