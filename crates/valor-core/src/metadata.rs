//! # MetaData
//!
//! The structural record kept for every entity, separate from its payload.
//! Graph queries (children, trail, descendants) only ever touch these rows.

use crate::{EntityId, Identity, RecordType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Children index: type -> (id -> identity).
pub type ChildIndex = BTreeMap<RecordType, BTreeMap<EntityId, Identity>>;

/// Flag set on entities created with `temporary: true`.
pub const TEMPORARY_FLAG: &str = "temporary";

/// Structural description of one entity's position in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// External-system id -> local id.
    #[serde(default)]
    pub alternative_ids: BTreeMap<String, EntityId>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub flags: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub parent: Option<Identity>,
    #[serde(default)]
    pub can_contain_children: bool,
    #[serde(default)]
    pub children: ChildIndex,
    #[serde(default)]
    pub created_on: Timestamp,
    #[serde(default)]
    pub last_edit: Timestamp,
}

fn enabled_default() -> bool {
    true
}

impl MetaData {
    /// A fresh row: enabled, no parent, no children.
    #[must_use]
    pub fn new(identity: &Identity, created_on: Timestamp) -> Self {
        Self {
            id: identity.id.clone(),
            record_type: identity.record_type.clone(),
            alternative_ids: BTreeMap::new(),
            enabled: true,
            flags: BTreeMap::new(),
            parent: None,
            can_contain_children: false,
            children: BTreeMap::new(),
            created_on,
            last_edit: created_on,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            record_type: self.record_type.clone(),
        }
    }

    /// Every child identity, ordered by type then id.
    pub fn child_identities(&self) -> impl DoubleEndedIterator<Item = &Identity> {
        self.children.values().flat_map(|branch| branch.values())
    }

    #[must_use]
    pub fn has_child(&self, child: &Identity) -> bool {
        self.children
            .get(&child.record_type)
            .is_some_and(|branch| branch.contains_key(&child.id))
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.flags
            .get(TEMPORARY_FLAG)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub(crate) fn insert_child(&mut self, child: Identity) {
        self.children
            .entry(child.record_type.clone())
            .or_default()
            .insert(child.id.clone(), child);
    }

    /// Removes a child entry, dropping the type branch once it is empty.
    pub(crate) fn remove_child(&mut self, child: &Identity) -> bool {
        let Some(branch) = self.children.get_mut(&child.record_type) else {
            return false;
        };
        let removed = branch.remove(&child.id).is_some();
        if branch.is_empty() {
            self.children.remove(&child.record_type);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_is_enabled_and_detached() {
        let meta = MetaData::new(&Identity::new("a", "skill"), Timestamp(5));
        assert!(meta.enabled);
        assert!(meta.parent.is_none());
        assert!(!meta.can_contain_children);
        assert!(meta.children.is_empty());
        assert_eq!(meta.created_on, Timestamp(5));
    }

    #[test]
    fn child_entries_round_trip() {
        let mut meta = MetaData::new(&Identity::new("p", "character"), Timestamp(1));
        let child = Identity::new("c", "skill");
        meta.insert_child(child.clone());
        assert!(meta.has_child(&child));
        assert!(meta.remove_child(&child));
        assert!(!meta.has_child(&child));
        assert!(meta.children.is_empty());
        assert!(!meta.remove_child(&child));
    }

    #[test]
    fn children_iterate_from_both_ends() {
        let mut meta = MetaData::new(&Identity::new("p", "character"), Timestamp(1));
        meta.insert_child(Identity::new("b", "skill"));
        meta.insert_child(Identity::new("a", "skill"));
        meta.insert_child(Identity::new("z", "equipment"));
        let forward: Vec<_> = meta.child_identities().map(|c| c.id.as_str()).collect();
        let backward: Vec<_> = meta.child_identities().rev().map(|c| c.id.as_str()).collect();
        assert_eq!(forward, ["z", "a", "b"]);
        assert_eq!(backward, ["b", "a", "z"]);
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let json = serde_json::json!({
            "id": "x",
            "type": "trait",
            "canContainChildren": true,
            "lastEdit": 42
        });
        let meta: MetaData = serde_json::from_value(json).expect("decode");
        assert!(meta.enabled);
        assert!(meta.can_contain_children);
        assert_eq!(meta.last_edit, Timestamp(42));
    }
}
