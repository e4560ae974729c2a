//! # Validation
//!
//! The schema-validation collaborator. The mutation protocol asks it whether a
//! payload is acceptable before writing; a `false` answer skips the item.

use crate::RecordType;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decides whether a payload is acceptable for a record type.
pub trait Validator: Send + Sync {
    fn validate(&self, record_type: &RecordType, data: &Value) -> bool;
}

/// Accepts every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _record_type: &RecordType, _data: &Value) -> bool {
        true
    }
}

/// Requires payloads to be JSON objects carrying a fixed set of keys per type.
///
/// Types with no entry only need to be objects.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    fields: BTreeMap<RecordType, Vec<String>>,
}

impl RequiredFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require(mut self, record_type: &str, keys: &[&str]) -> Self {
        self.fields
            .entry(RecordType::new(record_type))
            .or_default()
            .extend(keys.iter().map(|k| (*k).to_string()));
        self
    }

    /// Minimal field requirements for sheet records.
    #[must_use]
    pub fn for_sheets() -> Self {
        use crate::types::record_types as t;
        Self::new()
            .require(t::SKILL, &["name"])
            .require(t::TECHNIQUE, &["name"])
            .require(t::SPELL, &["name"])
            .require(t::TRAIT, &["name"])
            .require(t::EQUIPMENT, &["description"])
    }
}

impl Validator for RequiredFields {
    fn validate(&self, record_type: &RecordType, data: &Value) -> bool {
        let Some(object) = data.as_object() else {
            return false;
        };
        self.fields
            .get(record_type)
            .is_none_or(|keys| keys.iter().all(|k| object.contains_key(k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_fields_checks_keys() {
        let v = RequiredFields::for_sheets();
        let skill = RecordType::new("skill");
        assert!(v.validate(&skill, &json!({"name": "Stealth"})));
        assert!(!v.validate(&skill, &json!({"points": 2})));
        assert!(!v.validate(&skill, &json!("Stealth")));
    }

    #[test]
    fn unlisted_types_only_need_objects() {
        let v = RequiredFields::new();
        assert!(v.validate(&RecordType::new("weapon"), &json!({})));
        assert!(AcceptAll.validate(&RecordType::new("weapon"), &json!(null)));
    }
}
