//! Features: bonuses granted by traits and equipped items to the rest of
//! the sheet.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One bonus. Unknown feature types are dropped by [`FeatureSet::extend_from`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Feature {
    #[serde(rename = "attribute bonus")]
    AttributeBonus { attribute: String, amount: f64 },
    #[serde(rename = "armor bonus")]
    ArmorBonus { location: String, amount: f64 },
    #[serde(rename = "skill bonus")]
    SkillBonus { name: String, amount: f64 },
    #[serde(rename = "dodge bonus")]
    DodgeBonus { amount: f64 },
}

/// Every active feature on a character.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Read the `features` array of a payload, skipping entries that do not
    /// parse.
    pub fn extend_from(&mut self, payload: &Value) {
        let Some(entries) = payload.get("features").and_then(Value::as_array) else {
            return;
        };
        for entry in entries {
            match serde_json::from_value::<Feature>(entry.clone()) {
                Ok(feature) => self.features.push(feature),
                Err(e) => tracing::debug!(error = %e, "ignoring feature"),
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    #[must_use]
    pub fn attribute_bonus(&self, signature: &str) -> f64 {
        self.sum(|f| match f {
            Feature::AttributeBonus { attribute, amount } if attribute == signature => Some(*amount),
            _ => None,
        })
    }

    /// Armor on a location; location names compare case-insensitively.
    #[must_use]
    pub fn armor_bonus(&self, location: &str) -> f64 {
        self.sum(|f| match f {
            Feature::ArmorBonus {
                location: target,
                amount,
            } if target.eq_ignore_ascii_case(location) => Some(*amount),
            _ => None,
        })
    }

    #[must_use]
    pub fn skill_bonus(&self, skill: &str) -> f64 {
        self.sum(|f| match f {
            Feature::SkillBonus { name, amount } if name.eq_ignore_ascii_case(skill) => Some(*amount),
            _ => None,
        })
    }

    #[must_use]
    pub fn dodge_bonus(&self) -> f64 {
        self.sum(|f| match f {
            Feature::DodgeBonus { amount } => Some(*amount),
            _ => None,
        })
    }

    fn sum(&self, pick: impl Fn(&Feature) -> Option<f64>) -> f64 {
        self.features.iter().filter_map(pick).sum()
    }
}
