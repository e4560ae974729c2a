//! # Character Snapshot
//!
//! Bridges the entity graph and the derivation engine. A snapshot walks the
//! enabled subtree of one character, decodes each payload into its typed
//! input and leaves the graph untouched. Payloads that do not decode are
//! skipped with a debug log rather than failing the whole sheet.

use super::attribute::{
    AttributeDef, AttributeLevel, AttributeTable, FALLBACK_STRENGTH, HP, SPEED, ST, basic_lift,
    default_attributes, dodge, encumbered_dodge, encumbrance_level,
};
use super::damage::{swing_for, thrust_for};
use super::equipment::{
    Equipment, EquipmentModifier, adjusted_value, adjusted_weight, extended_value, extended_weight,
};
use super::features::{Feature, FeatureSet};
use super::locations::{HitLocationData, LocationStatus, default_locations, parse_hit_locations};
use super::skill::{ResolvedSkill, Skill, SkillEntry, SkillResolver, Spell, Technique};
use super::totals::{PointTotals, point_totals};
use super::trait_cost::{Trait, TraitCategory, TraitModifier, adjusted_points, trait_category};
use super::weapon::{MeleeWeapon, RangedWeapon, best_attack_level, block_level, parry_level, resolve_damage};
use crate::metadata::MetaData;
use crate::primitives::MAX_TRAVERSAL_DEPTH;
use crate::types::record_types::{
    CHARACTER, EQUIPMENT, EQUIPMENT_MODIFIER, MELEE_WEAPON, RANGED_WEAPON, SKILL, SPELL, TECHNIQUE,
    TRAIT, TRAIT_MODIFIER,
};
use crate::session::Session;
use crate::{EntityId, Identity, ValorError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CHARACTER PAYLOAD
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CharacterConfig {
    attributes: Option<BTreeMap<String, AttributeDef>>,
    locations: Option<BTreeMap<String, HitLocationData>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CharacterProfile {
    name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CharacterData {
    point_total: f64,
    config: CharacterConfig,
    profile: CharacterProfile,
    attribute_levels: BTreeMap<String, AttributeLevel>,
    hit_location_damage: BTreeMap<String, f64>,
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Typed derivation inputs for one character.
#[derive(Debug, Clone)]
pub struct CharacterSnapshot {
    pub character: Identity,
    pub name: Option<String>,
    pub budget: f64,
    pub attributes: AttributeTable,
    /// Top-level traits; nested traits live in `children`.
    pub traits: Vec<Trait>,
    pub skills: Vec<SkillEntry>,
    /// Top-level items; contents live in `children`.
    pub equipment: Vec<Equipment>,
    pub melee_weapons: Vec<MeleeWeapon>,
    pub ranged_weapons: Vec<RangedWeapon>,
    pub locations: BTreeMap<String, HitLocationData>,
    pub hit_location_damage: BTreeMap<String, f64>,
    pub features: FeatureSet,
}

fn decode<T: DeserializeOwned>(session: &Session, meta: &MetaData) -> Option<T> {
    let value = session.record(&meta.id)?;
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::debug!(id = %meta.id, kind = %meta.record_type, error = %e, "skipping payload");
            None
        }
    }
}

/// Enabled children of `meta`, in index order.
fn enabled_children<'s>(session: &'s Session, meta: &MetaData) -> Vec<&'s MetaData> {
    meta.child_identities()
        .filter_map(|child| session.read(&child.id))
        .filter(|child| child.enabled)
        .collect()
}

/// A modifier entity is active unless its payload says otherwise.
fn payload_enabled(session: &Session, meta: &MetaData) -> bool {
    session
        .record(&meta.id)
        .and_then(|v| v.get("enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

fn build_trait(session: &Session, meta: &MetaData, depth: usize) -> Option<Trait> {
    let mut t: Trait = decode(session, meta)?;
    for child in enabled_children(session, meta) {
        match child.record_type.as_str() {
            TRAIT_MODIFIER => {
                if let Some(mut modifier) = decode::<TraitModifier>(session, child) {
                    modifier.enabled = payload_enabled(session, child);
                    t.modifiers.push(modifier);
                }
            }
            TRAIT if depth < MAX_TRAVERSAL_DEPTH => {
                if let Some(nested) = build_trait(session, child, depth + 1) {
                    t.children.push(nested);
                }
            }
            _ => {}
        }
    }
    Some(t)
}

fn build_equipment(session: &Session, meta: &MetaData, depth: usize) -> Option<Equipment> {
    let mut item: Equipment = decode(session, meta)?;
    item.container |= meta.can_contain_children;
    for child in enabled_children(session, meta) {
        match child.record_type.as_str() {
            EQUIPMENT_MODIFIER => {
                if let Some(mut modifier) = decode::<EquipmentModifier>(session, child) {
                    modifier.enabled = payload_enabled(session, child);
                    item.modifiers.push(modifier);
                }
            }
            EQUIPMENT if depth < MAX_TRAVERSAL_DEPTH => {
                if let Some(nested) = build_equipment(session, child, depth + 1) {
                    item.children.push(nested);
                }
            }
            _ => {}
        }
    }
    Some(item)
}

impl CharacterSnapshot {
    /// Collect the enabled subtree of character `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` is absent, `InvalidRecord` when it is not a
    /// character.
    pub fn from_session(session: &Session, id: &EntityId) -> Result<Self, ValorError> {
        let root = session
            .read(id)
            .ok_or_else(|| ValorError::NotFound(id.to_string()))?;
        if root.record_type.as_str() != CHARACTER {
            return Err(ValorError::InvalidRecord(format!(
                "{} is a {}, not a character",
                id, root.record_type
            )));
        }
        let data: CharacterData = decode(session, root).unwrap_or_default();

        let mut snapshot = Self {
            character: root.identity(),
            name: data.profile.name,
            budget: data.point_total,
            attributes: AttributeTable::new(data.config.attributes.unwrap_or_else(default_attributes))
                .with_levels(data.attribute_levels),
            traits: Vec::new(),
            skills: Vec::new(),
            equipment: Vec::new(),
            melee_weapons: Vec::new(),
            ranged_weapons: Vec::new(),
            locations: data.config.locations.unwrap_or_else(default_locations),
            hit_location_damage: data.hit_location_damage,
            features: FeatureSet::new(),
        };

        let mut stack: Vec<&MetaData> = enabled_children(session, root);
        stack.reverse();
        let mut visited = BTreeSet::from([root.id.clone()]);

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id.clone()) {
                continue;
            }
            snapshot.collect(session, node);
            let mut children = enabled_children(session, node);
            children.reverse();
            stack.extend(children);
        }
        Ok(snapshot)
    }

    fn collect(&mut self, session: &Session, node: &MetaData) {
        let parent_type = node
            .parent
            .as_ref()
            .map(|p| p.record_type.as_str())
            .unwrap_or_default();
        let payload = session.record(&node.id);

        match node.record_type.as_str() {
            TRAIT => {
                if parent_type != TRAIT
                    && let Some(t) = build_trait(session, node, 0)
                {
                    self.traits.push(t);
                }
                if let Some(payload) = payload {
                    self.features.extend_from(payload);
                }
            }
            EQUIPMENT => {
                if parent_type != EQUIPMENT
                    && let Some(item) = build_equipment(session, node, 0)
                {
                    self.equipment.push(item);
                }
                let equipped = payload
                    .and_then(|v| v.get("equipped"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if equipped && let Some(payload) = payload {
                    self.features.extend_from(payload);
                }
            }
            SKILL => {
                if let Some(skill) = decode::<Skill>(session, node) {
                    self.skills.push(skill.into());
                }
            }
            TECHNIQUE => {
                if let Some(technique) = decode::<Technique>(session, node) {
                    self.skills.push(technique.into());
                }
            }
            SPELL => {
                if let Some(spell) = decode::<Spell>(session, node) {
                    self.skills.push(spell.into());
                }
            }
            MELEE_WEAPON => {
                if let Some(weapon) = decode(session, node) {
                    self.melee_weapons.push(weapon);
                }
            }
            RANGED_WEAPON => {
                if let Some(weapon) = decode(session, node) {
                    self.ranged_weapons.push(weapon);
                }
            }
            _ => {}
        }
    }

    /// Attribute table with feature bonuses applied.
    #[must_use]
    pub fn effective_attributes(&self) -> AttributeTable {
        let mut table = self.attributes.clone();
        for feature in self.features.iter() {
            if let Feature::AttributeBonus { attribute, amount } = feature {
                table.add_bonus(attribute, *amount);
            }
        }
        table
    }

    #[must_use]
    pub fn totals(&self) -> PointTotals {
        point_totals(&self.attributes, &self.traits, &self.skills, self.budget)
    }

    /// Every derived value of the sheet.
    #[must_use]
    pub fn derive(&self) -> DerivedSheet {
        let table = self.effective_attributes();
        let levels = table.levels();
        let level_or = |signature: &str, fallback: f64| {
            levels
                .get(signature)
                .copied()
                .filter(|l| l.is_finite())
                .unwrap_or(fallback)
        };

        let strength = level_or(ST, FALLBACK_STRENGTH);
        let lift = basic_lift(strength);
        let carried: f64 = self.equipment.iter().map(extended_weight).sum();
        let encumbrance = encumbrance_level(lift, carried);
        let base_dodge = dodge(level_or(SPEED, 0.0), self.features.dodge_bonus());
        let striking = strength.floor() as i32;

        let mut resolver = SkillResolver::new(&self.skills, &levels)
            .with_features(&self.features)
            .with_encumbrance(encumbrance);
        let skills = resolver.resolve_all();

        let melee = self
            .melee_weapons
            .iter()
            .map(|w| {
                let level = best_attack_level(&mut resolver, &w.defaults);
                DerivedMelee {
                    usage: w.usage.clone(),
                    level,
                    parry: parry_level(level, w.parry_bonus),
                    block: block_level(level, w.block_bonus),
                    damage: damage_text(&w.damage, striking),
                }
            })
            .collect();
        let ranged = self
            .ranged_weapons
            .iter()
            .map(|w| DerivedRanged {
                usage: w.usage.clone(),
                level: best_attack_level(&mut resolver, &w.defaults),
                damage: damage_text(&w.damage, striking),
            })
            .collect();

        let hit_points = level_or(HP, 10.0);
        let locations = parse_hit_locations(&self.locations)
            .into_iter()
            .map(|(name, location)| {
                let taken = self.hit_location_damage.get(&name).copied().unwrap_or(0.0);
                let armor = self.features.armor_bonus(&name);
                let status = LocationStatus::new(&location, hit_points, taken, armor);
                (name, status)
            })
            .collect();

        DerivedSheet {
            character: self.character.clone(),
            name: self.name.clone(),
            attributes: table
                .signatures()
                .map(|s| {
                    (s.to_string(), DerivedAttribute {
                        level: levels.get(s).copied().unwrap_or(f64::NEG_INFINITY),
                        points: table.points_spent(s),
                    })
                })
                .collect(),
            basic_lift: lift,
            carried_weight: carried,
            encumbrance_level: encumbrance,
            dodge: base_dodge,
            encumbered_dodge: encumbered_dodge(base_dodge, encumbrance),
            thrust: thrust_for(striking).to_string(),
            swing: swing_for(striking).to_string(),
            skills,
            traits: self
                .traits
                .iter()
                .map(|t| DerivedTrait {
                    name: t.name.clone(),
                    category: trait_category(t),
                    adjusted_points: adjusted_points(t),
                })
                .collect(),
            equipment: self
                .equipment
                .iter()
                .map(|item| DerivedEquipment {
                    description: item.description.clone(),
                    quantity: item.quantity,
                    adjusted_value: adjusted_value(item),
                    adjusted_weight: adjusted_weight(item),
                    extended_value: extended_value(item),
                    extended_weight: extended_weight(item),
                })
                .collect(),
            melee_weapons: melee,
            ranged_weapons: ranged,
            locations,
            totals: self.totals(),
        }
    }
}

fn damage_text(damage: &str, strength: i32) -> String {
    resolve_damage(damage, strength).map_or_else(|| damage.to_string(), |d| d.to_string())
}

// =============================================================================
// DERIVED SHEET
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAttribute {
    pub level: f64,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTrait {
    pub name: String,
    pub category: TraitCategory,
    pub adjusted_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEquipment {
    pub description: String,
    pub quantity: f64,
    pub adjusted_value: f64,
    pub adjusted_weight: f64,
    pub extended_value: f64,
    pub extended_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMelee {
    pub usage: String,
    pub level: f64,
    pub parry: f64,
    pub block: f64,
    pub damage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRanged {
    pub usage: String,
    pub level: f64,
    pub damage: String,
}

/// Everything a sheet shows that is computed rather than entered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSheet {
    pub character: Identity,
    pub name: Option<String>,
    pub attributes: BTreeMap<String, DerivedAttribute>,
    pub basic_lift: f64,
    pub carried_weight: f64,
    pub encumbrance_level: i32,
    pub dodge: f64,
    pub encumbered_dodge: f64,
    pub thrust: String,
    pub swing: String,
    pub skills: Vec<ResolvedSkill>,
    pub traits: Vec<DerivedTrait>,
    pub equipment: Vec<DerivedEquipment>,
    pub melee_weapons: Vec<DerivedMelee>,
    pub ranged_weapons: Vec<DerivedRanged>,
    pub locations: BTreeMap<String, LocationStatus>,
    pub totals: PointTotals,
}

// =============================================================================
// TESTS
// =============================================================================
