//! # Derivation Engine
//!
//! Pure computations over typed sheet inputs: attribute levels, skill and
//! technique levels, trait costs, equipment cost and weight, hit locations
//! and point totals. Nothing here touches the graph; `snapshot` is the only
//! bridge from a `Session` into these types.

pub mod attribute;
pub mod damage;
pub mod equipment;
pub mod features;
pub mod formula;
pub mod locations;
pub mod skill;
pub mod snapshot;
pub mod totals;
pub mod trait_cost;
pub mod weapon;

pub use attribute::{AttributeDef, AttributeLevel, AttributeTable, default_attributes};
pub use damage::Dice;
pub use equipment::{Equipment, EquipmentModifier};
pub use features::{Feature, FeatureSet};
pub use formula::Formula;
pub use locations::{HitLocation, HitLocationData, LocationStatus};
pub use skill::{
    Difficulty, ResolvedSkill, Skill, SkillDefault, SkillEntry, SkillLike, SkillResolver, Spell,
    Technique,
};
pub use snapshot::{CharacterSnapshot, DerivedSheet};
pub use totals::{PointTotals, point_totals};
pub use trait_cost::{Trait, TraitCategory, TraitModifier};
pub use weapon::{MeleeWeapon, RangedWeapon};
