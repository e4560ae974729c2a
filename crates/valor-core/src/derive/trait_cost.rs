//! # Trait Cost
//!
//! Point cost of advantages, disadvantages and the rest, after modifiers
//! and control rating, plus the category a trait (or trait container) is
//! filed under for point totals.
//!
//! Rounding is asymmetric on purpose: costs round up unless the trait asks
//! to round down.

use crate::primitives::LIMITATION_FLOOR;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// CONTROL RATING
// =============================================================================

/// How often a character can resist the trait. Serialized as `"none"`, the
/// roll target (6, 9, 12, 15) or `"n/a"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ControlRating {
    CannotResist,
    ResistRarely,
    ResistFairlyOften,
    ResistQuiteOften,
    ResistAlmostAlways,
    #[default]
    NoneRequired,
}

impl ControlRating {
    /// Factor applied to the modified cost.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::CannotResist => 2.5,
            Self::ResistRarely => 2.0,
            Self::ResistFairlyOften => 1.5,
            Self::ResistQuiteOften | Self::NoneRequired => 1.0,
            Self::ResistAlmostAlways => 0.5,
        }
    }
}

impl TryFrom<Value> for ControlRating {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(Self::NoneRequired),
            Value::String(s) if s == "none" => Ok(Self::CannotResist),
            Value::String(s) if s == "n/a" => Ok(Self::NoneRequired),
            Value::Number(n) => match n.as_i64() {
                Some(6) => Ok(Self::ResistRarely),
                Some(9) => Ok(Self::ResistFairlyOften),
                Some(12) => Ok(Self::ResistQuiteOften),
                Some(15) => Ok(Self::ResistAlmostAlways),
                _ => Err(format!("unknown control rating {value}")),
            },
            _ => Err(format!("unknown control rating {value}")),
        }
    }
}

impl From<ControlRating> for Value {
    fn from(rating: ControlRating) -> Self {
        match rating {
            ControlRating::CannotResist => Value::from("none"),
            ControlRating::ResistRarely => Value::from(6),
            ControlRating::ResistFairlyOften => Value::from(9),
            ControlRating::ResistQuiteOften => Value::from(12),
            ControlRating::ResistAlmostAlways => Value::from(15),
            ControlRating::NoneRequired => Value::from("n/a"),
        }
    }
}

// =============================================================================
// MODIFIERS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierCostType {
    Percentage,
    #[default]
    Points,
    Multiplier,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierAffects {
    #[serde(rename = "base only")]
    Base,
    #[serde(rename = "levels only")]
    Levels,
    #[default]
    #[serde(rename = "total")]
    Total,
}

fn one() -> f64 {
    1.0
}

/// An enhancement or limitation on a trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitModifier {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub cost_type: ModifierCostType,
    #[serde(default = "one")]
    pub levels: f64,
    #[serde(default)]
    pub has_levels: bool,
    #[serde(default)]
    pub affects: ModifierAffects,
}

impl TraitModifier {
    /// An enabled modifier.
    #[must_use]
    pub fn new(cost_type: ModifierCostType, cost: f64, affects: ModifierAffects) -> Self {
        Self {
            name: String::new(),
            enabled: true,
            cost,
            cost_type,
            levels: 1.0,
            has_levels: false,
            affects,
        }
    }

    #[must_use]
    pub fn leveled(mut self, levels: f64) -> Self {
        self.has_levels = true;
        self.levels = levels;
        self
    }

    /// `cost × levels` for leveled modifiers, `cost` otherwise.
    #[must_use]
    pub fn amount(&self) -> f64 {
        if self.has_levels && self.levels > 0.0 {
            self.cost * self.levels
        } else {
            self.cost
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitCategory {
    Advantage,
    Perk,
    Disadvantage,
    Quirk,
    Feature,
    Racial,
    Meta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Trait {
    pub name: String,
    pub base_points: f64,
    pub has_levels: bool,
    pub levels: f64,
    pub points_per_level: f64,
    pub allow_half_level: bool,
    pub has_half_level: bool,
    pub round_down: bool,
    pub control_rating: ControlRating,
    /// Mental, Physical, Social, Exotic.
    pub types: Vec<String>,
    /// Free-form tags that may name a category.
    pub categories: Vec<String>,
    pub modifiers: Vec<TraitModifier>,
    /// Nested traits when this trait is a container.
    pub children: Vec<Trait>,
}

impl Trait {
    #[must_use]
    pub fn new(name: &str, base_points: f64) -> Self {
        Self {
            name: name.to_string(),
            base_points,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn leveled(mut self, levels: f64, points_per_level: f64) -> Self {
        self.has_levels = true;
        self.levels = levels;
        self.points_per_level = points_per_level;
        self
    }

    #[must_use]
    pub fn with_modifier(mut self, modifier: TraitModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    #[must_use]
    pub fn tagged(mut self, category: &str) -> Self {
        self.categories.push(category.to_string());
        self
    }

    #[must_use]
    pub fn containing(mut self, children: Vec<Trait>) -> Self {
        self.children = children;
        self
    }
}

/// `points` adjusted by `modifier` percent.
#[must_use]
pub fn modify_points(points: f64, modifier: f64) -> f64 {
    points + points * (modifier / 100.0)
}

/// Floor when `round_down`, ceiling otherwise.
#[must_use]
pub fn apply_rounding(value: f64, round_down: bool) -> f64 {
    if round_down { value.floor() } else { value.ceil() }
}

/// Cost of one trait, ignoring its children.
#[must_use]
pub fn calculate_trait_cost(t: &Trait) -> f64 {
    let mut base_points = t.base_points;
    let mut points_per_level = t.points_per_level;
    let mut multiplier = t.control_rating.multiplier();
    let (mut base_enh, mut base_lim, mut level_enh, mut level_lim) = (0.0, 0.0, 0.0, 0.0);

    for modifier in t.modifiers.iter().filter(|m| m.enabled) {
        let amount = modifier.amount();
        match modifier.cost_type {
            ModifierCostType::Percentage => {
                let (on_base, on_levels) = match modifier.affects {
                    ModifierAffects::Total => (true, true),
                    ModifierAffects::Base => (true, false),
                    ModifierAffects::Levels => (false, true),
                };
                if on_base {
                    if amount < 0.0 {
                        base_lim += amount;
                    } else {
                        base_enh += amount;
                    }
                }
                if on_levels {
                    if amount < 0.0 {
                        level_lim += amount;
                    } else {
                        level_enh += amount;
                    }
                }
            }
            ModifierCostType::Points => match modifier.affects {
                ModifierAffects::Levels => points_per_level += amount,
                ModifierAffects::Base | ModifierAffects::Total => base_points += amount,
            },
            ModifierCostType::Multiplier => multiplier *= amount,
        }
    }

    let leveled_points = if t.has_levels {
        let half = if t.has_half_level { 0.5 } else { 0.0 };
        let points = points_per_level * (t.levels + half);
        if points.is_nan() { 0.0 } else { points }
    } else {
        0.0
    };

    let has_percentages = [base_enh, base_lim, level_enh, level_lim]
        .iter()
        .any(|p| *p != 0.0);
    let modified = if has_percentages {
        let base_mod = (base_enh + base_lim).max(LIMITATION_FLOOR);
        let level_mod = (level_enh + level_lim).max(LIMITATION_FLOOR);
        if base_mod == level_mod {
            modify_points(base_points + leveled_points, base_mod)
        } else {
            modify_points(base_points, base_mod) + modify_points(leveled_points, level_mod)
        }
    } else {
        base_points + leveled_points
    };

    let cost = apply_rounding(modified * multiplier, t.round_down);
    // NaN and negative zero both read as zero.
    if cost.is_nan() || cost == 0.0 { 0.0 } else { cost }
}

/// Own cost plus the adjusted points of every nested trait.
#[must_use]
pub fn adjusted_points(t: &Trait) -> f64 {
    calculate_trait_cost(t) + t.children.iter().map(adjusted_points).sum::<f64>()
}

// =============================================================================
// CATEGORIES
// =============================================================================

#[must_use]
pub fn is_advantage(t: &Trait) -> bool {
    t.base_points > 1.0 || t.points_per_level > 1.0 || calculate_trait_cost(t) > 1.0
}

#[must_use]
pub fn is_perk(t: &Trait) -> bool {
    (t.base_points == 1.0 || t.base_points == 0.0)
        && (!t.has_levels || t.points_per_level == 1.0)
        && calculate_trait_cost(t) != 0.0
}

#[must_use]
pub fn is_disadvantage(t: &Trait) -> bool {
    t.base_points < -1.0 || t.points_per_level < -1.0 || calculate_trait_cost(t) < -1.0
}

#[must_use]
pub fn is_quirk(t: &Trait) -> bool {
    (t.base_points == -1.0 || t.base_points == 0.0)
        && (!t.has_levels || t.points_per_level == -1.0)
        && calculate_trait_cost(t) != 0.0
}

#[must_use]
pub fn is_feature(t: &Trait) -> bool {
    t.base_points == 0.0 && t.points_per_level == 0.0 && calculate_trait_cost(t) == 0.0
}

/// Category named by free-form tags, checked in a fixed order so that
/// "disadvantage" is never read as "advantage".
#[must_use]
pub fn category_from_tags(tags: &[String]) -> Option<TraitCategory> {
    const ORDER: [(&str, TraitCategory); 7] = [
        ("meta", TraitCategory::Meta),
        ("racial", TraitCategory::Racial),
        ("quirk", TraitCategory::Quirk),
        ("disadvantage", TraitCategory::Disadvantage),
        ("perk", TraitCategory::Perk),
        ("advantage", TraitCategory::Advantage),
        ("feature", TraitCategory::Feature),
    ];
    let joined = tags.join(" ").to_lowercase();
    ORDER
        .iter()
        .find(|(needle, _)| joined.contains(needle))
        .map(|(_, category)| *category)
}

/// Category of a trait: containers defer to their children, then tags,
/// then the sign and size of the cost.
#[must_use]
pub fn trait_category(t: &Trait) -> TraitCategory {
    if !t.children.is_empty() {
        return container_category(&t.children);
    }
    if let Some(category) = category_from_tags(&t.categories) {
        return category;
    }
    if is_disadvantage(t) {
        TraitCategory::Disadvantage
    } else if is_quirk(t) {
        TraitCategory::Quirk
    } else if is_advantage(t) {
        TraitCategory::Advantage
    } else if is_perk(t) {
        TraitCategory::Perk
    } else if is_feature(t) {
        TraitCategory::Feature
    } else {
        TraitCategory::Meta
    }
}

/// Category of a container from its children.
///
/// Homogeneous children share their category. Mixed children lean toward
/// disadvantage when no advantage or perk is present, toward advantage when
/// no disadvantage or quirk is present, and are meta otherwise.
#[must_use]
pub fn container_category(children: &[Trait]) -> TraitCategory {
    const HOMOGENEOUS: [TraitCategory; 6] = [
        TraitCategory::Racial,
        TraitCategory::Advantage,
        TraitCategory::Perk,
        TraitCategory::Disadvantage,
        TraitCategory::Quirk,
        TraitCategory::Feature,
    ];
    let categories: Vec<TraitCategory> = children.iter().map(trait_category).collect();
    if let Some(shared) = HOMOGENEOUS
        .iter()
        .find(|c| categories.iter().all(|t| t == *c))
    {
        return *shared;
    }
    let has = |c: TraitCategory| categories.contains(&c);
    let positive = has(TraitCategory::Advantage) || has(TraitCategory::Perk);
    let negative = has(TraitCategory::Disadvantage) || has(TraitCategory::Quirk);
    match (positive, negative) {
        (false, true) => TraitCategory::Disadvantage,
        (true, false) => TraitCategory::Advantage,
        _ => TraitCategory::Meta,
    }
}

/// Traits grouped by category. Every trait lands in exactly one bucket.
#[must_use]
pub fn split(traits: &[Trait]) -> BTreeMap<TraitCategory, Vec<&Trait>> {
    let mut buckets: BTreeMap<TraitCategory, Vec<&Trait>> = BTreeMap::new();
    for t in traits {
        buckets.entry(trait_category(t)).or_default().push(t);
    }
    buckets
}

/// Sum of adjusted points.
#[must_use]
pub fn sum_traits(traits: &[&Trait]) -> f64 {
    traits.iter().map(|t| adjusted_points(t)).sum()
}

// =============================================================================
// TESTS
// =============================================================================
