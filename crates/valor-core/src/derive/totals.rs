//! Character point totals.

use super::attribute::AttributeTable;
use super::skill::{SkillEntry, SkillKind, SkillLike};
use super::trait_cost::{Trait, TraitCategory, split, sum_traits};
use serde::Serialize;

/// Where a character's points went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTotals {
    pub racial_points: f64,
    pub attribute_points: f64,
    pub advantages: f64,
    pub perks: f64,
    pub disadvantages: f64,
    pub quirks: f64,
    pub skills: f64,
    pub techniques: f64,
    pub spells: f64,
    /// Sum of every spend above.
    pub total: f64,
    /// Points the character was built on.
    pub budget: f64,
    pub unspent: f64,
}

/// Tally points across attributes, top-level traits and skill-likes.
#[must_use]
pub fn point_totals(
    attributes: &AttributeTable,
    traits: &[Trait],
    skills: &[SkillEntry],
    budget: f64,
) -> PointTotals {
    let buckets = split(traits);
    let bucket = |category: TraitCategory| buckets.get(&category).map_or(0.0, |t| sum_traits(t));
    let skill_points = |kind: SkillKind| -> f64 {
        skills
            .iter()
            .filter(|s| s.kind() == kind)
            .map(|s| s.points())
            .sum()
    };

    let mut totals = PointTotals {
        racial_points: bucket(TraitCategory::Racial),
        attribute_points: attributes.total_points(),
        advantages: bucket(TraitCategory::Advantage),
        perks: bucket(TraitCategory::Perk),
        disadvantages: bucket(TraitCategory::Disadvantage),
        quirks: bucket(TraitCategory::Quirk),
        skills: skill_points(SkillKind::Skill),
        techniques: skill_points(SkillKind::Technique),
        spells: skill_points(SkillKind::Spell),
        budget,
        ..PointTotals::default()
    };
    totals.total = totals.racial_points
        + totals.attribute_points
        + totals.advantages
        + totals.perks
        + totals.disadvantages
        + totals.quirks
        + totals.skills
        + totals.techniques
        + totals.spells;
    totals.unspent = budget - totals.total;
    totals
}
