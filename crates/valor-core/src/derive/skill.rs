//! # Skill Resolution
//!
//! Skills, techniques and spells share one capability interface,
//! [`SkillLike`], and are stored side by side as [`SkillEntry`] variants.
//! A [`SkillResolver`] computes levels for a whole list at once:
//!
//! - skills and spells: attribute + relative level from points, or the best
//!   default when that is higher
//! - techniques: the default's base level plus points, clamped by `limit`
//!
//! Every level is total. No applicable default yields negative infinity,
//! and so does a default chain that loops back on itself.

use super::features::FeatureSet;
use crate::primitives::UNRESOLVED_LEVEL;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// DIFFICULTY & RELATIVE LEVEL
// =============================================================================

/// Difficulty tier of a skill-like entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "E")]
    Easy,
    #[default]
    #[serde(rename = "A")]
    Average,
    #[serde(rename = "H")]
    Hard,
    #[serde(rename = "VH")]
    VeryHard,
    #[serde(rename = "W")]
    Wildcard,
}

impl Difficulty {
    /// Level relative to the controlling attribute at one point.
    #[must_use]
    pub const fn base_relative_level(self) -> f64 {
        match self {
            Self::Easy => 0.0,
            Self::Average => -1.0,
            Self::Hard => -2.0,
            Self::VeryHard | Self::Wildcard => -3.0,
        }
    }
}

/// Map invested points to a level relative to the controlling attribute.
///
/// One point buys `base`, two points `base + 1`, four points `base + 2`,
/// then one more level per additional four points.
#[must_use]
pub fn calculate_relative_level(points: f64, base: f64) -> f64 {
    if points <= 0.0 {
        UNRESOLVED_LEVEL
    } else if points < 2.0 {
        base
    } else if points < 4.0 {
        base + 1.0
    } else {
        base + 1.0 + (points / 4.0).floor()
    }
}

// =============================================================================
// DEFAULTS
// =============================================================================

/// A fallback: another skill (`type: "Skill"`) or an attribute signature,
/// plus a flat modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDefault {
    #[serde(rename = "type")]
    pub source: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub modifier: f64,
}

impl SkillDefault {
    pub const SKILL_SOURCE: &'static str = "Skill";

    #[must_use]
    pub fn skill(name: &str, modifier: f64) -> Self {
        Self {
            source: Self::SKILL_SOURCE.to_string(),
            name: Some(name.to_string()),
            specialization: None,
            modifier,
        }
    }

    #[must_use]
    pub fn attribute(signature: &str, modifier: f64) -> Self {
        Self {
            source: signature.to_string(),
            name: None,
            specialization: None,
            modifier,
        }
    }

    #[must_use]
    pub fn is_skill_based(&self) -> bool {
        self.source.eq_ignore_ascii_case(Self::SKILL_SOURCE)
    }

    /// Whether this default names `skill`.
    #[must_use]
    pub fn matches(&self, skill: &dyn SkillLike) -> bool {
        if !self.is_skill_based() || skill.kind() != SkillKind::Skill {
            return false;
        }
        let name_matches = self
            .name
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(skill.name()));
        let specialization_matches = match (&self.specialization, skill.specialization()) {
            (None, _) => true,
            (Some(wanted), Some(have)) => wanted.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
        };
        name_matches && specialization_matches
    }
}

// =============================================================================
// SKILL-LIKE CAPABILITY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillKind {
    Skill,
    Technique,
    Spell,
}

/// Behavior shared by skills, techniques and spells.
pub trait SkillLike {
    fn kind(&self) -> SkillKind;
    fn name(&self) -> &str;
    fn difficulty(&self) -> Difficulty;
    fn points(&self) -> f64;
    fn defaults(&self) -> &[SkillDefault];
    fn defaulted_from(&self) -> Option<&SkillDefault>;

    fn specialization(&self) -> Option<&str> {
        None
    }

    fn encumbrance_penalty_multiple(&self) -> f64 {
        0.0
    }

    fn base_relative_level(&self) -> f64 {
        self.difficulty().base_relative_level()
    }

    /// Whether any of this entity's defaults names `other`.
    fn has_default_to(&self, other: &dyn SkillLike) -> bool {
        self.defaults().iter().any(|d| d.matches(other))
    }
}

fn dx() -> String {
    super::attribute::DX.to_string()
}

fn iq() -> String {
    super::attribute::IQ.to_string()
}

fn hard() -> Difficulty {
    Difficulty::Hard
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default = "dx")]
    pub signature: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub defaults: Vec<SkillDefault>,
    #[serde(default)]
    pub defaulted_from: Option<SkillDefault>,
    #[serde(default)]
    pub encumbrance_penalty_multiple: f64,
    #[serde(default)]
    pub tech_level: Option<String>,
}

impl Skill {
    #[must_use]
    pub fn new(name: &str, signature: &str, difficulty: Difficulty, points: f64) -> Self {
        Self {
            name: name.to_string(),
            specialization: None,
            signature: signature.to_string(),
            difficulty,
            points,
            defaults: Vec::new(),
            defaulted_from: None,
            encumbrance_penalty_multiple: 0.0,
            tech_level: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: SkillDefault) -> Self {
        self.defaults.push(default);
        self
    }
}

impl SkillLike for Skill {
    fn kind(&self) -> SkillKind {
        SkillKind::Skill
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
    fn points(&self) -> f64 {
        self.points
    }
    fn defaults(&self) -> &[SkillDefault] {
        &self.defaults
    }
    fn defaulted_from(&self) -> Option<&SkillDefault> {
        self.defaulted_from.as_ref()
    }
    fn specialization(&self) -> Option<&str> {
        self.specialization.as_deref()
    }
    fn encumbrance_penalty_multiple(&self) -> f64 {
        self.encumbrance_penalty_multiple
    }
}

/// A specialized maneuver bought up from a single default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technique {
    pub name: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub points: f64,
    pub default: SkillDefault,
    /// Highest level above the default's base. Zero means no limit.
    #[serde(default)]
    pub limit: Option<f64>,
}

impl Technique {
    #[must_use]
    pub fn new(name: &str, default: SkillDefault, difficulty: Difficulty, points: f64) -> Self {
        Self {
            name: name.to_string(),
            difficulty,
            points,
            default,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: f64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl SkillLike for Technique {
    fn kind(&self) -> SkillKind {
        SkillKind::Technique
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
    fn points(&self) -> f64 {
        self.points
    }
    fn defaults(&self) -> &[SkillDefault] {
        std::slice::from_ref(&self.default)
    }
    fn defaulted_from(&self) -> Option<&SkillDefault> {
        Some(&self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spell {
    pub name: String,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default = "iq")]
    pub signature: String,
    #[serde(default = "hard")]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub defaults: Vec<SkillDefault>,
    #[serde(default)]
    pub defaulted_from: Option<SkillDefault>,
}

impl SkillLike for Spell {
    fn kind(&self) -> SkillKind {
        SkillKind::Spell
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
    fn points(&self) -> f64 {
        self.points
    }
    fn defaults(&self) -> &[SkillDefault] {
        &self.defaults
    }
    fn defaulted_from(&self) -> Option<&SkillDefault> {
        self.defaulted_from.as_ref()
    }
}

/// Any skill-like entity, dispatched on its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SkillEntry {
    Skill(Skill),
    Technique(Technique),
    Spell(Spell),
}

impl SkillEntry {
    fn inner(&self) -> &dyn SkillLike {
        match self {
            Self::Skill(s) => s,
            Self::Technique(t) => t,
            Self::Spell(s) => s,
        }
    }

    /// Replace the candidate defaults. A technique keeps the first one.
    pub fn set_defaults(&mut self, defaults: Vec<SkillDefault>) {
        match self {
            Self::Skill(s) => s.defaults = defaults,
            Self::Spell(s) => s.defaults = defaults,
            Self::Technique(t) => {
                if let Some(first) = defaults.into_iter().next() {
                    t.default = first;
                }
            }
        }
    }

    fn set_defaulted_from(&mut self, default: Option<SkillDefault>) {
        match self {
            Self::Skill(s) => s.defaulted_from = default,
            Self::Spell(s) => s.defaulted_from = default,
            Self::Technique(_) => {}
        }
    }
}

impl SkillLike for SkillEntry {
    fn kind(&self) -> SkillKind {
        self.inner().kind()
    }
    fn name(&self) -> &str {
        self.inner().name()
    }
    fn difficulty(&self) -> Difficulty {
        self.inner().difficulty()
    }
    fn points(&self) -> f64 {
        self.inner().points()
    }
    fn defaults(&self) -> &[SkillDefault] {
        self.inner().defaults()
    }
    fn defaulted_from(&self) -> Option<&SkillDefault> {
        self.inner().defaulted_from()
    }
    fn specialization(&self) -> Option<&str> {
        self.inner().specialization()
    }
    fn encumbrance_penalty_multiple(&self) -> f64 {
        self.inner().encumbrance_penalty_multiple()
    }
}

impl From<Skill> for SkillEntry {
    fn from(skill: Skill) -> Self {
        Self::Skill(skill)
    }
}

impl From<Technique> for SkillEntry {
    fn from(technique: Technique) -> Self {
        Self::Technique(technique)
    }
}

impl From<Spell> for SkillEntry {
    fn from(spell: Spell) -> Self {
        Self::Spell(spell)
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Resolved view of one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSkill {
    pub name: String,
    pub kind: SkillKind,
    pub points: f64,
    pub level: f64,
    pub relative_level: f64,
    pub defaulted_from: Option<SkillDefault>,
}

/// Level computation over one list of entries, memoized per resolver.
pub struct SkillResolver<'a> {
    entries: &'a [SkillEntry],
    attributes: &'a BTreeMap<String, f64>,
    features: Option<&'a FeatureSet>,
    encumbrance_level: i32,
    memo: BTreeMap<usize, f64>,
    visiting: BTreeSet<usize>,
}

impl<'a> SkillResolver<'a> {
    #[must_use]
    pub fn new(entries: &'a [SkillEntry], attributes: &'a BTreeMap<String, f64>) -> Self {
        Self {
            entries,
            attributes,
            features: None,
            encumbrance_level: 0,
            memo: BTreeMap::new(),
            visiting: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_features(mut self, features: &'a FeatureSet) -> Self {
        self.features = Some(features);
        self
    }

    #[must_use]
    pub fn with_encumbrance(mut self, level: i32) -> Self {
        self.encumbrance_level = level;
        self
    }

    fn attribute(&self, signature: &str) -> f64 {
        self.attributes
            .get(signature)
            .copied()
            .unwrap_or(UNRESOLVED_LEVEL)
    }

    fn bonus(&self, name: &str) -> f64 {
        self.features.map_or(0.0, |f| f.skill_bonus(name))
    }

    /// Level of the entry at `index`.
    pub fn level(&mut self, index: usize) -> f64 {
        if let Some(level) = self.memo.get(&index) {
            return *level;
        }
        let entries = self.entries;
        let Some(entry) = entries.get(index) else {
            return UNRESOLVED_LEVEL;
        };
        if !self.visiting.insert(index) {
            return UNRESOLVED_LEVEL;
        }
        let level = match entry {
            SkillEntry::Skill(skill) => self.skill_level(index, entry, &skill.signature),
            SkillEntry::Spell(spell) => self.skill_level(index, entry, &spell.signature),
            SkillEntry::Technique(technique) => self.technique_level(index, technique),
        };
        self.visiting.remove(&index);
        self.memo.insert(index, level);
        level
    }

    /// Levels of every entry, in list order.
    pub fn levels(&mut self) -> Vec<f64> {
        (0..self.entries.len()).map(|i| self.level(i)).collect()
    }

    fn skill_level(&mut self, index: usize, entry: &SkillEntry, signature: &str) -> f64 {
        let from_points =
            self.attribute(signature) + calculate_relative_level(entry.points(), entry.base_relative_level());
        let from_default = self
            .best_default(entry.defaults(), Some(index))
            .map_or(UNRESOLVED_LEVEL, |(_, level)| level);
        let level = from_points.max(from_default);
        if level == UNRESOLVED_LEVEL {
            return level;
        }
        level
            + self.bonus(entry.name())
            + entry.encumbrance_penalty_multiple() * f64::from(self.encumbrance_level)
    }

    fn technique_level(&mut self, index: usize, technique: &Technique) -> f64 {
        let base = self.default_base(&technique.default, Some(index));
        if base == UNRESOLVED_LEVEL {
            return base;
        }
        let mut points = technique.points;
        if technique.difficulty == Difficulty::Hard {
            points -= 1.0;
        }
        let relative = if points > 0.0 { points } else { 0.0 };
        let mut level = base + technique.default.modifier + relative;
        if let Some(limit) = technique.limit.filter(|l| *l != 0.0) {
            level = level.min(base + limit);
        }
        level + self.bonus(&technique.name)
    }

    /// Level a default points at, before its modifier.
    ///
    /// Skill-based defaults use the highest-level skill matching the name,
    /// never the entry at `exclude`.
    fn default_base(&mut self, default: &SkillDefault, exclude: Option<usize>) -> f64 {
        if !default.is_skill_based() {
            return self.attribute(&default.source);
        }
        let entries = self.entries;
        let mut highest = UNRESOLVED_LEVEL;
        for (i, entry) in entries.iter().enumerate() {
            if Some(i) == exclude || !default.matches(entry) {
                continue;
            }
            highest = highest.max(self.level(i));
        }
        highest
    }

    /// Level reached through `default`, modifier included.
    pub fn default_level(&mut self, default: &SkillDefault, exclude: Option<usize>) -> f64 {
        let base = self.default_base(default, exclude);
        if base == UNRESOLVED_LEVEL {
            return base;
        }
        base + default.modifier
    }

    /// Best default among `defaults` as `(position, level)`. Ties go to the
    /// earliest default; `None` when no default resolves.
    pub fn best_default(
        &mut self,
        defaults: &[SkillDefault],
        exclude: Option<usize>,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, default) in defaults.iter().enumerate() {
            let level = self.default_level(default, exclude);
            if level == UNRESOLVED_LEVEL {
                continue;
            }
            if best.is_none_or(|(_, current)| level > current) {
                best = Some((i, level));
            }
        }
        best
    }

    /// Level above the controlling attribute (skills, spells) or above the
    /// default's base (techniques).
    pub fn relative_level(&mut self, index: usize) -> f64 {
        let level = self.level(index);
        let entries = self.entries;
        let base = match entries.get(index) {
            Some(SkillEntry::Skill(s)) => self.attribute(&s.signature),
            Some(SkillEntry::Spell(s)) => self.attribute(&s.signature),
            Some(SkillEntry::Technique(t)) => self.default_base(&t.default, Some(index)),
            None => return UNRESOLVED_LEVEL,
        };
        if level == UNRESOLVED_LEVEL || base == UNRESOLVED_LEVEL {
            return UNRESOLVED_LEVEL;
        }
        level - base
    }

    /// Resolved view of every entry, in list order.
    pub fn resolve_all(&mut self) -> Vec<ResolvedSkill> {
        let entries = self.entries;
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| ResolvedSkill {
                name: entry.name().to_string(),
                kind: entry.kind(),
                points: entry.points(),
                level: self.level(i),
                relative_level: self.relative_level(i),
                defaulted_from: entry.defaulted_from().cloned(),
            })
            .collect()
    }
}

// =============================================================================
// DEFAULT SWAPPING
// =============================================================================

/// Recompute `defaulted_from` of one entry against its current defaults and
/// return its level.
pub fn refresh_defaulted_from(
    entries: &mut [SkillEntry],
    index: usize,
    attributes: &BTreeMap<String, f64>,
) -> f64 {
    let (chosen, level) = {
        let shared: &[SkillEntry] = entries;
        let Some(entry) = shared.get(index) else {
            return UNRESOLVED_LEVEL;
        };
        let mut resolver = SkillResolver::new(shared, attributes);
        let chosen = resolver
            .best_default(entry.defaults(), Some(index))
            .and_then(|(i, _)| entry.defaults().get(i).cloned());
        (chosen, resolver.level(index))
    };
    if let Some(entry) = entries.get_mut(index) {
        entry.set_defaulted_from(chosen);
    }
    level
}

/// Replace the defaults of one entry and re-resolve it.
pub fn swap_default(
    entries: &mut [SkillEntry],
    index: usize,
    defaults: Vec<SkillDefault>,
    attributes: &BTreeMap<String, f64>,
) -> f64 {
    let Some(entry) = entries.get_mut(index) else {
        return UNRESOLVED_LEVEL;
    };
    entry.set_defaults(defaults);
    refresh_defaulted_from(entries, index, attributes)
}

/// Refresh `defaulted_from` on every entry.
pub fn refresh_all(entries: &mut [SkillEntry], attributes: &BTreeMap<String, f64>) {
    for index in 0..entries.len() {
        refresh_defaulted_from(entries, index, attributes);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("ST".to_string(), 10.0),
            ("DX".to_string(), 12.0),
            ("IQ".to_string(), 11.0),
        ])
    }

    #[test]
    fn relative_level_progression() {
        assert_eq!(calculate_relative_level(0.0, -1.0), f64::NEG_INFINITY);
        assert_eq!(calculate_relative_level(1.0, -1.0), -1.0);
        assert_eq!(calculate_relative_level(2.0, -1.0), 0.0);
        assert_eq!(calculate_relative_level(4.0, -1.0), 1.0);
        assert_eq!(calculate_relative_level(8.0, -1.0), 2.0);
        assert_eq!(calculate_relative_level(12.0, 0.0), 4.0);
    }

    #[test]
    fn baselines_by_difficulty() {
        assert_eq!(Difficulty::Easy.base_relative_level(), 0.0);
        assert_eq!(Difficulty::Average.base_relative_level(), -1.0);
        assert_eq!(Difficulty::Hard.base_relative_level(), -2.0);
        assert_eq!(Difficulty::VeryHard.base_relative_level(), -3.0);
        assert_eq!(Difficulty::Wildcard.base_relative_level(), -3.0);
    }

    #[test]
    fn skill_from_points() {
        let entries = vec![SkillEntry::from(Skill::new("Broadsword", "DX", Difficulty::Average, 4.0))];
        let attrs = attributes();
        let mut resolver = SkillResolver::new(&entries, &attrs);
        assert_eq!(resolver.level(0), 13.0);
        assert_eq!(resolver.relative_level(0), 1.0);
    }

    #[test]
    fn best_default_wins_and_ties_go_first() {
        let entries = vec![
            SkillEntry::from(Skill::new("Broadsword", "DX", Difficulty::Average, 4.0)),
            SkillEntry::from(Skill::new("Shortsword", "DX", Difficulty::Average, 0.0)),
        ];
        let attrs = attributes();
        let mut resolver = SkillResolver::new(&entries, &attrs);
        let defaults = [
            SkillDefault::attribute("DX", -4.0),
            SkillDefault::skill("Broadsword", -2.0),
            SkillDefault::attribute("ST", 1.0),
        ];
        assert_eq!(resolver.best_default(&defaults, None), Some((1, 11.0)));

        let tied = [SkillDefault::attribute("DX", -1.0), SkillDefault::attribute("IQ", 0.0)];
        assert_eq!(resolver.best_default(&tied, None), Some((0, 11.0)));
        assert_eq!(
            resolver.best_default(&[SkillDefault::skill("Lance", 0.0)], None),
            None
        );
    }

    #[test]
    fn unbought_skill_uses_default() {
        let entries = vec![
            SkillEntry::from(Skill::new("Broadsword", "DX", Difficulty::Average, 4.0)),
            SkillEntry::from(
                Skill::new("Shortsword", "DX", Difficulty::Average, 0.0)
                    .with_default(SkillDefault::skill("Broadsword", -2.0))
                    .with_default(SkillDefault::attribute("DX", -4.0)),
            ),
        ];
        let attrs = attributes();
        let mut resolver = SkillResolver::new(&entries, &attrs);
        assert_eq!(resolver.level(1), 11.0);
    }

    #[test]
    fn default_cycles_do_not_recurse() {
        let entries = vec![
            SkillEntry::from(
                Skill::new("A", "DX", Difficulty::Average, 0.0)
                    .with_default(SkillDefault::skill("B", 0.0)),
            ),
            SkillEntry::from(
                Skill::new("B", "DX", Difficulty::Average, 0.0)
                    .with_default(SkillDefault::skill("A", 0.0)),
            ),
        ];
        let attrs = attributes();
        let mut resolver = SkillResolver::new(&entries, &attrs);
        assert_eq!(resolver.level(0), f64::NEG_INFINITY);
        assert_eq!(resolver.level(1), f64::NEG_INFINITY);
    }

    #[test]
    fn technique_is_clamped_by_limit() {
        let entries = vec![
            SkillEntry::from(Skill::new("Karate", "DX", Difficulty::Hard, 0.0)
                .with_default(SkillDefault::attribute("DX", 0.0))),
            SkillEntry::from(
                Technique::new("Kicking", SkillDefault::skill("Karate", 0.0), Difficulty::Average, 4.0)
                    .with_limit(1.0),
            ),
        ];
        let attrs = attributes();
        let mut resolver = SkillResolver::new(&entries, &attrs);
        assert_eq!(resolver.level(0), 12.0);
        assert_eq!(resolver.level(1), 13.0);
        assert_eq!(resolver.relative_level(1), 1.0);
    }

    #[test]
    fn hard_technique_pays_entry_point() {
        let entries = vec![
            SkillEntry::from(Skill::new("Karate", "DX", Difficulty::Hard, 4.0)),
            SkillEntry::from(Technique::new(
                "Kicking",
                SkillDefault::skill("Karate", -2.0),
                Difficulty::Hard,
                3.0,
            )),
        ];
        let attrs = attributes();
        let mut resolver = SkillResolver::new(&entries, &attrs);
        assert_eq!(resolver.level(0), 12.0);
        assert_eq!(resolver.level(1), 12.0);
    }

    #[test]
    fn technique_without_target_is_unresolved() {
        let entries = vec![SkillEntry::from(Technique::new(
            "Disarming",
            SkillDefault::skill("Rapier", -1.0),
            Difficulty::Hard,
            2.0,
        ))];
        let attrs = attributes();
        assert_eq!(SkillResolver::new(&entries, &attrs).level(0), f64::NEG_INFINITY);
    }

    #[test]
    fn bonuses_and_encumbrance_apply() {
        let mut skill = Skill::new("Climbing", "DX", Difficulty::Average, 2.0);
        skill.encumbrance_penalty_multiple = 1.0;
        let entries = vec![SkillEntry::from(skill)];
        let attrs = attributes();
        let mut features = FeatureSet::new();
        features.push(super::super::features::Feature::SkillBonus {
            name: "Climbing".into(),
            amount: 2.0,
        });
        let mut resolver = SkillResolver::new(&entries, &attrs)
            .with_features(&features)
            .with_encumbrance(-2);
        assert_eq!(resolver.level(0), 12.0);
    }

    #[test]
    fn swapping_defaults_refreshes_defaulted_from() {
        let mut entries = vec![
            SkillEntry::from(Skill::new("Broadsword", "DX", Difficulty::Average, 4.0)),
            SkillEntry::from(
                Skill::new("Shortsword", "DX", Difficulty::Average, 0.0)
                    .with_default(SkillDefault::skill("Broadsword", -2.0)),
            ),
        ];
        let attrs = attributes();
        assert_eq!(refresh_defaulted_from(&mut entries, 1, &attrs), 11.0);
        assert_eq!(
            entries[1].defaulted_from(),
            Some(&SkillDefault::skill("Broadsword", -2.0))
        );

        let level = swap_default(
            &mut entries,
            1,
            vec![SkillDefault::attribute("DX", -4.0)],
            &attrs,
        );
        assert_eq!(level, 8.0);
        assert_eq!(
            entries[1].defaulted_from(),
            Some(&SkillDefault::attribute("DX", -4.0))
        );

        swap_default(&mut entries, 1, Vec::new(), &attrs);
        assert_eq!(entries[1].defaulted_from(), None);
    }

    #[test]
    fn has_default_to_matches_names_and_specializations() {
        let mut sword = Skill::new("Broadsword", "DX", Difficulty::Average, 1.0);
        sword.specialization = Some("Bastard".into());
        let shortsword = Skill::new("Shortsword", "DX", Difficulty::Average, 0.0)
            .with_default(SkillDefault::skill("broadsword", -2.0));
        assert!(shortsword.has_default_to(&sword));

        let mut picky = SkillDefault::skill("Broadsword", -2.0);
        picky.specialization = Some("Other".into());
        let fussy = Skill::new("Fussy", "DX", Difficulty::Average, 0.0).with_default(picky);
        assert!(!fussy.has_default_to(&sword));
    }

    #[test]
    fn entries_deserialize_from_payloads() {
        let spell: Spell = serde_json::from_value(serde_json::json!({
            "name": "Fireball", "points": 1
        }))
        .expect("spell");
        assert_eq!(spell.difficulty, Difficulty::Hard);
        assert_eq!(spell.signature, "IQ");

        let technique: Technique = serde_json::from_value(serde_json::json!({
            "name": "Feint", "difficulty": "H", "points": 2,
            "default": {"type": "Skill", "name": "Karate", "modifier": 0},
            "limit": 4
        }))
        .expect("technique");
        assert_eq!(technique.limit, Some(4.0));
        assert!(technique.default.is_skill_based());
    }
}
