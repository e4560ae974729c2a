//! # Attribute Resolution
//!
//! Attributes form a dependency graph: each one either holds an
//! independently bought level or computes its base from other attributes
//! through a [`Formula`]. Resolution is pull-based and memoized per pass;
//! a dependency cycle resolves to negative infinity instead of recursing.

use super::formula::Formula;
use crate::primitives::UNRESOLVED_LEVEL;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const ST: &str = "ST";
pub const DX: &str = "DX";
pub const IQ: &str = "IQ";
pub const HT: &str = "HT";
pub const WILL: &str = "Will";
pub const PER: &str = "Per";
pub const SPEED: &str = "Speed";
pub const MOVE: &str = "Move";
pub const HP: &str = "HP";
pub const FP: &str = "FP";

/// Level used for strength-driven values when a sheet has no ST.
pub const FALLBACK_STRENGTH: f64 = 10.0;

// =============================================================================
// DEFINITIONS
// =============================================================================

/// Static definition of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDef {
    pub cost_per_level: f64,
    #[serde(default)]
    pub default_level: f64,
    #[serde(default)]
    pub based_on: Option<Formula>,
}

impl AttributeDef {
    #[must_use]
    pub fn bought(cost_per_level: f64, default_level: f64) -> Self {
        Self {
            cost_per_level,
            default_level,
            based_on: None,
        }
    }

    #[must_use]
    pub fn computed(cost_per_level: f64, based_on: Formula) -> Self {
        Self {
            cost_per_level,
            default_level: 0.0,
            based_on: Some(based_on),
        }
    }
}

/// Per-character purchase state of one attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeLevel {
    pub levels_increased: f64,
}

/// The standard attribute table.
#[must_use]
pub fn default_attributes() -> BTreeMap<String, AttributeDef> {
    BTreeMap::from([
        (ST.to_string(), AttributeDef::bought(10.0, 10.0)),
        (DX.to_string(), AttributeDef::bought(20.0, 10.0)),
        (IQ.to_string(), AttributeDef::bought(20.0, 10.0)),
        (HT.to_string(), AttributeDef::bought(10.0, 10.0)),
        (WILL.to_string(), AttributeDef::computed(5.0, Formula::attr(IQ))),
        (PER.to_string(), AttributeDef::computed(5.0, Formula::attr(IQ))),
        (
            SPEED.to_string(),
            AttributeDef::computed(
                20.0,
                Formula::sum(vec![Formula::attr(DX), Formula::attr(HT)]).div(4.0),
            ),
        ),
        (
            MOVE.to_string(),
            AttributeDef::computed(5.0, Formula::attr(SPEED).floor()),
        ),
        (HP.to_string(), AttributeDef::computed(2.0, Formula::attr(ST))),
        (FP.to_string(), AttributeDef::computed(3.0, Formula::attr(HT))),
    ])
}

// =============================================================================
// ATTRIBUTE TABLE
// =============================================================================

/// Definitions plus a character's purchases and feature bonuses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTable {
    defs: BTreeMap<String, AttributeDef>,
    levels: BTreeMap<String, AttributeLevel>,
    bonuses: BTreeMap<String, f64>,
}

impl AttributeTable {
    #[must_use]
    pub fn new(defs: BTreeMap<String, AttributeDef>) -> Self {
        Self {
            defs,
            ..Self::default()
        }
    }

    /// Table over [`default_attributes`].
    #[must_use]
    pub fn standard() -> Self {
        Self::new(default_attributes())
    }

    #[must_use]
    pub fn with_levels(mut self, levels: BTreeMap<String, AttributeLevel>) -> Self {
        self.levels = levels;
        self
    }

    pub fn set_levels_increased(&mut self, signature: &str, levels: f64) {
        self.levels
            .insert(signature.to_string(), AttributeLevel { levels_increased: levels });
    }

    /// Add a flat bonus from a feature. Bonuses to the same attribute stack.
    pub fn add_bonus(&mut self, signature: &str, amount: f64) {
        *self.bonuses.entry(signature.to_string()).or_insert(0.0) += amount;
    }

    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    #[must_use]
    pub fn def(&self, signature: &str) -> Option<&AttributeDef> {
        self.defs.get(signature)
    }

    fn levels_increased(&self, signature: &str) -> f64 {
        self.levels
            .get(signature)
            .map_or(0.0, |l| l.levels_increased)
    }

    /// Resolved level of one attribute, `None` when it is not defined.
    #[must_use]
    pub fn level(&self, signature: &str) -> Option<f64> {
        self.defs.get(signature)?;
        let mut pass = ResolvePass::default();
        Some(self.resolve(signature, &mut pass))
    }

    /// Every attribute resolved in one memoized pass.
    #[must_use]
    pub fn levels(&self) -> BTreeMap<String, f64> {
        let mut pass = ResolvePass::default();
        for signature in self.defs.keys() {
            self.resolve(signature, &mut pass);
        }
        pass.memo
    }

    /// `levels_increased × cost_per_level`. Undefined attributes cost nothing.
    #[must_use]
    pub fn points_spent(&self, signature: &str) -> f64 {
        self.defs
            .get(signature)
            .map_or(0.0, |def| self.levels_increased(signature) * def.cost_per_level)
    }

    /// Total spend across every defined attribute.
    #[must_use]
    pub fn total_points(&self) -> f64 {
        self.defs.keys().map(|s| self.points_spent(s)).sum()
    }

    fn resolve(&self, signature: &str, pass: &mut ResolvePass) -> f64 {
        if let Some(level) = pass.memo.get(signature) {
            return *level;
        }
        let Some(def) = self.defs.get(signature) else {
            return UNRESOLVED_LEVEL;
        };
        if !pass.visiting.insert(signature.to_string()) {
            tracing::debug!(signature, "attribute dependency cycle");
            return UNRESOLVED_LEVEL;
        }

        let base = match &def.based_on {
            Some(formula) => formula.eval(&mut |dep| self.resolve(dep, pass)),
            None => def.default_level,
        };
        let bonus = self.bonuses.get(signature).copied().unwrap_or(0.0);
        let level = base + self.levels_increased(signature) + bonus;

        pass.visiting.remove(signature);
        pass.memo.insert(signature.to_string(), level);
        level
    }
}

#[derive(Default)]
struct ResolvePass {
    memo: BTreeMap<String, f64>,
    visiting: BTreeSet<String>,
}

// =============================================================================
// LIFT, ENCUMBRANCE, DODGE
// =============================================================================

/// `round(ST² / 5)`.
#[must_use]
pub fn basic_lift(strength: f64) -> f64 {
    (strength * strength / 5.0).round()
}

/// Encumbrance level for `carried` weight: 0 (none) down to -4 (extra-heavy),
/// -5 when overloaded.
#[must_use]
pub fn encumbrance_level(basic_lift: f64, carried: f64) -> i32 {
    const THRESHOLDS: [f64; 5] = [1.0, 2.0, 3.0, 6.0, 10.0];
    THRESHOLDS
        .iter()
        .position(|multiple| carried < basic_lift * multiple)
        .map_or(-5, |i| -(i as i32))
}

/// `floor(Speed + bonus + 3)`.
#[must_use]
pub fn dodge(speed: f64, bonus: f64) -> f64 {
    (speed + bonus + 3.0).floor()
}

/// Dodge reduced by encumbrance; zero when overloaded.
#[must_use]
pub fn encumbered_dodge(dodge: f64, encumbrance_level: i32) -> f64 {
    const FACTORS: [f64; 5] = [1.0, 0.8, 0.6, 0.4, 0.2];
    usize::try_from(-encumbrance_level)
        .ok()
        .and_then(|i| FACTORS.get(i))
        .map_or(0.0, |factor| (dodge * factor).floor())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table(st: f64, dx: f64, ht: f64) -> AttributeTable {
        let mut table = AttributeTable::standard();
        table.set_levels_increased(ST, st - 10.0);
        table.set_levels_increased(DX, dx - 10.0);
        table.set_levels_increased(HT, ht - 10.0);
        table
    }

    #[test]
    fn speed_and_move_follow_dx_and_ht() {
        let table = table(10.0, 13.0, 12.0);
        assert_eq!(table.level(SPEED), Some(6.25));
        assert_eq!(table.level(MOVE), Some(6.0));
        assert_eq!(table.level(HP), Some(10.0));
    }

    #[test]
    fn points_are_levels_times_cost() {
        let table = table(10.0, 13.0, 12.0);
        assert_eq!(table.points_spent(DX), 60.0);
        assert_eq!(table.points_spent(HT), 20.0);
        assert_eq!(table.points_spent(ST), 0.0);
        assert_eq!(table.total_points(), 80.0);
    }

    #[test]
    fn bonuses_and_purchases_on_computed_attributes() {
        let mut table = table(12.0, 10.0, 10.0);
        table.set_levels_increased(HP, 2.0);
        table.add_bonus(ST, 1.0);
        assert_eq!(table.level(ST), Some(13.0));
        assert_eq!(table.level(HP), Some(15.0));
        assert_eq!(table.points_spent(HP), 4.0);
    }

    #[test]
    fn cycles_resolve_to_negative_infinity() {
        let defs = BTreeMap::from([
            ("A".to_string(), AttributeDef::computed(1.0, Formula::attr("B"))),
            ("B".to_string(), AttributeDef::computed(1.0, Formula::attr("A"))),
        ]);
        let table = AttributeTable::new(defs);
        assert_eq!(table.level("A"), Some(f64::NEG_INFINITY));
        assert_eq!(table.level("missing"), None);
    }

    #[test]
    fn all_levels_in_one_pass() {
        let levels = table(11.0, 12.0, 12.0).levels();
        assert_eq!(levels.len(), 10);
        assert_eq!(levels[SPEED], 6.0);
        assert_eq!(levels[WILL], 10.0);
    }

    #[test]
    fn lift_and_encumbrance() {
        assert_eq!(basic_lift(10.0), 20.0);
        assert_eq!(basic_lift(12.0), 29.0);
        assert_eq!(encumbrance_level(20.0, 0.0), 0);
        assert_eq!(encumbrance_level(20.0, 20.0), -1);
        assert_eq!(encumbrance_level(20.0, 59.0), -2);
        assert_eq!(encumbrance_level(20.0, 119.0), -3);
        assert_eq!(encumbrance_level(20.0, 199.0), -4);
        assert_eq!(encumbrance_level(20.0, 200.0), -5);
    }

    #[test]
    fn dodge_scales_with_encumbrance() {
        let base = dodge(6.25, 0.0);
        assert_eq!(base, 9.0);
        assert_eq!(encumbered_dodge(base, 0), 9.0);
        assert_eq!(encumbered_dodge(base, -2), 5.0);
        assert_eq!(encumbered_dodge(base, -5), 0.0);
    }
}
