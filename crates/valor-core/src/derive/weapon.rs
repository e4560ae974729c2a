//! Melee and ranged weapons: attack level from the best default, defenses,
//! and damage strings resolved against striking strength.

use super::damage::{Dice, swing_for, thrust_for};
use super::skill::{SkillDefault, SkillResolver};
use crate::primitives::UNRESOLVED_LEVEL;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeleeWeapon {
    pub usage: String,
    pub damage: String,
    pub damage_type: String,
    pub reach: String,
    pub strength_requirement: String,
    pub attack_bonus: f64,
    pub parry_bonus: f64,
    pub block_bonus: f64,
    pub defaults: Vec<SkillDefault>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RangedWeapon {
    pub usage: String,
    pub damage: String,
    pub damage_type: String,
    pub accuracy: String,
    pub range: String,
    pub rate_of_fire: String,
    pub shots: String,
    pub recoil: f64,
    pub bulk: String,
    pub strength_requirement: String,
    pub attack_bonus: f64,
    pub defaults: Vec<SkillDefault>,
}

/// Highest level any default reaches, negative infinity when none applies.
pub fn best_attack_level(resolver: &mut SkillResolver<'_>, defaults: &[SkillDefault]) -> f64 {
    resolver
        .best_default(defaults, None)
        .map_or(UNRESOLVED_LEVEL, |(_, level)| level)
}

/// `floor(level / 2) + 3 + bonus`.
#[must_use]
pub fn parry_level(attack_level: f64, bonus: f64) -> f64 {
    (attack_level / 2.0).floor() + 3.0 + bonus
}

/// `floor(level / 2) + 3 + bonus`.
#[must_use]
pub fn block_level(attack_level: f64, bonus: f64) -> f64 {
    (attack_level / 2.0).floor() + 3.0 + bonus
}

/// Resolve `"sw+2"` or `"thr-1"` to dice for `strength`. Anything else is
/// not strength-based and yields `None`.
#[must_use]
pub fn resolve_damage(damage: &str, strength: i32) -> Option<Dice> {
    let s = damage.trim().to_lowercase();
    let (base, rest) = if let Some(rest) = s.strip_prefix("sw") {
        (swing_for(strength), rest)
    } else if let Some(rest) = s.strip_prefix("thr") {
        (thrust_for(strength), rest)
    } else {
        return None;
    };
    let rest = rest.split_whitespace().next().unwrap_or("");
    let modifier = if rest.is_empty() {
        0
    } else {
        rest.parse::<i32>().ok()?
    };
    Some(base.plus(modifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::skill::{Difficulty, Skill, SkillEntry};
    use std::collections::BTreeMap;

    #[test]
    fn defenses_halve_the_attack_level() {
        assert_eq!(parry_level(13.0, 0.0), 9.0);
        assert_eq!(parry_level(12.0, 1.0), 10.0);
        assert_eq!(block_level(11.0, 0.0), 8.0);
    }

    #[test]
    fn attack_level_from_defaults() {
        let entries = vec![SkillEntry::from(Skill::new("Broadsword", "DX", Difficulty::Average, 2.0))];
        let attrs = BTreeMap::from([("DX".to_string(), 12.0)]);
        let mut resolver = SkillResolver::new(&entries, &attrs);
        let defaults = [
            SkillDefault::attribute("DX", -5.0),
            SkillDefault::skill("Broadsword", 0.0),
        ];
        assert_eq!(best_attack_level(&mut resolver, &defaults), 12.0);
        assert_eq!(best_attack_level(&mut resolver, &[]), f64::NEG_INFINITY);
    }

    #[test]
    fn damage_strings() {
        assert_eq!(resolve_damage("sw+2", 10).map(|d| d.to_string()), Some("1d+2".into()));
        assert_eq!(resolve_damage("thr", 12).map(|d| d.to_string()), Some("1d-1".into()));
        assert_eq!(resolve_damage("thr+1 imp", 10).map(|d| d.to_string()), Some("1d-1".into()));
        assert_eq!(resolve_damage("2d+1", 10), None);
        assert_eq!(resolve_damage("sw+x", 10), None);
    }
}
