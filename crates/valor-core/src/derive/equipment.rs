//! # Equipment Pipelines
//!
//! Cost and weight of an item after its modifiers, and the extended totals
//! of whole container trees.
//!
//! Both pipelines run four named steps in order. Modifier amounts are
//! strings whose shape picks the contribution kind: `"+10"`, `"20%"`,
//! `"x2"`, `"-0.5 cf"`, `"x50%"`.

use crate::primitives::{MAX_TRAVERSAL_DEPTH, MIN_COST_FACTOR};
use serde::{Deserialize, Serialize};

// =============================================================================
// MODIFIER STRINGS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CostStep {
    #[default]
    #[serde(rename = "to_original_cost")]
    Original,
    #[serde(rename = "to_base_cost")]
    Base,
    #[serde(rename = "to_final_base_cost")]
    FinalBase,
    #[serde(rename = "to_final_cost")]
    Final,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WeightStep {
    #[default]
    #[serde(rename = "to_original_weight")]
    Original,
    #[serde(rename = "to_base_weight")]
    Base,
    #[serde(rename = "to_final_base_weight")]
    FinalBase,
    #[serde(rename = "to_final_weight")]
    Final,
}

/// How a cost string contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostValueKind {
    Addition,
    Percentage,
    Multiplier,
    CostFactor,
}

/// How a weight string contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightValueKind {
    Addition,
    PercentageAdder,
    PercentageMultiplier,
    Multiplier,
}

#[must_use]
pub fn cost_value_kind(raw: &str) -> CostValueKind {
    let s = raw.trim().to_lowercase();
    if s.ends_with("cf") {
        CostValueKind::CostFactor
    } else if s.ends_with('%') {
        CostValueKind::Percentage
    } else if s.starts_with('x') || s.ends_with('x') {
        CostValueKind::Multiplier
    } else {
        CostValueKind::Addition
    }
}

#[must_use]
pub fn weight_value_kind(raw: &str) -> WeightValueKind {
    let s = raw.trim().to_lowercase();
    if s.ends_with('%') {
        if s.starts_with('x') {
            WeightValueKind::PercentageMultiplier
        } else {
            WeightValueKind::PercentageAdder
        }
    } else if s.starts_with('x') || s.ends_with('x') {
        WeightValueKind::Multiplier
    } else {
        WeightValueKind::Addition
    }
}

/// Leading number of a modifier string, ignoring any `x` prefix and unit
/// suffix. Unparseable strings read as zero.
#[must_use]
pub fn extract_value(raw: &str) -> f64 {
    let s = raw.trim();
    let s = s
        .strip_prefix(|c: char| c.eq_ignore_ascii_case(&'x'))
        .unwrap_or(s)
        .trim_start();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '+' || *c == '-'))))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().unwrap_or(0.0)
}

// =============================================================================
// ITEMS
// =============================================================================

fn one() -> f64 {
    1.0
}

fn yes() -> bool {
    true
}

/// A modifier attached to an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentModifier {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cost: String,
    #[serde(default)]
    pub cost_type: CostStep,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub weight_type: WeightStep,
}

impl EquipmentModifier {
    /// An enabled modifier touching cost only.
    #[must_use]
    pub fn cost(step: CostStep, amount: &str) -> Self {
        Self {
            enabled: true,
            cost: amount.to_string(),
            cost_type: step,
            ..Self::default()
        }
    }

    /// An enabled modifier touching weight only.
    #[must_use]
    pub fn weight(step: WeightStep, amount: &str) -> Self {
        Self {
            enabled: true,
            weight: amount.to_string(),
            weight_type: step,
            ..Self::default()
        }
    }
}

/// How much a container lightens what it holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightReduction {
    Percent(f64),
    Flat(f64),
}

impl WeightReduction {
    /// `"50%"` or `"5 lb"`. Blank strings mean no reduction.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.is_empty() {
            None
        } else if s.ends_with('%') {
            Some(Self::Percent(extract_value(s)))
        } else {
            Some(Self::Flat(extract_value(s)))
        }
    }

    /// Reduce a container's carried weight, never below zero.
    ///
    /// `weight` is the container's own adjusted weight plus the extended
    /// weight of its children, so the container itself is reduced too.
    #[must_use]
    pub fn apply(self, weight: f64) -> f64 {
        let reduced = match self {
            Self::Percent(p) => weight * (1.0 - p / 100.0),
            Self::Flat(w) => weight - w,
        };
        reduced.max(0.0)
    }
}

/// An item, possibly a container of other items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    #[serde(default)]
    pub description: String,
    #[serde(default = "yes")]
    pub equipped: bool,
    #[serde(default = "one")]
    pub quantity: f64,
    /// Unit cost.
    #[serde(default)]
    pub value: f64,
    /// Unit weight in pounds.
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub contained_weight_reduction: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<EquipmentModifier>,
    #[serde(default)]
    pub children: Vec<Equipment>,
    #[serde(default)]
    pub container: bool,
}

impl Equipment {
    #[must_use]
    pub fn new(description: &str, value: f64, weight: f64) -> Self {
        Self {
            description: description.to_string(),
            equipped: true,
            quantity: 1.0,
            value,
            weight,
            contained_weight_reduction: None,
            modifiers: Vec::new(),
            children: Vec::new(),
            container: false,
        }
    }

    #[must_use]
    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    #[must_use]
    pub fn with_modifier(mut self, modifier: EquipmentModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Turn the item into a container holding `children`.
    #[must_use]
    pub fn holding(mut self, children: Vec<Equipment>) -> Self {
        self.container = true;
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_reduction(mut self, reduction: &str) -> Self {
        self.contained_weight_reduction = Some(reduction.to_string());
        self
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        self.container || !self.children.is_empty()
    }

    fn active_modifiers(&self) -> impl Iterator<Item = &EquipmentModifier> {
        self.modifiers.iter().filter(|m| m.enabled)
    }
}

// =============================================================================
// COST
// =============================================================================

/// One non-CF cost step. Multipliers apply in order, then additions, then
/// the percentage sum taken from the step's input.
fn cost_step(item: &Equipment, step: CostStep, value: f64) -> f64 {
    let mut cost = value;
    let mut additions = 0.0;
    let mut percentages = 0.0;
    for modifier in item.active_modifiers().filter(|m| m.cost_type == step) {
        let amount = extract_value(&modifier.cost);
        match cost_value_kind(&modifier.cost) {
            CostValueKind::Addition => additions += amount,
            CostValueKind::Percentage => percentages += amount,
            CostValueKind::Multiplier => cost *= amount,
            CostValueKind::CostFactor => {}
        }
    }
    cost += additions;
    if percentages != 0.0 {
        cost += value * (percentages / 100.0);
    }
    cost
}

/// Summed cost factor of the base step, before the floor.
///
/// Multipliers contribute their excess over 1; every other modifier adds its
/// raw amount, so `"+50%"` adds 50, not 0.5.
#[must_use]
pub fn cost_factor(item: &Equipment) -> f64 {
    item.active_modifiers()
        .filter(|m| m.cost_type == CostStep::Base)
        .map(|m| {
            let amount = extract_value(&m.cost);
            match cost_value_kind(&m.cost) {
                CostValueKind::Multiplier => amount - 1.0,
                CostValueKind::Addition
                | CostValueKind::Percentage
                | CostValueKind::CostFactor => amount,
            }
        })
        .sum()
}

/// Unit cost after modifiers, never negative.
#[must_use]
pub fn adjusted_value(item: &Equipment) -> f64 {
    let mut cost = cost_step(item, CostStep::Original, item.value);
    let cf = cost_factor(item);
    if cf != 0.0 {
        cost *= cf.max(MIN_COST_FACTOR) + 1.0;
    }
    cost = cost_step(item, CostStep::FinalBase, cost);
    cost = cost_step(item, CostStep::Final, cost);
    cost.max(0.0)
}

// =============================================================================
// WEIGHT
// =============================================================================

/// Unit weight after modifiers, never negative.
#[must_use]
pub fn adjusted_weight(item: &Equipment) -> f64 {
    let mut weight = item.weight;
    let mut percentages = 0.0;
    for modifier in item
        .active_modifiers()
        .filter(|m| m.weight_type == WeightStep::Original)
    {
        let amount = extract_value(&modifier.weight);
        match weight_value_kind(&modifier.weight) {
            WeightValueKind::Addition => weight += amount,
            _ => percentages += amount,
        }
    }
    if percentages != 0.0 {
        weight += item.weight * (percentages / 100.0);
    }

    for step in [WeightStep::Base, WeightStep::FinalBase, WeightStep::Final] {
        weight = weight_step(item, step, weight);
    }
    weight.max(0.0)
}

fn weight_step(item: &Equipment, step: WeightStep, input: f64) -> f64 {
    let mut weight = input;
    let mut sum = 0.0;
    for modifier in item.active_modifiers().filter(|m| m.weight_type == step) {
        let amount = extract_value(&modifier.weight);
        match weight_value_kind(&modifier.weight) {
            WeightValueKind::Multiplier => weight *= amount,
            WeightValueKind::PercentageMultiplier => weight *= amount / 100.0,
            WeightValueKind::PercentageAdder => sum += input * (amount / 100.0),
            WeightValueKind::Addition => sum += amount,
        }
    }
    weight + sum
}

// =============================================================================
// EXTENDED TOTALS
// =============================================================================

/// Weight of the item with everything it holds.
///
/// Plain items count `quantity` times. A container counts once: its own
/// adjusted weight plus its children's extended weight, reduced by its
/// contained-weight reduction.
#[must_use]
pub fn extended_weight(item: &Equipment) -> f64 {
    extended_weight_at(item, 0)
}

fn extended_weight_at(item: &Equipment, depth: usize) -> f64 {
    let own = adjusted_weight(item);
    if !item.is_container() {
        return own * item.quantity;
    }
    let children: f64 = if depth >= MAX_TRAVERSAL_DEPTH {
        0.0
    } else {
        item.children
            .iter()
            .map(|c| extended_weight_at(c, depth + 1))
            .sum()
    };
    let total = own + children;
    item.contained_weight_reduction
        .as_deref()
        .and_then(WeightReduction::parse)
        .map_or(total, |r| r.apply(total))
}

/// Value of the item with everything it holds.
#[must_use]
pub fn extended_value(item: &Equipment) -> f64 {
    extended_value_at(item, 0)
}

fn extended_value_at(item: &Equipment, depth: usize) -> f64 {
    let own = adjusted_value(item);
    if !item.is_container() {
        return own * item.quantity;
    }
    if depth >= MAX_TRAVERSAL_DEPTH {
        return own;
    }
    own + item
        .children
        .iter()
        .map(|c| extended_value_at(c, depth + 1))
        .sum::<f64>()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kinds() {
        assert_eq!(cost_value_kind("-0.5 CF"), CostValueKind::CostFactor);
        assert_eq!(cost_value_kind("+20%"), CostValueKind::Percentage);
        assert_eq!(cost_value_kind("x2"), CostValueKind::Multiplier);
        assert_eq!(cost_value_kind("3x"), CostValueKind::Multiplier);
        assert_eq!(cost_value_kind("+15"), CostValueKind::Addition);
        assert_eq!(weight_value_kind("x50%"), WeightValueKind::PercentageMultiplier);
        assert_eq!(weight_value_kind("-10%"), WeightValueKind::PercentageAdder);
        assert_eq!(weight_value_kind("x3"), WeightValueKind::Multiplier);
        assert_eq!(weight_value_kind("+2 lb"), WeightValueKind::Addition);
    }

    #[test]
    fn extracts_leading_numbers() {
        assert_eq!(extract_value("x2"), 2.0);
        assert_eq!(extract_value("+20%"), 20.0);
        assert_eq!(extract_value("-0.5 cf"), -0.5);
        assert_eq!(extract_value("5 lb"), 5.0);
        assert_eq!(extract_value("x0.5"), 0.5);
        assert_eq!(extract_value("junk"), 0.0);
    }

    #[test]
    fn cost_factor_floor() {
        let sword = Equipment::new("Sword", 100.0, 3.0)
            .with_modifier(EquipmentModifier::cost(CostStep::Base, "-1 cf"))
            .with_modifier(EquipmentModifier::cost(CostStep::Base, "-0.5 cf"));
        assert_eq!(cost_factor(&sword), -1.5);
        assert!((adjusted_value(&sword) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn percentage_cost_factor_uses_raw_amount() {
        let blade = Equipment::new("Blade", 100.0, 1.0)
            .with_modifier(EquipmentModifier::cost(CostStep::Base, "+50%"));
        assert_eq!(cost_factor(&blade), 50.0);
        assert_eq!(adjusted_value(&blade), 5100.0);
    }

    #[test]
    fn cost_factor_multiplier_counts_excess() {
        let sword = Equipment::new("Sword", 100.0, 3.0)
            .with_modifier(EquipmentModifier::cost(CostStep::Base, "+1 cf"))
            .with_modifier(EquipmentModifier::cost(CostStep::Base, "x2"));
        assert_eq!(adjusted_value(&sword), 300.0);
    }

    #[test]
    fn non_cf_steps_in_order() {
        let item = Equipment::new("Lantern", 20.0, 2.0)
            .with_modifier(EquipmentModifier::cost(CostStep::Original, "x2"))
            .with_modifier(EquipmentModifier::cost(CostStep::Original, "+5"))
            .with_modifier(EquipmentModifier::cost(CostStep::Original, "50%"))
            .with_modifier(EquipmentModifier::cost(CostStep::Final, "-100"));
        // 20 * 2 + 5 + 20 * 0.5 = 55, then -100 clamps to zero
        assert_eq!(adjusted_value(&item), 0.0);

        let item = Equipment::new("Lantern", 20.0, 2.0)
            .with_modifier(EquipmentModifier::cost(CostStep::Original, "x2"))
            .with_modifier(EquipmentModifier::cost(CostStep::Original, "+5"))
            .with_modifier(EquipmentModifier::cost(CostStep::Original, "50%"));
        assert_eq!(adjusted_value(&item), 55.0);
    }

    #[test]
    fn disabled_modifiers_do_nothing() {
        let mut modifier = EquipmentModifier::cost(CostStep::Original, "x10");
        modifier.enabled = false;
        let item = Equipment::new("Rope", 5.0, 1.0).with_modifier(modifier);
        assert_eq!(adjusted_value(&item), 5.0);
    }

    #[test]
    fn weight_steps() {
        let armor = Equipment::new("Mail", 500.0, 20.0)
            .with_modifier(EquipmentModifier::weight(WeightStep::Original, "+2"))
            .with_modifier(EquipmentModifier::weight(WeightStep::Original, "-50%"))
            .with_modifier(EquipmentModifier::weight(WeightStep::FinalBase, "x50%"))
            .with_modifier(EquipmentModifier::weight(WeightStep::Final, "+1"));
        // (20 + 2 - 10) = 12, x50% = 6, +1 = 7
        assert_eq!(adjusted_weight(&armor), 7.0);

        let heavy = Equipment::new("Anvil", 0.0, 10.0)
            .with_modifier(EquipmentModifier::weight(WeightStep::Base, "-20"));
        assert_eq!(adjusted_weight(&heavy), 0.0);
    }

    #[test]
    fn extended_totals_for_containers() {
        let arrows = Equipment::new("Arrow", 2.0, 0.1).with_quantity(20.0);
        let quiver = Equipment::new("Quiver", 15.0, 1.0).holding(vec![arrows]);
        assert!((extended_weight(&quiver) - 3.0).abs() < 1e-9);
        assert!((extended_value(&quiver) - 55.0).abs() < 1e-9);

        let coins = Equipment::new("Coins", 1.0, 0.02).with_quantity(500.0);
        let bag = Equipment::new("Bag of Holding", 1000.0, 2.0)
            .holding(vec![coins.clone()])
            .with_reduction("50%");
        assert!((extended_weight(&bag) - 6.0).abs() < 1e-9);

        let pouch = Equipment::new("Pouch", 1.0, 1.0)
            .holding(vec![coins])
            .with_reduction("20 lb");
        assert_eq!(extended_weight(&pouch), 0.0);
    }

    #[test]
    fn reduction_covers_the_container_itself() {
        let satchel = Equipment::new("Satchel", 10.0, 4.0)
            .holding(Vec::new())
            .with_reduction("25%");
        assert!((extended_weight(&satchel) - 3.0).abs() < 1e-9);
        assert_eq!(WeightReduction::parse("5 lb").map(|r| r.apply(3.0)), Some(0.0));
    }

    #[test]
    fn empty_container_is_itself() {
        let chest = Equipment::new("Chest", 50.0, 10.0).holding(Vec::new());
        assert_eq!(extended_weight(&chest), 10.0);
        assert_eq!(extended_value(&chest), 50.0);
    }

    #[test]
    fn deserializes_payload() {
        let item: Equipment = serde_json::from_value(serde_json::json!({
            "description": "Torch", "value": 3, "weight": 1,
            "modifiers": [{"enabled": true, "cost": "x2", "costType": "to_final_cost"}]
        }))
        .expect("equipment");
        assert_eq!(item.quantity, 1.0);
        assert!(item.equipped);
        assert_eq!(adjusted_value(&item), 6.0);
    }
}
