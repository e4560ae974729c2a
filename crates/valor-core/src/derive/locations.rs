//! Hit locations: the configured body plan, expanded into concrete
//! locations, and per-location damage status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configured location. `has` expands it into one location per
/// specifier, e.g. `arm` with `["left", "right"]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HitLocationData {
    pub has: Option<Vec<String>>,
    pub sub_locations: Vec<String>,
    #[serde(alias = "cripple_ratio")]
    pub cripple_ratio: Option<f64>,
    #[serde(alias = "hit_penalty")]
    pub hit_penalty: f64,
    #[serde(alias = "hit_range")]
    pub hit_range: Vec<i32>,
}

impl HitLocationData {
    fn paired(cripple_ratio: f64, hit_penalty: f64, hit_range: Vec<i32>) -> Self {
        Self {
            has: Some(vec!["left".to_string(), "right".to_string()]),
            cripple_ratio: Some(cripple_ratio),
            hit_penalty,
            hit_range,
            ..Self::default()
        }
    }

    fn single(hit_penalty: f64, hit_range: Vec<i32>) -> Self {
        Self {
            hit_penalty,
            hit_range,
            ..Self::default()
        }
    }
}

/// A concrete location after expansion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitLocation {
    pub location: String,
    pub generic_location: String,
    pub sub_locations: Vec<String>,
    pub cripple_ratio: Option<f64>,
    pub hit_penalty: f64,
    pub hit_range: Vec<i32>,
}

/// The humanoid body plan.
#[must_use]
pub fn default_locations() -> BTreeMap<String, HitLocationData> {
    BTreeMap::from([
        ("eye".to_string(), HitLocationData {
            has: Some(vec!["left".to_string(), "right".to_string()]),
            cripple_ratio: Some(10.0),
            hit_penalty: -9.0,
            ..HitLocationData::default()
        }),
        ("skull".to_string(), HitLocationData::single(-7.0, vec![3, 4])),
        ("face".to_string(), HitLocationData::single(-5.0, vec![5])),
        ("arm".to_string(), HitLocationData::paired(2.0, -2.0, vec![8, 12])),
        ("hand".to_string(), HitLocationData::paired(3.0, -4.0, vec![15])),
        ("leg".to_string(), HitLocationData::paired(2.0, -2.0, vec![6, 7, 13, 14])),
        ("foot".to_string(), HitLocationData::paired(3.0, -4.0, vec![16])),
        ("torso".to_string(), HitLocationData::single(0.0, vec![9, 10, 11])),
        ("groin".to_string(), HitLocationData::single(-3.0, vec![11])),
        ("vitals".to_string(), HitLocationData::single(-3.0, Vec::new())),
        ("neck".to_string(), HitLocationData::single(-5.0, vec![17, 18])),
    ])
}

/// Expand `has` specifiers into concrete locations keyed by full name.
#[must_use]
pub fn parse_hit_locations(
    locations: &BTreeMap<String, HitLocationData>,
) -> BTreeMap<String, HitLocation> {
    let mut out = BTreeMap::new();
    for (generic, data) in locations {
        let concrete: Vec<(String, Vec<String>)> = match &data.has {
            Some(specifiers) => specifiers
                .iter()
                .map(|spec| {
                    (
                        format!("{spec} {generic}"),
                        data.sub_locations
                            .iter()
                            .map(|sub| format!("{spec} {sub}"))
                            .collect(),
                    )
                })
                .collect(),
            None => vec![(generic.clone(), data.sub_locations.clone())],
        };
        for (location, sub_locations) in concrete {
            out.insert(location.clone(), HitLocation {
                location,
                generic_location: generic.clone(),
                sub_locations,
                cripple_ratio: data.cripple_ratio,
                hit_penalty: data.hit_penalty,
                hit_range: data.hit_range.clone(),
            });
        }
    }
    out
}

/// `HP / cripple_ratio`; `None` when the location cannot be crippled.
#[must_use]
pub fn cripple_threshold(hit_points: f64, cripple_ratio: Option<f64>) -> Option<f64> {
    cripple_ratio
        .filter(|ratio| *ratio != 0.0 && ratio.is_finite())
        .map(|ratio| hit_points / ratio)
}

/// Damage state of one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatus {
    pub location: String,
    pub hit_penalty: f64,
    pub damage_taken: f64,
    pub armor: f64,
    pub cripple_threshold: Option<f64>,
    pub crippled: bool,
}

impl LocationStatus {
    #[must_use]
    pub fn new(location: &HitLocation, hit_points: f64, damage_taken: f64, armor: f64) -> Self {
        let threshold = cripple_threshold(hit_points, location.cripple_ratio);
        Self {
            location: location.location.clone(),
            hit_penalty: location.hit_penalty,
            damage_taken,
            armor,
            cripple_threshold: threshold,
            crippled: threshold.is_some_and(|t| damage_taken > t),
        }
    }
}
