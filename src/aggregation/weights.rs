//! Representativeness weights of selected archetypes.

use crate::stock::{Archetype, ReferencePopulation, TypeMapping};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How archetypes are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Each archetype stands for its class population divided by the number
    /// of selected archetypes in that class.
    #[default]
    Population,
    /// Every archetype has weight 1.0 and the population is ignored.
    Single,
}

/// Weight of one building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingWeight {
    pub building_id: String,
    pub weight: f64,
    /// Census class, absent in single-building mode
    pub class: Option<String>,
}

/// The weight table of a campaign.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildingWeights {
    weights: BTreeMap<String, BuildingWeight>,
    /// Archetypes whose sub-type has no census class
    unmapped: Vec<String>,
    /// Population the weights should add up to, if any
    expected_total: Option<f64>,
}

impl BuildingWeights {
    /// Builds a table directly from `(id, weight)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights = pairs
            .into_iter()
            .map(|(id, weight)| {
                let building_id: String = id.into();
                (
                    building_id.clone(),
                    BuildingWeight {
                        building_id,
                        weight,
                        class: None,
                    },
                )
            })
            .collect();
        BuildingWeights {
            weights,
            unmapped: Vec::new(),
            expected_total: None,
        }
    }

    pub fn get(&self, building_id: &str) -> Option<f64> {
        self.weights.get(building_id).map(|w| w.weight)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().map(|w| w.weight).sum()
    }

    pub fn expected_total(&self) -> Option<f64> {
        self.expected_total
    }

    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    pub fn building_ids(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildingWeight> {
        self.weights.values()
    }

    /// Relative deviation of the weight sum from the expected population.
    pub fn relative_deviation(&self) -> Option<f64> {
        self.expected_total
            .filter(|t| *t > 0.0)
            .map(|t| (self.total() - t).abs() / t)
    }
}

/// Computes archetype weights from the census population.
///
/// In [`WeightMode::Population`] an archetype of class `c` gets
/// `population(c) / selected_in(c)`. Archetypes whose sub-type is not in
/// `mapping` get no weight and are listed as unmapped. A warning is logged when
/// the weight sum deviates from the population total by more than `tolerance`.
pub fn compute_weights(
    selected: &[Archetype],
    population: &ReferencePopulation,
    mapping: &TypeMapping,
    mode: WeightMode,
    tolerance: f64,
) -> BuildingWeights {
    let mut seen = BTreeSet::new();
    let mut unique: Vec<&Archetype> = Vec::with_capacity(selected.len());
    for archetype in selected {
        if seen.insert(archetype.id.as_str()) {
            unique.push(archetype);
        } else {
            log::warn!("Duplicate archetype id {}, keeping the first", archetype.id);
        }
    }
    let selected = unique;

    if mode == WeightMode::Single {
        log::info!("Single-building weighting for {} archetypes", selected.len());
        return BuildingWeights::from_pairs(selected.iter().map(|a| (a.id.clone(), 1.0)));
    }

    let mut per_class: BTreeMap<&str, usize> = BTreeMap::new();
    for archetype in &selected {
        if let Some(class) = mapping.class_of(&archetype.sub_type) {
            *per_class.entry(class).or_insert(0) += 1;
        }
    }

    let mut table = BuildingWeights {
        expected_total: Some(population.total()),
        ..Default::default()
    };

    for archetype in &selected {
        let Some(class) = mapping.class_of(&archetype.sub_type) else {
            log::warn!(
                "Archetype {} has unmapped sub-type '{}', excluded from weighting",
                archetype.id,
                archetype.sub_type
            );
            table.unmapped.push(archetype.id.clone());
            continue;
        };

        let selected_in_class = per_class.get(class).copied().unwrap_or(0);
        let weight = if selected_in_class > 0 {
            population.count(class) / selected_in_class as f64
        } else {
            0.0
        };

        log::debug!(
            "Archetype {}: class {}, represents {:.0} buildings",
            archetype.id,
            class,
            weight
        );

        table.weights.insert(
            archetype.id.clone(),
            BuildingWeight {
                building_id: archetype.id.clone(),
                weight,
                class: Some(class.to_string()),
            },
        );
    }

    let total = table.total();
    let expected = population.total();
    match table.relative_deviation() {
        Some(deviation) if deviation > tolerance => {
            log::warn!(
                "Weight sum {:.0} deviates from population {:.0} by {:.1}%",
                total,
                expected,
                deviation * 100.0
            );
        }
        Some(_) => log::info!("Weight sum {:.0} matches population {:.0}", total, expected),
        None => log::warn!("Reference population is empty"),
    }

    table
}
