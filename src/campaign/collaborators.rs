//! Interfaces to the archetype input mapping and the simulation engine.

use crate::error::SimulationError;
use crate::series::HourlySeries;
use crate::stock::Archetype;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inputs handed to the simulation engine for one building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInputs {
    pub building_id: String,
    /// Numeric inputs keyed by target path
    pub values: BTreeMap<String, f64>,
    /// Descriptive archetype fields that are not numeric
    pub attributes: BTreeMap<String, String>,
}

impl SimulationInputs {
    pub fn get(&self, path: &str) -> Option<f64> {
        self.values.get(path).copied()
    }
}

/// Builds simulation inputs from an archetype and calibrated overrides.
pub trait ParameterMapper: Send + Sync {
    fn map(
        &self,
        archetype: &Archetype,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<SimulationInputs, SimulationError>;
}

/// Runs one building simulation.
pub trait SimulationEngine: Send + Sync {
    fn simulate(
        &self,
        building_id: &str,
        inputs: &SimulationInputs,
    ) -> Result<HourlySeries, SimulationError>;
}

impl<F> SimulationEngine for F
where
    F: Fn(&str, &SimulationInputs) -> Result<HourlySeries, SimulationError> + Send + Sync,
{
    fn simulate(
        &self,
        building_id: &str,
        inputs: &SimulationInputs,
    ) -> Result<HourlySeries, SimulationError> {
        self(building_id, inputs)
    }
}

/// Mapper that reads numeric archetype attributes as inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMapper;

impl ParameterMapper for AttributeMapper {
    fn map(
        &self,
        archetype: &Archetype,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<SimulationInputs, SimulationError> {
        map_archetype_to_parameters(archetype, overrides)
    }
}

/// Numeric archetype attributes become inputs, the rest stay attributes.
/// Overrides replace archetype values of the same path.
///
/// Fails when an override is not finite.
pub fn map_archetype_to_parameters(
    archetype: &Archetype,
    overrides: &BTreeMap<String, f64>,
) -> Result<SimulationInputs, SimulationError> {
    let mut values = BTreeMap::new();
    let mut attributes = BTreeMap::new();

    for (key, raw) in &archetype.attributes {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => {
                values.insert(key.clone(), v);
            }
            _ => {
                attributes.insert(key.clone(), raw.clone());
            }
        }
    }

    for (path, value) in overrides {
        if !value.is_finite() {
            return Err(SimulationError::InvalidInputs {
                building: archetype.id.clone(),
                reason: format!("override {} is not finite", path),
            });
        }
        attributes.remove(path);
        values.insert(path.clone(), *value);
    }

    Ok(SimulationInputs {
        building_id: archetype.id.clone(),
        values,
        attributes,
    })
}
