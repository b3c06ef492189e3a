//! Tunable parameters and the space they span.

use crate::error::SpaceError;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Conversion factor from imperial R-value (ft²·°F·h/BTU) to RSI (m²·K/W).
pub const RSI_PER_R: f64 = 0.1761;

/// Physical transform applied to an optimizer value before it is handed to the
/// simulation input mapping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Transform {
    #[default]
    Identity,
    /// Multiply by a constant
    Scale(f64),
    /// Add a constant
    Offset(f64),
    /// Imperial R-value to metric RSI
    RsiFromR,
}

impl Transform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Transform::Identity => value,
            Transform::Scale(factor) => value * factor,
            Transform::Offset(offset) => value + offset,
            Transform::RsiFromR => value * RSI_PER_R,
        }
    }
}

/// A single tunable parameter with bounds and a Gaussian prior.
///
/// Construct with [`Parameter::new`], which enforces `low < high` and
/// `low <= prior_mean <= high`. Parameters deserialized from configuration are
/// checked again when the [`ParameterSpace`] is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub low: f64,
    pub high: f64,
    pub prior_mean: f64,
    pub prior_std: f64,
    /// Dotted path of the simulation input this parameter drives.
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub transform: Transform,
    /// Largest std over the convergence window still considered stable.
    /// Falls back to the optimizer default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_threshold: Option<f64>,
}

impl Parameter {
    /// Creates a parameter driving the input of the same name.
    pub fn new(
        name: impl Into<String>,
        low: f64,
        high: f64,
        prior_mean: f64,
        prior_std: f64,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        let parameter = Parameter {
            target_path: name.clone(),
            name,
            low,
            high,
            prior_mean,
            prior_std,
            description: String::new(),
            unit: String::new(),
            transform: Transform::Identity,
            stability_threshold: None,
        };
        parameter.validate()?;
        Ok(parameter)
    }

    pub fn with_target_path(mut self, path: impl Into<String>) -> Self {
        self.target_path = path.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_stability_threshold(mut self, threshold: f64) -> Self {
        self.stability_threshold = Some(threshold);
        self
    }

    /// Checks the bounds and prior of this parameter.
    pub fn validate(&self) -> Result<(), SpaceError> {
        if !(self.low.is_finite() && self.high.is_finite() && self.low < self.high) {
            return Err(SpaceError::InvalidBounds {
                name: self.name.clone(),
                low: self.low,
                high: self.high,
            });
        }
        if !(self.prior_mean >= self.low && self.prior_mean <= self.high) {
            return Err(SpaceError::PriorOutOfBounds {
                name: self.name.clone(),
                mean: self.prior_mean,
                low: self.low,
                high: self.high,
            });
        }
        if !(self.prior_std.is_finite() && self.prior_std >= 0.0) {
            return Err(SpaceError::InvalidPriorStd {
                name: self.name.clone(),
                std: self.prior_std,
            });
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// Draws from Normal(prior_mean, prior_std) clipped to the bounds.
    pub fn sample_prior<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match Normal::new(self.prior_mean, self.prior_std) {
            Ok(dist) if self.prior_std > 0.0 => self.clip(dist.sample(rng)),
            _ => self.prior_mean,
        }
    }

    /// Maps a value in `[low, high]` onto `[0, 1]`.
    pub fn to_unit(&self, value: f64) -> f64 {
        (value - self.low) / self.width()
    }

    /// Maps a value in `[0, 1]` back onto `[low, high]`, clipping the result.
    pub fn from_unit(&self, unit: f64) -> f64 {
        self.clip(self.low + unit * self.width())
    }
}

/// Parameter values in [`ParameterSpace`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector(Vec<f64>);

impl ParameterVector {
    pub fn new(values: Vec<f64>) -> Self {
        ParameterVector(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for ParameterVector {
    fn from(values: Vec<f64>) -> Self {
        ParameterVector(values)
    }
}

/// An ordered, validated set of uniquely named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

impl ParameterSpace {
    /// Validates the parameters. An empty target path defaults to the name.
    pub fn new(mut parameters: Vec<Parameter>) -> Result<Self, SpaceError> {
        if parameters.is_empty() {
            return Err(SpaceError::Empty);
        }

        let mut seen = HashSet::new();
        for parameter in &mut parameters {
            parameter.validate()?;
            if !seen.insert(parameter.name.clone()) {
                return Err(SpaceError::Duplicate(parameter.name.clone()));
            }
            if parameter.target_path.is_empty() {
                parameter.target_path = parameter.name.clone();
            }
        }

        Ok(ParameterSpace { parameters })
    }

    /// The five residential parameters calibrated by default.
    pub fn residential_default() -> Self {
        ParameterSpace {
            parameters: default_parameters(),
        }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Samples every parameter independently from its clipped prior.
    pub fn sample_prior<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterVector {
        ParameterVector(self.parameters.iter().map(|p| p.sample_prior(rng)).collect())
    }

    /// The vector of prior means.
    pub fn prior_means(&self) -> ParameterVector {
        ParameterVector(self.parameters.iter().map(|p| p.prior_mean).collect())
    }

    pub fn check_dimension(&self, vector: &ParameterVector) -> Result<(), SpaceError> {
        if vector.len() != self.len() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.len(),
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// True when the vector has the right dimension and lies inside the bounds.
    pub fn contains(&self, vector: &ParameterVector) -> bool {
        vector.len() == self.len()
            && self
                .parameters
                .iter()
                .zip(vector.values())
                .all(|(p, v)| p.contains(*v))
    }

    pub fn to_unit(&self, vector: &ParameterVector) -> Vec<f64> {
        self.parameters
            .iter()
            .zip(vector.values())
            .map(|(p, v)| p.to_unit(*v))
            .collect()
    }

    pub fn from_unit(&self, unit: &[f64]) -> ParameterVector {
        ParameterVector(
            self.parameters
                .iter()
                .zip(unit)
                .map(|(p, u)| p.from_unit(*u))
                .collect(),
        )
    }

    /// Builds a vector from named values. Every parameter must be present.
    pub fn vector_from_map(&self, values: &BTreeMap<String, f64>) -> Result<ParameterVector, SpaceError> {
        if let Some(unknown) = values.keys().find(|k| self.get(k).is_none()) {
            return Err(SpaceError::Unknown(unknown.clone()));
        }
        self.parameters
            .iter()
            .map(|p| {
                values
                    .get(&p.name)
                    .copied()
                    .ok_or_else(|| SpaceError::Missing(p.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ParameterVector)
    }

    /// Names each value of the vector.
    pub fn named(&self, vector: &ParameterVector) -> BTreeMap<String, f64> {
        self.parameters
            .iter()
            .zip(vector.values())
            .map(|(p, v)| (p.name.clone(), *v))
            .collect()
    }

    /// Transformed values keyed by target path, as passed to the input mapping.
    pub fn overrides(&self, vector: &ParameterVector) -> Result<BTreeMap<String, f64>, SpaceError> {
        self.check_dimension(vector)?;
        Ok(self
            .parameters
            .iter()
            .zip(vector.values())
            .map(|(p, v)| (p.target_path.clone(), p.transform.apply(*v)))
            .collect())
    }
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self::residential_default()
    }
}

/// Default residential parameters as plain records, for configuration files.
pub fn default_parameters() -> Vec<Parameter> {
    vec![
        Parameter {
            name: "heating_system_efficiency".to_string(),
            low: 0.90,
            high: 0.95,
            prior_mean: 0.92,
            prior_std: 0.01,
            target_path: "heating_system.heating_efficiency".to_string(),
            description: "Heating system efficiency".to_string(),
            unit: "fraction".to_string(),
            transform: Transform::Identity,
            stability_threshold: None,
        },
        Parameter {
            name: "air_leakage_value".to_string(),
            low: 3.0,
            high: 4.0,
            prior_mean: 3.5,
            prior_std: 0.2,
            target_path: "air_leakage_value".to_string(),
            description: "Envelope air leakage".to_string(),
            unit: "ACH50".to_string(),
            transform: Transform::Identity,
            stability_threshold: None,
        },
        Parameter {
            name: "heating_setpoint".to_string(),
            low: 19.0,
            high: 21.0,
            prior_mean: 20.0,
            prior_std: 0.5,
            target_path: "hvac_control.heating_setpoint".to_string(),
            description: "Heating thermostat setpoint".to_string(),
            unit: "°C".to_string(),
            transform: Transform::Identity,
            stability_threshold: None,
        },
        Parameter {
            name: "cooling_setpoint".to_string(),
            low: 24.0,
            high: 26.0,
            prior_mean: 25.0,
            prior_std: 0.5,
            target_path: "hvac_control.cooling_setpoint".to_string(),
            description: "Cooling thermostat setpoint".to_string(),
            unit: "°C".to_string(),
            transform: Transform::Identity,
            stability_threshold: None,
        },
        Parameter {
            name: "wall_assembly_r".to_string(),
            low: 2.5,
            high: 4.5,
            prior_mean: 3.5,
            prior_std: 0.3,
            target_path: "wall_assembly_r".to_string(),
            description: "Wall assembly thermal resistance".to_string(),
            unit: "m²·K/W".to_string(),
            transform: Transform::Identity,
            stability_threshold: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parameter_validation() {
        assert!(Parameter::new("x", 0.0, 1.0, 0.5, 0.1).is_ok());
        assert!(matches!(
            Parameter::new("x", 1.0, 1.0, 1.0, 0.1),
            Err(SpaceError::InvalidBounds { .. })
        ));
        assert!(matches!(
            Parameter::new("x", 0.0, 1.0, 1.5, 0.1),
            Err(SpaceError::PriorOutOfBounds { .. })
        ));
        assert!(matches!(
            Parameter::new("x", 0.0, 1.0, 0.5, -1.0),
            Err(SpaceError::InvalidPriorStd { .. })
        ));
        assert!(matches!(
            Parameter::new("x", 0.0, f64::NAN, 0.5, 0.1),
            Err(SpaceError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_default_space_is_valid() {
        let space = ParameterSpace::residential_default();
        assert_eq!(space.len(), 5);
        assert!(ParameterSpace::new(default_parameters()).is_ok());
        assert_eq!(
            space.get("heating_setpoint").unwrap().target_path,
            "hvac_control.heating_setpoint"
        );
    }

    #[test]
    fn test_duplicate_and_empty() {
        let p = Parameter::new("x", 0.0, 1.0, 0.5, 0.1).unwrap();
        assert_eq!(
            ParameterSpace::new(vec![p.clone(), p]),
            Err(SpaceError::Duplicate("x".to_string()))
        );
        assert_eq!(ParameterSpace::new(Vec::new()), Err(SpaceError::Empty));
    }

    #[test]
    fn test_prior_samples_stay_in_bounds() {
        // A wide prior forces clipping on both sides
        let p = Parameter::new("x", 0.0, 1.0, 0.5, 5.0).unwrap();
        let space = ParameterSpace::new(vec![p]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut clipped = 0;
        for _ in 0..500 {
            let v = space.sample_prior(&mut rng);
            assert!(space.contains(&v));
            if v.values()[0] == 0.0 || v.values()[0] == 1.0 {
                clipped += 1;
            }
        }
        assert!(clipped > 0);
    }

    #[test]
    fn test_zero_std_prior_returns_mean() {
        let p = Parameter::new("x", 0.0, 1.0, 0.25, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(p.sample_prior(&mut rng), 0.25);
    }

    #[test]
    fn test_unit_scaling() {
        let p = Parameter::new("sp", 19.0, 21.0, 20.0, 0.5).unwrap();
        assert!((p.to_unit(20.0) - 0.5).abs() < 1e-12);
        assert!((p.from_unit(1.0) - 21.0).abs() < 1e-12);
        assert_eq!(p.from_unit(1.5), 21.0);
    }

    #[test]
    fn test_vector_from_map() {
        let space = ParameterSpace::residential_default();
        let mut values: BTreeMap<String, f64> = space.named(&space.prior_means());
        let vector = space.vector_from_map(&values).unwrap();
        assert_eq!(vector, space.prior_means());

        values.insert("bogus".to_string(), 1.0);
        assert_eq!(
            space.vector_from_map(&values),
            Err(SpaceError::Unknown("bogus".to_string()))
        );

        values.remove("bogus");
        values.remove("wall_assembly_r");
        assert_eq!(
            space.vector_from_map(&values),
            Err(SpaceError::Missing("wall_assembly_r".to_string()))
        );
    }

    #[test]
    fn test_overrides_apply_transforms() {
        let r = Parameter::new("wall_r", 10.0, 30.0, 20.0, 1.0)
            .unwrap()
            .with_target_path("walls.rsi")
            .with_transform(Transform::RsiFromR);
        let eff = Parameter::new("eff", 80.0, 100.0, 90.0, 1.0)
            .unwrap()
            .with_transform(Transform::Scale(0.01));
        let space = ParameterSpace::new(vec![r, eff]).unwrap();

        let overrides = space
            .overrides(&ParameterVector::new(vec![20.0, 95.0]))
            .unwrap();
        assert!((overrides["walls.rsi"] - 3.522).abs() < 1e-9);
        assert!((overrides["eff"] - 0.95).abs() < 1e-12);

        assert!(matches!(
            space.overrides(&ParameterVector::new(vec![1.0])),
            Err(SpaceError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_parameter_serde() {
        let json = r#"{"name":"x","low":0.0,"high":2.0,"prior_mean":1.0,"prior_std":0.1,
                       "transform":{"kind":"offset","value":273.15}}"#;
        let p: Parameter = serde_json::from_str(json).unwrap();
        assert_eq!(p.transform, Transform::Offset(273.15));
        assert!(p.target_path.is_empty());
        assert_eq!(p.stability_threshold, None);
    }
}
