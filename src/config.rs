//! Campaign configuration.
//!
//! A [`CalibrationConfig`] is read from JSON; every section and field has a
//! default so a partial file is enough. A few settings can be overridden from
//! the environment:
//!
//! - `STOCKCAL_MAX_ITERATIONS`: iteration budget
//! - `STOCKCAL_WORKER_FRACTION`: share of CPU cores used for simulations
//! - `STOCKCAL_SEED`: optimizer RNG seed

use crate::aggregation::AggregationConfig;
use crate::error::{CampaignError, SpaceError};
use crate::optimizer::{default_parameters, OptimizerConfig, Parameter, ParameterSpace};
use crate::validation::ObjectiveConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_MAX_ITERATIONS: &str = "STOCKCAL_MAX_ITERATIONS";
pub const ENV_WORKER_FRACTION: &str = "STOCKCAL_WORKER_FRACTION";
pub const ENV_SEED: &str = "STOCKCAL_SEED";

/// Loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub max_iterations: usize,
    /// Score std over the convergence window below which the campaign stops
    pub convergence_threshold: f64,
    /// Calendar year of the metered reference
    pub reference_year: i32,
    /// Share of CPU cores given to the simulation pool
    pub worker_fraction: f64,
    /// Append-only iteration log, if any
    pub journal_path: Option<PathBuf>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        CampaignConfig {
            max_iterations: 20,
            convergence_threshold: 0.01,
            reference_year: 2022,
            worker_fraction: 0.8,
            journal_path: None,
        }
    }
}

/// Complete configuration of a calibration campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub optimizer: OptimizerConfig,
    pub objective: ObjectiveConfig,
    pub aggregation: AggregationConfig,
    pub campaign: CampaignConfig,
    pub parameters: Vec<Parameter>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            optimizer: OptimizerConfig::default(),
            objective: ObjectiveConfig::default(),
            aggregation: AggregationConfig::default(),
            campaign: CampaignConfig::default(),
            parameters: default_parameters(),
        }
    }
}

impl CalibrationConfig {
    pub fn from_json(json: &str) -> Result<Self, CampaignError> {
        serde_json::from_str(json).map_err(|e| CampaignError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, CampaignError> {
        serde_json::to_string_pretty(self).map_err(|e| CampaignError::InvalidConfig(e.to_string()))
    }

    /// Reads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CampaignError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CampaignError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), CampaignError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .map_err(|e| CampaignError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Applies the `STOCKCAL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), CampaignError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CampaignError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
            self.campaign.max_iterations = parse_override(ENV_MAX_ITERATIONS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WORKER_FRACTION) {
            self.campaign.worker_fraction = parse_override(ENV_WORKER_FRACTION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SEED) {
            self.optimizer.seed = Some(parse_override(ENV_SEED, &raw)?);
        }
        Ok(())
    }

    pub fn parameter_space(&self) -> Result<ParameterSpace, SpaceError> {
        ParameterSpace::new(self.parameters.clone())
    }

    /// Checks every section for values the campaign cannot run with.
    pub fn validate(&self) -> Result<(), CampaignError> {
        self.parameter_space()?;

        let invalid = |msg: &str| Err(CampaignError::InvalidConfig(msg.to_string()));

        if !self.objective.weights.is_valid() {
            return invalid("objective weights must be finite and non-negative");
        }
        if !self.objective.scales.is_valid() {
            return invalid("objective scales must be finite and positive");
        }
        if !(self.campaign.worker_fraction > 0.0 && self.campaign.worker_fraction <= 1.0) {
            return invalid("worker_fraction must lie in (0, 1]");
        }
        if !(self.campaign.convergence_threshold.is_finite()
            && self.campaign.convergence_threshold >= 0.0)
        {
            return invalid("convergence_threshold must be finite and non-negative");
        }
        if !(self.aggregation.weight_tolerance.is_finite() && self.aggregation.weight_tolerance >= 0.0)
        {
            return invalid("weight_tolerance must be finite and non-negative");
        }
        if self.optimizer.warmup == 0 {
            return invalid("optimizer warmup must be at least 1");
        }
        if self.optimizer.candidates == 0 {
            return invalid("optimizer candidates must be at least 1");
        }
        if self.optimizer.length_scales.is_empty()
            || self
                .optimizer
                .length_scales
                .iter()
                .any(|l| !(l.is_finite() && *l > 0.0))
        {
            return invalid("optimizer length_scales must be non-empty and positive");
        }
        if self.optimizer.convergence.window == 0 {
            return invalid("convergence window must be at least 1");
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CampaignError> {
    raw.trim()
        .parse()
        .map_err(|_| CampaignError::InvalidConfig(format!("{}: cannot parse '{}'", key, raw)))
}
