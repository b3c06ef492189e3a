//! Calibration of building-stock energy simulations against metered load.
//!
//! A campaign tunes a small set of physical parameters so that a weighted
//! sum of per-archetype hourly simulations matches a year of metered hourly
//! consumption. The pieces:
//!
//! - [`series`]: 8760-hour series, reference loading, engine output parsing
//! - [`stock`]: archetypes, census population and sub-type mapping
//! - [`optimizer`]: parameter space and the Gaussian-process optimizer
//! - [`aggregation`]: population weights and the weighted stock sum
//! - [`validation`]: fit metrics and the scalar objective
//! - [`sensitivity`]: per-parameter impact tracking
//! - [`campaign`]: the calibration loop, simulation pool and journal
//! - [`config`]: JSON configuration with environment overrides

pub mod aggregation;
pub mod campaign;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod sensitivity;
pub mod series;
pub mod stock;
pub mod validation;

pub use aggregation::{AggregatedSeries, BuildingWeights, WeightMode, WeightedAggregator};
pub use campaign::{
    CalibrationLoop, CampaignJournal, CampaignResult, CampaignState, CommandEngine,
    SimulationEngine, SimulationInputs, Termination,
};
pub use config::CalibrationConfig;
pub use optimizer::{Parameter, ParameterSpace, ParameterVector, SurrogateOptimizer};
pub use series::{HourlySeries, ReferenceSource};
pub use stock::{Archetype, ReferencePopulation, TypeMapping};
pub use validation::{ValidationMetrics, ValidationScorer};
