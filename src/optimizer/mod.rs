//! Surrogate-model parameter optimization.
//!
//! - [`space`]: parameters, bounds, priors and physical transforms
//! - [`sampling`]: Latin Hypercube candidate generation
//! - [`gp`]: Gaussian-process regression (Matérn ν=2.5)
//! - [`bayesian`]: the suggest/update loop with expected improvement

pub mod bayesian;
pub mod gp;
pub mod sampling;
pub mod space;

pub use bayesian::{
    expected_improvement, ConvergenceConfig, Observation, OptimizerConfig, SuggestionSource,
    SurrogateOptimizer,
};
pub use gp::{GaussianProcess, GpSettings, Matern52};
pub use sampling::latin_hypercube;
pub use space::{default_parameters, Parameter, ParameterSpace, ParameterVector, Transform};
