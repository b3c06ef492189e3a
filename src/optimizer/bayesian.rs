//! Gaussian-process Bayesian optimizer over a [`ParameterSpace`].

use super::gp::{GaussianProcess, GpSettings};
use super::sampling::latin_hypercube;
use super::space::{ParameterSpace, ParameterVector};
use crate::error::{OptimizerError, SpaceError};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

/// Convergence test settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Observations required before convergence can be declared
    pub min_observations: usize,
    /// Number of trailing observations inspected
    pub window: usize,
    /// Largest score std over the window still considered converged
    pub score_std_threshold: f64,
    /// Parameter std threshold for parameters without their own
    pub parameter_std_threshold: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        ConvergenceConfig {
            min_observations: 5,
            window: 3,
            score_std_threshold: 0.01,
            parameter_std_threshold: 0.01,
        }
    }
}

/// Optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Observations required before the surrogate replaces prior sampling
    pub warmup: usize,
    /// Latin Hypercube candidates scored per suggestion
    pub candidates: usize,
    /// Noise variance on the standardized scores
    pub noise: f64,
    /// Length scales tried when fitting, in unit-cube coordinates
    pub length_scales: Vec<f64>,
    /// RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
    pub convergence: ConvergenceConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let gp = GpSettings::default();
        OptimizerConfig {
            warmup: 3,
            candidates: 1000,
            noise: gp.noise,
            length_scales: gp.length_scales,
            seed: None,
            convergence: ConvergenceConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn gp_settings(&self) -> GpSettings {
        GpSettings {
            length_scales: self.length_scales.clone(),
            noise: self.noise,
        }
    }
}

/// One scored parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub parameters: ParameterVector,
    pub score: f64,
    pub iteration: usize,
    pub timestamp: DateTime<Utc>,
}

/// How the last suggestion was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// Warm-up sample from the prior
    Prior,
    /// Expected-improvement maximizer
    Surrogate,
    /// Prior sample after the surrogate failed
    Fallback,
}

/// Expected improvement of a minimization objective at a point with posterior
/// `mean` and `std`, relative to the incumbent `best`.
pub fn expected_improvement(mean: f64, std: f64, best: f64) -> f64 {
    let improvement = best - mean;
    if std <= 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    let cdf = 0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2));
    let pdf = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
    improvement * cdf + std * pdf
}

/// Bayesian optimizer minimizing a scalar score.
///
/// The first [`OptimizerConfig::warmup`] suggestions are prior samples. After
/// that each suggestion is the Latin Hypercube candidate with the highest
/// expected improvement under a Gaussian process fitted to the history. Any
/// surrogate failure falls back to a prior sample.
#[derive(Debug)]
pub struct SurrogateOptimizer {
    space: ParameterSpace,
    config: OptimizerConfig,
    rng: StdRng,
    observations: Vec<Observation>,
    gp: Option<GaussianProcess>,
    fit_count: usize,
    last_source: Option<SuggestionSource>,
}

impl SurrogateOptimizer {
    pub fn new(space: ParameterSpace, config: OptimizerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        SurrogateOptimizer {
            space,
            config,
            rng,
            observations: Vec::new(),
            gp: None,
            fit_count: 0,
            last_source: None,
        }
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Number of successful surrogate fits so far.
    pub fn fit_count(&self) -> usize {
        self.fit_count
    }

    pub fn is_fitted(&self) -> bool {
        self.gp.is_some()
    }

    pub fn last_source(&self) -> Option<SuggestionSource> {
        self.last_source
    }

    /// Replaces the score std threshold used by [`check_convergence`].
    ///
    /// [`check_convergence`]: SurrogateOptimizer::check_convergence
    pub fn set_convergence_threshold(&mut self, threshold: f64) {
        self.config.convergence.score_std_threshold = threshold;
    }

    /// Proposes the next parameter vector. Always inside the bounds.
    pub fn suggest(&mut self) -> ParameterVector {
        if self.observations.len() < self.config.warmup {
            self.last_source = Some(SuggestionSource::Prior);
            return self.space.sample_prior(&mut self.rng);
        }

        match self.search() {
            Ok(vector) => {
                self.last_source = Some(SuggestionSource::Surrogate);
                vector
            }
            Err(e) => {
                log::warn!("Surrogate search failed ({}), sampling from prior", e);
                self.last_source = Some(SuggestionSource::Fallback);
                self.space.sample_prior(&mut self.rng)
            }
        }
    }

    /// Records a score for `parameters`, numbering it after the last observation.
    pub fn update(&mut self, parameters: ParameterVector, score: f64) -> Result<(), SpaceError> {
        let iteration = self.observations.last().map_or(1, |o| o.iteration + 1);
        self.observe(Observation {
            parameters,
            score,
            iteration,
            timestamp: Utc::now(),
        })
    }

    /// Appends an observation and refits the surrogate once enough exist.
    pub fn observe(&mut self, observation: Observation) -> Result<(), SpaceError> {
        self.space.check_dimension(&observation.parameters)?;
        self.observations.push(observation);
        if self.observations.len() >= self.config.warmup {
            self.refit();
        }
        Ok(())
    }

    /// Lowest-scoring observation.
    pub fn best_observation(&self) -> Option<&Observation> {
        self.observations
            .iter()
            .filter(|o| !o.score.is_nan())
            .min_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_observation().map(|o| o.score)
    }

    /// True when the trailing window of observations has stopped moving and
    /// stopped improving.
    pub fn check_convergence(&self) -> bool {
        let conv = &self.config.convergence;
        let n = self.observations.len();
        if n < conv.min_observations.max(1) || conv.window == 0 || n < conv.window {
            return false;
        }

        let (earlier, recent) = self.observations.split_at(n - conv.window);

        let scores: Vec<f64> = recent.iter().map(|o| o.score).collect();
        if !(population_std(&scores) < conv.score_std_threshold) {
            return false;
        }

        let params_stable = self.space.parameters().iter().enumerate().all(|(i, p)| {
            let values: Vec<f64> = recent
                .iter()
                .filter_map(|o| o.parameters.get(i))
                .collect();
            let threshold = p.stability_threshold.unwrap_or(conv.parameter_std_threshold);
            population_std(&values) < threshold
        });
        if !params_stable {
            return false;
        }

        let recent_best = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let earlier_best = earlier
            .iter()
            .map(|o| o.score)
            .fold(f64::INFINITY, f64::min);
        let improving = earlier.is_empty() || recent_best < earlier_best;

        !improving
    }

    fn refit(&mut self) {
        let (x, y): (Vec<Vec<f64>>, Vec<f64>) = self
            .observations
            .iter()
            .filter(|o| o.score.is_finite())
            .map(|o| (self.space.to_unit(&o.parameters), o.score))
            .unzip();

        if y.len() < self.config.warmup {
            log::warn!(
                "Only {} finite scores, keeping prior sampling",
                y.len()
            );
            self.gp = None;
            return;
        }

        match GaussianProcess::fit(&x, &y, &self.config.gp_settings()) {
            Ok(gp) => {
                log::debug!(
                    "GP fitted on {} points, length scale {}, log ML {:.3}",
                    gp.n_train(),
                    gp.length_scale(),
                    gp.log_marginal_likelihood()
                );
                self.gp = Some(gp);
                self.fit_count += 1;
            }
            Err(e) => {
                log::warn!("GP fit failed: {}", e);
                self.gp = None;
            }
        }
    }

    fn search(&mut self) -> Result<ParameterVector, OptimizerError> {
        let gp = self.gp.as_ref().ok_or(OptimizerError::NotFitted)?;
        let best = self
            .observations
            .iter()
            .map(|o| o.score)
            .filter(|s| s.is_finite())
            .fold(f64::INFINITY, f64::min);

        let candidates = latin_hypercube(self.config.candidates, self.space.len(), &mut self.rng);

        let mut chosen: Option<(f64, &Vec<f64>)> = None;
        for candidate in &candidates {
            let (mean, std) = gp.predict(candidate);
            let ei = expected_improvement(mean, std, best);
            if !ei.is_finite() {
                continue;
            }
            if chosen.map_or(true, |(best_ei, _)| ei > best_ei) {
                chosen = Some((ei, candidate));
            }
        }

        chosen
            .map(|(_, unit)| self.space.from_unit(unit))
            .ok_or(OptimizerError::NoCandidate(candidates.len()))
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
