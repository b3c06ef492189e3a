//! Scoring simulated stock series against metered reference data.

pub mod metrics;
pub mod objective;

use crate::error::ScoringError;
use crate::series::HourlySeries;
use serde::{Deserialize, Serialize};

pub use metrics::{min_max_normalize, ValidationMetrics};
pub use objective::{
    objective, ObjectiveBreakdown, ObjectiveConfig, ObjectiveScales, ObjectiveWeights,
};

/// Metrics and objective of one scored series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub metrics: ValidationMetrics,
    pub breakdown: ObjectiveBreakdown,
    /// Always finite
    pub score: f64,
}

/// Scores simulated series against a fixed reference.
#[derive(Debug, Clone)]
pub struct ValidationScorer {
    reference: HourlySeries,
    objective: ObjectiveConfig,
}

impl ValidationScorer {
    /// Fails when the reference has non-finite values or a zero mean.
    pub fn new(reference: HourlySeries, objective: ObjectiveConfig) -> Result<Self, ScoringError> {
        if reference.values().iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::NonFinite("reference"));
        }
        if reference.mean() == 0.0 {
            return Err(ScoringError::ZeroReferenceMean);
        }
        Ok(ValidationScorer {
            reference,
            objective,
        })
    }

    pub fn reference(&self) -> &HourlySeries {
        &self.reference
    }

    pub fn objective_config(&self) -> &ObjectiveConfig {
        &self.objective
    }

    pub fn metrics(&self, simulated: &HourlySeries) -> Result<ValidationMetrics, ScoringError> {
        ValidationMetrics::compute(self.reference.values(), simulated.values())
    }

    /// Objective of precomputed metrics; `+inf` when degenerate.
    pub fn objective(&self, metrics: &ValidationMetrics) -> f64 {
        objective(metrics, &self.objective)
    }

    /// Computes metrics and objective, rejecting a non-finite objective.
    pub fn score(&self, simulated: &HourlySeries) -> Result<ScoreCard, ScoringError> {
        let metrics = self.metrics(simulated)?;
        let breakdown = ObjectiveBreakdown::compute(&metrics, &self.objective);

        log::info!(
            "RMSE {:.2} kWh, ratio {:.6}, seasonal bias {:.2}, normalized RMSE {:.3}, R² {:.3}",
            metrics.rmse,
            metrics.ratio_of_means,
            metrics.seasonal_bias,
            metrics.rmse_normalized,
            metrics.r2_normalized
        );

        if !breakdown.total.is_finite() {
            return Err(ScoringError::NonFiniteObjective);
        }

        log::info!(
            "Objective {:.4} (rmse {:.4}, ratio {:.4}, seasonal {:.4}, shape {:.4})",
            breakdown.total,
            breakdown.rmse_term,
            breakdown.ratio_term,
            breakdown.seasonal_term,
            breakdown.shape_term
        );

        Ok(ScoreCard {
            metrics,
            breakdown,
            score: breakdown.total,
        })
    }
}
