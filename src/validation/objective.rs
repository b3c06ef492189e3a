//! Scalar calibration objective built from [`ValidationMetrics`].
//!
//! ```text
//! score = w_rmse     * rmse / s_rmse
//!       + w_ratio    * |ratio_of_means - 1|
//!       + w_seasonal * seasonal_bias / s_seasonal
//!       + w_shape    * rmse_normalized
//! ```
//!
//! Lower is better. With non-negative weights the score is non-decreasing in
//! every term.

use super::metrics::ValidationMetrics;
use serde::{Deserialize, Serialize};

/// Relative importance of each objective term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub rmse: f64,
    pub ratio: f64,
    pub seasonal: f64,
    /// Weight of the normalized (shape) RMSE
    pub shape: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        ObjectiveWeights {
            rmse: 0.35,
            ratio: 0.45,
            seasonal: 0.20,
            shape: 0.0,
        }
    }
}

impl ObjectiveWeights {
    /// Earlier weighting: RMSE, ratio and shape only.
    pub fn legacy() -> Self {
        ObjectiveWeights {
            rmse: 0.4,
            ratio: 0.3,
            seasonal: 0.0,
            shape: 0.3,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.rmse, self.ratio, self.seasonal, self.shape]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Divisors bringing RMSE (kWh) and seasonal bias (kWh²) to order one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveScales {
    pub rmse: f64,
    pub seasonal: f64,
}

impl Default for ObjectiveScales {
    fn default() -> Self {
        ObjectiveScales {
            rmse: 1e6,
            seasonal: 1e12,
        }
    }
}

impl ObjectiveScales {
    pub fn is_valid(&self) -> bool {
        self.rmse.is_finite() && self.rmse > 0.0 && self.seasonal.is_finite() && self.seasonal > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveConfig {
    pub weights: ObjectiveWeights,
    pub scales: ObjectiveScales,
}

impl ObjectiveConfig {
    pub fn legacy() -> Self {
        ObjectiveConfig {
            weights: ObjectiveWeights::legacy(),
            scales: ObjectiveScales::default(),
        }
    }
}

/// Weighted contribution of each term to the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveBreakdown {
    pub rmse_term: f64,
    pub ratio_term: f64,
    pub seasonal_term: f64,
    pub shape_term: f64,
    /// Sum of the terms, or `+inf` if any term is not finite
    pub total: f64,
}

impl ObjectiveBreakdown {
    pub fn compute(metrics: &ValidationMetrics, config: &ObjectiveConfig) -> Self {
        let w = &config.weights;
        let s = &config.scales;

        let rmse_term = w.rmse * metrics.rmse / s.rmse;
        let ratio_term = w.ratio * (metrics.ratio_of_means - 1.0).abs();
        let seasonal_term = w.seasonal * metrics.seasonal_bias / s.seasonal;
        let shape_term = w.shape * metrics.rmse_normalized;

        let terms = [rmse_term, ratio_term, seasonal_term, shape_term];
        let total = if terms.iter().all(|t| t.is_finite()) {
            terms.iter().sum()
        } else {
            f64::INFINITY
        };

        ObjectiveBreakdown {
            rmse_term,
            ratio_term,
            seasonal_term,
            shape_term,
            total,
        }
    }
}

/// Scalar objective of `metrics`; `+inf` when degenerate.
pub fn objective(metrics: &ValidationMetrics, config: &ObjectiveConfig) -> f64 {
    ObjectiveBreakdown::compute(metrics, config).total
}
