//! Error metrics between a reference and a simulated series.

use crate::error::ScoringError;
use crate::series::{normalize_length, Season};
use serde::{Deserialize, Serialize};

/// Comparison of a simulated series with the metered reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Root mean squared error (kWh)
    pub rmse: f64,
    /// Mean absolute error (kWh)
    pub mae: f64,
    /// `mean(simulated) / mean(reference)`
    pub ratio_of_means: f64,
    /// Mean squared error over December, January and February (kWh²)
    pub winter_mse: f64,
    /// Mean squared error over June, July and August (kWh²)
    pub summer_mse: f64,
    /// `|winter_mse - summer_mse|`
    pub seasonal_bias: f64,
    /// RMSE between the min-max normalized series
    pub rmse_normalized: f64,
    /// Squared correlation between the min-max normalized series
    pub r2_normalized: f64,
    pub reference_mean: f64,
    pub simulated_mean: f64,
}

impl ValidationMetrics {
    /// Computes all metrics. Both inputs are normalized to 8760 values first.
    ///
    /// A zero reference mean yields a non-finite `ratio_of_means` rather than
    /// an error; the objective treats it as degenerate.
    pub fn compute(reference: &[f64], simulated: &[f64]) -> Result<Self, ScoringError> {
        let reference = normalize_length(reference.to_vec()).map_err(|_| ScoringError::Empty)?;
        let simulated = normalize_length(simulated.to_vec()).map_err(|_| ScoringError::Empty)?;

        if reference.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::NonFinite("reference"));
        }
        if simulated.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::NonFinite("simulated"));
        }

        let n = reference.len() as f64;
        let reference_mean = reference.iter().sum::<f64>() / n;
        let simulated_mean = simulated.iter().sum::<f64>() / n;

        let mut sq_sum = 0.0;
        let mut abs_sum = 0.0;
        let (mut winter_sum, mut winter_n) = (0.0, 0usize);
        let (mut summer_sum, mut summer_n) = (0.0, 0usize);

        for (hour, (r, s)) in reference.iter().zip(simulated.iter()).enumerate() {
            let err = s - r;
            let sq = err * err;
            sq_sum += sq;
            abs_sum += err.abs();
            match Season::of_hour(hour) {
                Season::Winter => {
                    winter_sum += sq;
                    winter_n += 1;
                }
                Season::Summer => {
                    summer_sum += sq;
                    summer_n += 1;
                }
                Season::Shoulder => {}
            }
        }

        let winter_mse = mean_or_zero(winter_sum, winter_n);
        let summer_mse = mean_or_zero(summer_sum, summer_n);

        let ref_norm = min_max_normalize(&reference);
        let sim_norm = min_max_normalize(&simulated);
        let rmse_normalized = (ref_norm
            .iter()
            .zip(sim_norm.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        let r2_normalized = match pearson(&ref_norm, &sim_norm) {
            Some(r) => r * r,
            None if rmse_normalized == 0.0 => 1.0,
            None => 0.0,
        };

        Ok(ValidationMetrics {
            rmse: (sq_sum / n).sqrt(),
            mae: abs_sum / n,
            ratio_of_means: simulated_mean / reference_mean,
            winter_mse,
            summer_mse,
            seasonal_bias: (winter_mse - summer_mse).abs(),
            rmse_normalized,
            r2_normalized,
            reference_mean,
            simulated_mean,
        })
    }

    /// Every metric with its name, in declaration order.
    pub fn named_values(&self) -> [(&'static str, f64); 10] {
        [
            ("rmse", self.rmse),
            ("mae", self.mae),
            ("ratio_of_means", self.ratio_of_means),
            ("winter_mse", self.winter_mse),
            ("summer_mse", self.summer_mse),
            ("seasonal_bias", self.seasonal_bias),
            ("rmse_normalized", self.rmse_normalized),
            ("r2_normalized", self.r2_normalized),
            ("reference_mean", self.reference_mean),
            ("simulated_mean", self.simulated_mean),
        ]
    }

    /// Renders the metrics as a markdown table.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!("| RMSE (kWh) | {:.2} |\n", self.rmse));
        output.push_str(&format!("| MAE (kWh) | {:.2} |\n", self.mae));
        output.push_str(&format!("| Ratio of means | {:.6} |\n", self.ratio_of_means));
        output.push_str(&format!("| Winter MSE (kWh²) | {:.2} |\n", self.winter_mse));
        output.push_str(&format!("| Summer MSE (kWh²) | {:.2} |\n", self.summer_mse));
        output.push_str(&format!("| Seasonal bias (kWh²) | {:.2} |\n", self.seasonal_bias));
        output.push_str(&format!("| Normalized RMSE | {:.4} |\n", self.rmse_normalized));
        output.push_str(&format!("| Normalized R² | {:.4} |\n", self.r2_normalized));
        output.push_str(&format!("| Reference mean (kWh) | {:.2} |\n", self.reference_mean));
        output.push_str(&format!("| Simulated mean (kWh) | {:.2} |\n", self.simulated_mean));
        output
    }
}

fn mean_or_zero(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Scales values onto `[0, 1]`. A constant series maps to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !(range > 0.0) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Pearson correlation, or `None` when either input has zero variance.
pub(crate) fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n == 0 {
        return None;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(b[..n].iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}
