//! Descriptive statistics of an hourly series.

use super::{Season, HOURS_PER_YEAR};
use serde::{Deserialize, Serialize};

/// Summary statistics of one end-use column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Sum over all hours (kWh)
    pub total_annual: f64,
    /// Mean over December, January and February
    pub winter_mean: f64,
    /// Mean over June, July and August
    pub summer_mean: f64,
}

impl SeriesStatistics {
    /// Computes statistics of a slice interpreted as hours of the representative year.
    ///
    /// An empty slice yields all-zero statistics.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return SeriesStatistics {
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
                total_annual: 0.0,
                winter_mean: 0.0,
                summer_mean: 0.0,
            };
        }

        let n = values.len() as f64;
        let total: f64 = values.iter().sum();
        let mean = total / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        SeriesStatistics {
            mean,
            std: variance.sqrt(),
            min,
            max,
            total_annual: total,
            winter_mean: seasonal_mean(values, Season::Winter),
            summer_mean: seasonal_mean(values, Season::Summer),
        }
    }
}

fn seasonal_mean(values: &[f64], season: Season) -> f64 {
    let (sum, count) = values
        .iter()
        .take(HOURS_PER_YEAR)
        .enumerate()
        .filter(|(h, _)| Season::of_hour(*h) == season)
        .fold((0.0, 0usize), |(s, c), (_, v)| (s + v, c + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
