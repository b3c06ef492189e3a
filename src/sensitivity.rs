//! Parameter sensitivity tracking across calibration iterations.
//!
//! After each scored iteration the analyzer records a finite-difference impact
//! `|Δscore| / |Δparam|` for every parameter that moved since the previous
//! record. From the third record on it also keeps the Pearson correlation of
//! every parameter with every metric.

use crate::validation::metrics::pearson;
use crate::validation::ValidationMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRecord {
    pub parameters: BTreeMap<String, f64>,
    pub score: f64,
    pub metrics: BTreeMap<String, f64>,
}

/// Mean finite-difference impact of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterImpact {
    pub parameter: String,
    pub mean_impact: f64,
    /// Number of finite differences the mean is taken over
    pub samples: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SensitivityAnalyzer {
    records: Vec<SensitivityRecord>,
    impacts: BTreeMap<String, Vec<f64>>,
    correlations: BTreeMap<String, BTreeMap<String, f64>>,
}

impl SensitivityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one iteration and updates impacts and correlations.
    pub fn record(
        &mut self,
        parameters: BTreeMap<String, f64>,
        score: f64,
        metrics: &ValidationMetrics,
    ) {
        let metrics = metrics
            .named_values()
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        self.records.push(SensitivityRecord {
            parameters,
            score,
            metrics,
        });

        if self.records.len() > 1 {
            self.update_impacts();
        }
        if self.records.len() >= 3 {
            self.update_correlations();
        }

        for impact in self.rankings() {
            log::debug!(
                "Sensitivity {}: {:.4}",
                impact.parameter,
                impact.mean_impact
            );
        }
    }

    pub fn records(&self) -> &[SensitivityRecord] {
        &self.records
    }

    /// Parameters ordered by mean impact, largest first.
    pub fn rankings(&self) -> Vec<ParameterImpact> {
        let mut rankings: Vec<ParameterImpact> = self
            .impacts
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| ParameterImpact {
                parameter: name.clone(),
                mean_impact: values.iter().sum::<f64>() / values.len() as f64,
                samples: values.len(),
            })
            .collect();
        rankings.sort_by(|a, b| b.mean_impact.total_cmp(&a.mean_impact));
        rankings
    }

    /// Correlation of `parameter` with `metric`, once at least three records
    /// exist and both vary.
    pub fn correlation(&self, parameter: &str, metric: &str) -> Option<f64> {
        self.correlations
            .get(parameter)
            .and_then(|m| m.get(metric))
            .copied()
    }

    pub fn correlations(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.correlations
    }

    fn update_impacts(&mut self) {
        let n = self.records.len();
        let (current, previous) = (&self.records[n - 1], &self.records[n - 2]);
        let score_delta = (current.score - previous.score).abs();

        for (name, value) in &current.parameters {
            let Some(prev) = previous.parameters.get(name) else {
                continue;
            };
            let param_delta = (value - prev).abs();
            if param_delta > 0.0 {
                let impact = score_delta / param_delta;
                if impact.is_finite() {
                    self.impacts.entry(name.clone()).or_default().push(impact);
                }
            }
        }
    }

    fn update_correlations(&mut self) {
        let mut correlations: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let Some(first) = self.records.first() else {
            return;
        };

        for parameter in first.parameters.keys() {
            let xs: Vec<f64> = self
                .records
                .iter()
                .filter_map(|r| r.parameters.get(parameter).copied())
                .collect();
            if xs.len() != self.records.len() {
                continue;
            }

            for metric in first.metrics.keys() {
                let ys: Vec<f64> = self
                    .records
                    .iter()
                    .filter_map(|r| r.metrics.get(metric).copied())
                    .collect();
                if ys.len() != xs.len() || ys.iter().any(|y| !y.is_finite()) {
                    continue;
                }
                if let Some(r) = pearson(&xs, &ys) {
                    correlations
                        .entry(parameter.clone())
                        .or_default()
                        .insert(metric.clone(), r);
                }
            }
        }

        self.correlations = correlations;
    }
}
