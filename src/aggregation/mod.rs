//! Weighted aggregation of per-building series into one stock series.

pub mod weights;

use crate::error::IterationError;
use crate::series::{EndUse, HourlySeries, SeriesStatistics};
use crate::stock::{Archetype, ReferencePopulation, TypeMapping};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use weights::{compute_weights, BuildingWeight, BuildingWeights, WeightMode};

/// Aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Accepted relative deviation of the weight sum from the population
    pub weight_tolerance: f64,
    pub mode: WeightMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            weight_tolerance: 0.01,
            mode: WeightMode::Population,
        }
    }
}

/// Provenance of an aggregated series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetadata {
    /// Weighted buildings whose output was included
    pub processed: usize,
    /// Weighted buildings expected to produce an output
    pub candidates: usize,
    /// `processed / candidates`
    pub success_rate: f64,
    /// Weighted buildings without an output
    pub missing: Vec<String>,
    /// Statistics of each end use of the aggregated series
    pub statistics: BTreeMap<String, SeriesStatistics>,
}

impl AggregationMetadata {
    /// Statistics of the total electricity column.
    pub fn total_statistics(&self) -> Option<&SeriesStatistics> {
        self.statistics.get(&EndUse::Total.to_string())
    }
}

/// A stock-level series together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    pub series: HourlySeries,
    pub metadata: AggregationMetadata,
}

/// Combines building outputs using a cached weight table.
#[derive(Debug, Clone, Default)]
pub struct WeightedAggregator {
    config: AggregationConfig,
    weights: Option<BuildingWeights>,
}

impl WeightedAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        WeightedAggregator {
            config,
            weights: None,
        }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Returns the weight table, computing it on first use.
    pub fn compute_weights(
        &mut self,
        selected: &[Archetype],
        population: &ReferencePopulation,
        mapping: &TypeMapping,
    ) -> &BuildingWeights {
        let config = &self.config;
        self.weights.get_or_insert_with(|| {
            compute_weights(
                selected,
                population,
                mapping,
                config.mode,
                config.weight_tolerance,
            )
        })
    }

    /// Installs a precomputed weight table.
    pub fn set_weights(&mut self, weights: BuildingWeights) {
        self.weights = Some(weights);
    }

    pub fn weights(&self) -> Option<&BuildingWeights> {
        self.weights.as_ref()
    }

    /// Drops the cached weights so the next call recomputes them.
    pub fn invalidate(&mut self) {
        self.weights = None;
    }

    /// Weighted element-wise sum of the available outputs.
    ///
    /// Buildings in `weights` without an output are reported as missing and
    /// contribute nothing. Outputs of buildings without a weight are ignored.
    pub fn aggregate(
        &self,
        outputs: &BTreeMap<String, HourlySeries>,
        weights: &BuildingWeights,
    ) -> Result<AggregatedSeries, IterationError> {
        let mut total = HourlySeries::zeros();
        let mut processed = 0;
        let mut missing = Vec::new();

        for entry in weights.iter() {
            match outputs.get(&entry.building_id) {
                Some(series) => {
                    total.accumulate(series, entry.weight);
                    processed += 1;
                }
                None => {
                    log::warn!("No output for {}", entry.building_id);
                    missing.push(entry.building_id.clone());
                }
            }
        }

        for id in outputs.keys().filter(|id| weights.get(id).is_none()) {
            log::debug!("Ignoring output of unweighted building {}", id);
        }

        let candidates = weights.len();
        if processed == 0 {
            return Err(IterationError::NoOutput {
                attempted: candidates,
            });
        }

        let success_rate = processed as f64 / candidates as f64;
        let statistics: BTreeMap<String, SeriesStatistics> = total
            .statistics()
            .into_iter()
            .map(|(end_use, stats)| (end_use.to_string(), stats))
            .collect();

        let metadata = AggregationMetadata {
            processed,
            candidates,
            success_rate,
            missing,
            statistics,
        };

        if let Some(stats) = metadata.total_statistics() {
            log::info!(
                "Aggregated {}/{} buildings: annual {:.0} kWh, peak {:.0} kWh",
                processed,
                candidates,
                stats.total_annual,
                stats.max
            );
        }

        Ok(AggregatedSeries {
            series: total,
            metadata,
        })
    }
}
