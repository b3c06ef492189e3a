//! Parallel per-building simulation.

use super::collaborators::{SimulationEngine, SimulationInputs};
use crate::error::{CampaignError, SimulationError};
use crate::series::HourlySeries;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Result of one building simulation.
#[derive(Debug, Clone)]
pub struct BuildingOutcome {
    pub building_id: String,
    pub result: Result<HourlySeries, SimulationError>,
    pub duration: Duration,
}

/// Number of workers for a share of the available cores, at least one.
pub fn worker_count(fraction: f64, cpus: usize) -> usize {
    ((cpus as f64 * fraction).floor() as usize).max(1)
}

/// A dedicated thread pool sized to a fraction of the CPU cores.
#[derive(Debug)]
pub struct SimulationPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl SimulationPool {
    pub fn new(worker_fraction: f64) -> Result<Self, CampaignError> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(worker_count(worker_fraction, cpus))
    }

    pub fn with_workers(workers: usize) -> Result<Self, CampaignError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("stockcal-sim-{}", i))
            .build()
            .map_err(|e| CampaignError::InvalidConfig(format!("thread pool: {}", e)))?;
        log::info!("Simulation pool with {} workers", workers);
        Ok(SimulationPool { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Simulates every job and returns once all of them have finished.
    /// Outcomes are in job order.
    pub fn run(
        &self,
        jobs: &[SimulationInputs],
        engine: &dyn SimulationEngine,
    ) -> Vec<BuildingOutcome> {
        self.pool.install(|| {
            jobs.par_iter()
                .map(|inputs| {
                    let start = Instant::now();
                    let result = engine.simulate(&inputs.building_id, inputs);
                    if let Err(e) = &result {
                        log::warn!("Simulation failed: {}", e);
                    }
                    BuildingOutcome {
                        building_id: inputs.building_id.clone(),
                        result,
                        duration: start.elapsed(),
                    }
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn job(id: &str) -> SimulationInputs {
        SimulationInputs {
            building_id: id.to_string(),
            values: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(0.8, 10), 8);
        assert_eq!(worker_count(0.8, 4), 3);
        assert_eq!(worker_count(0.8, 1), 1);
        assert_eq!(worker_count(0.1, 2), 1);
    }

    #[test]
    fn test_run_preserves_order_and_failures() {
        let pool = SimulationPool::with_workers(3).unwrap();
        let engine = |id: &str, _: &SimulationInputs| {
            if id == "bad" {
                Err(SimulationError::EngineFailed {
                    building: id.to_string(),
                    reason: "exit code 1".to_string(),
                })
            } else {
                Ok(HourlySeries::constant(1.0))
            }
        };
        let jobs: Vec<_> = ["a", "bad", "c", "d"].iter().map(|id| job(id)).collect();
        let outcomes = pool.run(&jobs, &engine);

        assert_eq!(outcomes.len(), 4);
        let ids: Vec<_> = outcomes.iter().map(|o| o.building_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "bad", "c", "d"]);
        assert!(outcomes[1].result.is_err());
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 3);
        assert_eq!(pool.workers(), 3);
    }
}
