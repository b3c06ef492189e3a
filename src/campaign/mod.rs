//! The calibration loop.
//!
//! A [`CalibrationLoop`] owns one optimizer, one aggregator and one sensitivity
//! analyzer. Each iteration asks the optimizer for a parameter vector, maps it
//! onto every weighted archetype, simulates the buildings in parallel, sums the
//! outputs into a stock series and scores it against the metered reference.
//!
//! A building that fails is left out of the sum. An iteration with nothing to
//! score is skipped and the optimizer is not told about it. Only a setup
//! failure ends the campaign early.

pub mod collaborators;
pub mod command;
pub mod journal;
pub mod pool;

use crate::aggregation::{BuildingWeights, WeightedAggregator};
use crate::config::CalibrationConfig;
use crate::error::{CampaignError, IterationError};
use crate::optimizer::{Observation, SuggestionSource, SurrogateOptimizer};
use crate::sensitivity::{ParameterImpact, SensitivityAnalyzer};
use crate::series::ReferenceSource;
use crate::stock::{Archetype, ReferencePopulation, TypeMapping};
use crate::validation::ValidationScorer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

pub use collaborators::{
    map_archetype_to_parameters, AttributeMapper, ParameterMapper, SimulationEngine,
    SimulationInputs,
};
pub use command::CommandEngine;
pub use journal::{CampaignJournal, IterationRecord};
pub use pool::{worker_count, BuildingOutcome, SimulationPool};

/// Why a campaign stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Termination {
    Converged,
    BudgetExhausted,
    Failed(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "Converged"),
            Termination::BudgetExhausted => write!(f, "Budget exhausted"),
            Termination::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Lifecycle of a [`CalibrationLoop`].
#[derive(Debug, Clone, PartialEq)]
pub enum CampaignState {
    NotStarted,
    Running,
    Done(Termination),
}

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    /// Objective, absent when the iteration was skipped
    pub score: Option<f64>,
    pub source: Option<SuggestionSource>,
    /// Weighted buildings attempted
    pub simulations: usize,
    /// Buildings whose inputs or simulation failed
    pub failures: usize,
    pub success_rate: f64,
    pub duration_secs: f64,
    /// Reason the iteration was skipped
    pub error: Option<String>,
}

impl IterationStats {
    fn new(iteration: usize) -> Self {
        IterationStats {
            iteration,
            score: None,
            source: None,
            simulations: 0,
            failures: 0,
            success_rate: 0.0,
            duration_secs: 0.0,
            error: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.error.is_some()
    }
}

/// Timing and throughput of the iterations run by this loop.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CampaignPerformance {
    pub total_duration_secs: f64,
    pub mean_iteration_secs: f64,
    /// Mean building success rate over all iterations, skipped ones included
    pub mean_success_rate: f64,
    pub skipped_iterations: usize,
    pub simulations_run: usize,
    pub simulations_failed: usize,
    pub workers: usize,
}

impl CampaignPerformance {
    fn from_history(history: &[IterationStats], total: Duration, workers: usize) -> Self {
        let n = history.len();
        let mean = |f: fn(&IterationStats) -> f64| {
            if n == 0 {
                0.0
            } else {
                history.iter().map(f).sum::<f64>() / n as f64
            }
        };
        CampaignPerformance {
            total_duration_secs: total.as_secs_f64(),
            mean_iteration_secs: mean(|s| s.duration_secs),
            mean_success_rate: mean(|s| s.success_rate),
            skipped_iterations: history.iter().filter(|s| s.is_skipped()).count(),
            simulations_run: history.iter().map(|s| s.simulations).sum(),
            simulations_failed: history.iter().map(|s| s.failures).sum(),
            workers,
        }
    }
}

/// Outcome of a campaign, or a snapshot of one in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignResult {
    /// Absent while the campaign has not finished
    pub termination: Option<Termination>,
    pub best_score: Option<f64>,
    pub best_parameters: Option<BTreeMap<String, f64>>,
    /// Number of the last iteration reached, replayed and skipped ones included
    pub iterations_completed: usize,
    /// Iterations replayed from a journal
    pub resumed_iterations: usize,
    pub performance: CampaignPerformance,
    pub history: Vec<IterationStats>,
    pub sensitivity: Vec<ParameterImpact>,
}

impl CampaignResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Calibration Campaign Report\n\n");
        let outcome = self
            .termination
            .as_ref()
            .map_or_else(|| "Running".to_string(), |t| t.to_string());
        output.push_str(&format!("**Outcome:** {}\n\n", outcome));
        output.push_str(&format!(
            "**Iterations:** {} ({} resumed, {} skipped)\n\n",
            self.iterations_completed,
            self.resumed_iterations,
            self.performance.skipped_iterations
        ));
        match self.best_score {
            Some(score) => output.push_str(&format!("**Best score:** {:.6}\n\n", score)),
            None => output.push_str("**Best score:** none\n\n"),
        }

        if let Some(parameters) = &self.best_parameters {
            output.push_str("## Best Parameters\n\n");
            output.push_str("| Parameter | Value |\n");
            output.push_str("|-----------|-------|\n");
            for (name, value) in parameters {
                output.push_str(&format!("| {} | {:.4} |\n", name, value));
            }
            output.push('\n');
        }

        let perf = &self.performance;
        output.push_str("## Performance\n\n");
        output.push_str("| Metric | Value |\n");
        output.push_str("|--------|-------|\n");
        output.push_str(&format!(
            "| Total duration (s) | {:.1} |\n",
            perf.total_duration_secs
        ));
        output.push_str(&format!(
            "| Mean iteration (s) | {:.1} |\n",
            perf.mean_iteration_secs
        ));
        output.push_str(&format!(
            "| Mean success rate | {:.1}% |\n",
            perf.mean_success_rate * 100.0
        ));
        output.push_str(&format!(
            "| Simulations (failed) | {} ({}) |\n",
            perf.simulations_run, perf.simulations_failed
        ));
        output.push_str(&format!("| Workers | {} |\n\n", perf.workers));

        if !self.history.is_empty() {
            output.push_str("## Iterations\n\n");
            output.push_str("| Iteration | Score | Success rate | Source | Duration (s) | Note |\n");
            output.push_str("|-----------|-------|--------------|--------|--------------|------|\n");
            for stats in &self.history {
                let score = stats
                    .score
                    .map_or_else(|| "-".to_string(), |s| format!("{:.6}", s));
                let source = match stats.source {
                    Some(SuggestionSource::Prior) => "prior",
                    Some(SuggestionSource::Surrogate) => "surrogate",
                    Some(SuggestionSource::Fallback) => "fallback",
                    None => "-",
                };
                output.push_str(&format!(
                    "| {} | {} | {:.1}% | {} | {:.1} | {} |\n",
                    stats.iteration,
                    score,
                    stats.success_rate * 100.0,
                    source,
                    stats.duration_secs,
                    stats.error.as_deref().unwrap_or("")
                ));
            }
            output.push('\n');
        }

        if !self.sensitivity.is_empty() {
            output.push_str("## Parameter Sensitivity\n\n");
            output.push_str("| Parameter | Mean impact | Samples |\n");
            output.push_str("|-----------|-------------|---------|\n");
            for impact in &self.sensitivity {
                output.push_str(&format!(
                    "| {} | {:.4} | {} |\n",
                    impact.parameter, impact.mean_impact, impact.samples
                ));
            }
        }

        output
    }
}

/// Resources acquired once per campaign.
struct Setup {
    scorer: ValidationScorer,
    weights: BuildingWeights,
    pool: SimulationPool,
}

/// Drives a calibration campaign over a selected set of archetypes.
pub struct CalibrationLoop {
    config: CalibrationConfig,
    archetypes: Vec<Archetype>,
    population: ReferencePopulation,
    mapping: TypeMapping,
    reference: Box<dyn ReferenceSource>,
    engine: Box<dyn SimulationEngine>,
    mapper: Box<dyn ParameterMapper>,
    optimizer: SurrogateOptimizer,
    aggregator: WeightedAggregator,
    sensitivity: SensitivityAnalyzer,
    journal: Option<CampaignJournal>,
    state: CampaignState,
    history: Vec<IterationStats>,
    next_iteration: usize,
    resumed: usize,
    workers: usize,
    elapsed: Duration,
}

impl CalibrationLoop {
    /// Fails when the configuration is invalid.
    pub fn new(
        config: CalibrationConfig,
        archetypes: Vec<Archetype>,
        population: ReferencePopulation,
        mapping: TypeMapping,
        reference: Box<dyn ReferenceSource>,
        engine: Box<dyn SimulationEngine>,
    ) -> Result<Self, CampaignError> {
        config.validate()?;
        let space = config.parameter_space()?;
        let optimizer = SurrogateOptimizer::new(space, config.optimizer.clone());
        let aggregator = WeightedAggregator::new(config.aggregation.clone());

        Ok(CalibrationLoop {
            config,
            archetypes,
            population,
            mapping,
            reference,
            engine,
            mapper: Box::new(AttributeMapper),
            optimizer,
            aggregator,
            sensitivity: SensitivityAnalyzer::new(),
            journal: None,
            state: CampaignState::NotStarted,
            history: Vec::new(),
            next_iteration: 1,
            resumed: 0,
            workers: 0,
            elapsed: Duration::ZERO,
        })
    }

    pub fn with_mapper(mut self, mapper: Box<dyn ParameterMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Uses `journal` instead of the configured journal path.
    pub fn with_journal(mut self, journal: CampaignJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn state(&self) -> &CampaignState {
        &self.state
    }

    pub fn optimizer(&self) -> &SurrogateOptimizer {
        &self.optimizer
    }

    pub fn sensitivity(&self) -> &SensitivityAnalyzer {
        &self.sensitivity
    }

    pub fn history(&self) -> &[IterationStats] {
        &self.history
    }

    /// Replays journal records into the optimizer and the sensitivity
    /// analyzer. Iteration numbering continues after the last record.
    pub fn resume_from_journal(
        &mut self,
        records: &[IterationRecord],
    ) -> Result<usize, CampaignError> {
        if self.state != CampaignState::NotStarted {
            return Err(CampaignError::AlreadyRun);
        }

        for record in records {
            if !record.score.is_finite() {
                log::warn!(
                    "Ignoring journal iteration {} with non-finite score",
                    record.iteration
                );
                continue;
            }
            let parameters = self.optimizer.space().vector_from_map(&record.parameters)?;
            self.optimizer.observe(Observation {
                parameters,
                score: record.score,
                iteration: record.iteration,
                timestamp: record.timestamp,
            })?;
            self.sensitivity
                .record(record.parameters.clone(), record.score, &record.metrics);
            self.next_iteration = self.next_iteration.max(record.iteration + 1);
            self.resumed += 1;
        }

        log::info!(
            "Resumed {} iterations, continuing at iteration {}",
            self.resumed,
            self.next_iteration
        );
        Ok(self.resumed)
    }

    /// Reads `journal` and replays it, see [`resume_from_journal`].
    ///
    /// [`resume_from_journal`]: CalibrationLoop::resume_from_journal
    pub fn resume_from(&mut self, journal: &CampaignJournal) -> Result<usize, CampaignError> {
        let records = journal.read()?;
        self.resume_from_journal(&records)
    }

    /// Runs iterations until convergence or until iteration `max_iterations`
    /// has been reached. `convergence_threshold` bounds the score std over the
    /// convergence window.
    ///
    /// A loop runs at most once.
    pub fn run_campaign(
        &mut self,
        max_iterations: usize,
        convergence_threshold: f64,
    ) -> Result<CampaignResult, CampaignError> {
        if self.state != CampaignState::NotStarted {
            return Err(CampaignError::AlreadyRun);
        }
        self.state = CampaignState::Running;
        let start = Instant::now();

        let setup = match self.setup(convergence_threshold) {
            Ok(setup) => setup,
            Err(e) => {
                log::error!("Campaign setup failed: {}", e);
                self.elapsed = start.elapsed();
                self.state = CampaignState::Done(Termination::Failed(e.to_string()));
                return Err(e);
            }
        };

        log::info!(
            "Starting calibration: {} weighted buildings, up to {} iterations",
            setup.weights.len(),
            max_iterations
        );

        let termination = loop {
            if self.optimizer.check_convergence() {
                log::info!("Converged after iteration {}", self.next_iteration - 1);
                break Termination::Converged;
            }
            if self.next_iteration > max_iterations {
                break Termination::BudgetExhausted;
            }

            let iteration = self.next_iteration;
            self.next_iteration += 1;
            log::info!("Iteration {}/{}", iteration, max_iterations);

            let started = Instant::now();
            let mut stats = IterationStats::new(iteration);
            match self.run_iteration(iteration, &setup, &mut stats) {
                Ok(record) => {
                    stats.score = Some(record.score);
                    self.append_journal(&record);
                }
                Err(e) => {
                    log::error!("Iteration {} skipped: {}", iteration, e);
                    stats.error = Some(e.to_string());
                }
            }
            stats.duration_secs = started.elapsed().as_secs_f64();
            self.history.push(stats);
            self.elapsed = start.elapsed();
        };

        self.elapsed = start.elapsed();
        self.state = CampaignState::Done(termination);

        let result = self.progress();
        match result.best_score {
            Some(score) => log::info!(
                "Campaign finished ({}), best score {:.6}",
                self.state_label(),
                score
            ),
            None => log::warn!("Campaign finished ({}) without a score", self.state_label()),
        }
        Ok(result)
    }

    /// Snapshot of the campaign so far. Available in every state.
    pub fn progress(&self) -> CampaignResult {
        let best = self
            .optimizer
            .best_observation()
            .filter(|o| o.score.is_finite());
        let termination = match &self.state {
            CampaignState::Done(t) => Some(t.clone()),
            _ => None,
        };

        CampaignResult {
            termination,
            best_score: best.map(|o| o.score),
            best_parameters: best.map(|o| self.optimizer.space().named(&o.parameters)),
            iterations_completed: self.next_iteration - 1,
            resumed_iterations: self.resumed,
            performance: CampaignPerformance::from_history(
                &self.history,
                self.elapsed,
                self.workers,
            ),
            history: self.history.clone(),
            sensitivity: self.sensitivity.rankings(),
        }
    }

    fn state_label(&self) -> String {
        match &self.state {
            CampaignState::NotStarted => "not started".to_string(),
            CampaignState::Running => "running".to_string(),
            CampaignState::Done(t) => t.to_string(),
        }
    }

    fn setup(&mut self, convergence_threshold: f64) -> Result<Setup, CampaignError> {
        if !(convergence_threshold.is_finite() && convergence_threshold >= 0.0) {
            return Err(CampaignError::InvalidConfig(format!(
                "convergence threshold must be finite and non-negative, got {}",
                convergence_threshold
            )));
        }
        self.optimizer.set_convergence_threshold(convergence_threshold);

        let year = self.config.campaign.reference_year;
        let reference = self
            .reference
            .load(year)
            .map_err(CampaignError::ReferenceUnavailable)?;
        log::info!(
            "Reference {} loaded: mean {:.2} kWh/h",
            year,
            reference.mean()
        );
        let scorer = ValidationScorer::new(reference, self.config.objective)
            .map_err(CampaignError::InvalidReference)?;

        let weights = self
            .aggregator
            .compute_weights(&self.archetypes, &self.population, &self.mapping)
            .clone();
        if weights.is_empty() {
            return Err(CampaignError::NoBuildings);
        }
        if let Some(bad) = weights
            .iter()
            .find(|w| !(w.weight.is_finite() && w.weight >= 0.0))
        {
            return Err(CampaignError::InvalidWeight {
                building: bad.building_id.clone(),
                weight: bad.weight,
            });
        }

        let pool = SimulationPool::new(self.config.campaign.worker_fraction)?;
        self.workers = pool.workers();

        if self.journal.is_none() {
            if let Some(path) = &self.config.campaign.journal_path {
                self.journal = Some(CampaignJournal::open(path.clone())?);
            }
        }

        Ok(Setup {
            scorer,
            weights,
            pool,
        })
    }

    fn run_iteration(
        &mut self,
        iteration: usize,
        setup: &Setup,
        stats: &mut IterationStats,
    ) -> Result<IterationRecord, IterationError> {
        let vector = self.optimizer.suggest();
        stats.source = self.optimizer.last_source();

        let space = self.optimizer.space();
        let parameters = space.named(&vector);
        let overrides = space.overrides(&vector)?;
        for (name, value) in &parameters {
            log::info!("  {} = {:.4}", name, value);
        }

        let mut jobs = Vec::new();
        let mut seen = BTreeSet::new();
        for archetype in &self.archetypes {
            if setup.weights.get(&archetype.id).is_none() || !seen.insert(archetype.id.as_str()) {
                continue;
            }
            stats.simulations += 1;
            match self.mapper.map(archetype, &overrides) {
                Ok(inputs) => jobs.push(inputs),
                Err(e) => {
                    log::warn!("{}", e);
                    stats.failures += 1;
                }
            }
        }

        let mut outputs = BTreeMap::new();
        for outcome in setup.pool.run(&jobs, self.engine.as_ref()) {
            match outcome.result {
                Ok(series) => {
                    outputs.insert(outcome.building_id, series);
                }
                Err(_) => stats.failures += 1,
            }
        }

        let aggregated = self.aggregator.aggregate(&outputs, &setup.weights)?;
        stats.success_rate = aggregated.metadata.success_rate;
        log::info!(
            "Aggregated {}/{} buildings ({:.1}%)",
            aggregated.metadata.processed,
            aggregated.metadata.candidates,
            aggregated.metadata.success_rate * 100.0
        );

        let card = setup.scorer.score(&aggregated.series)?;
        let timestamp = Utc::now();

        self.optimizer.observe(Observation {
            parameters: vector,
            score: card.score,
            iteration,
            timestamp,
        })?;
        self.sensitivity
            .record(parameters.clone(), card.score, &card.metrics);

        Ok(IterationRecord {
            iteration,
            timestamp,
            parameters,
            score: card.score,
            metrics: card.metrics,
            breakdown: card.breakdown,
            aggregation: aggregated.metadata,
            sensitivity: self.sensitivity.rankings(),
        })
    }

    fn append_journal(&self, record: &IterationRecord) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(record) {
                log::error!("Could not journal iteration {}: {}", record.iteration, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::WeightMode;
    use crate::error::{SeriesError, SimulationError};
    use crate::series::{HourlySeries, InMemoryReference};

    fn config() -> CalibrationConfig {
        let mut config = CalibrationConfig::default();
        config.optimizer.seed = Some(11);
        config.optimizer.candidates = 200;
        config.aggregation.mode = WeightMode::Single;
        config
    }

    fn archetypes() -> Vec<Archetype> {
        vec![
            Archetype::new("B1", "Single Detached"),
            Archetype::new("B2", "Single Detached"),
        ]
    }

    fn reference(year: i32) -> Box<dyn ReferenceSource> {
        Box::new(InMemoryReference::new().with_year(year, HourlySeries::constant(100.0)))
    }

    /// Each building draws 2.5 kWh per degree of heating setpoint.
    fn setpoint_engine(_: &str, inputs: &SimulationInputs) -> Result<HourlySeries, SimulationError> {
        let setpoint = inputs.get("hvac_control.heating_setpoint").unwrap_or(0.0);
        Ok(HourlySeries::constant(2.5 * setpoint))
    }

    fn calibration_loop(
        reference: Box<dyn ReferenceSource>,
        engine: Box<dyn SimulationEngine>,
    ) -> CalibrationLoop {
        CalibrationLoop::new(
            config(),
            archetypes(),
            ReferencePopulation::default(),
            TypeMapping::residential_default(),
            reference,
            engine,
        )
        .unwrap()
    }

    #[test]
    fn test_budget_exhausted() {
        let mut cal = calibration_loop(reference(2022), Box::new(setpoint_engine));
        let result = cal.run_campaign(4, 0.01).unwrap();

        assert_eq!(result.termination, Some(Termination::BudgetExhausted));
        assert_eq!(result.iterations_completed, 4);
        assert_eq!(result.history.len(), 4);
        assert_eq!(result.performance.skipped_iterations, 0);
        assert_eq!(result.performance.simulations_run, 8);
        assert!((result.performance.mean_success_rate - 1.0).abs() < 1e-12);
        assert!(result.best_score.unwrap().is_finite());
        assert_eq!(result.best_parameters.unwrap().len(), 5);
        assert_eq!(cal.optimizer().observations().len(), 4);
        assert_eq!(
            cal.state(),
            &CampaignState::Done(Termination::BudgetExhausted)
        );
    }

    #[test]
    fn test_runs_only_once() {
        let mut cal = calibration_loop(reference(2022), Box::new(setpoint_engine));
        cal.run_campaign(1, 0.01).unwrap();
        assert_eq!(cal.run_campaign(1, 0.01), Err(CampaignError::AlreadyRun));
    }

    #[test]
    fn test_missing_reference_fails_setup() {
        let mut cal = calibration_loop(reference(2021), Box::new(setpoint_engine));
        let err = cal.run_campaign(3, 0.01).unwrap_err();
        assert_eq!(
            err,
            CampaignError::ReferenceUnavailable(SeriesError::MissingYear(2022))
        );
        assert!(matches!(
            cal.state(),
            CampaignState::Done(Termination::Failed(_))
        ));

        let progress = cal.progress();
        assert!(matches!(progress.termination, Some(Termination::Failed(_))));
        assert_eq!(progress.iterations_completed, 0);
        assert!(progress.best_score.is_none());
    }

    #[test]
    fn test_partial_failure_lowers_success_rate() {
        let engine = |id: &str, inputs: &SimulationInputs| {
            if id == "B2" {
                Err(SimulationError::MissingOutput(id.to_string()))
            } else {
                setpoint_engine(id, inputs)
            }
        };
        let mut cal = calibration_loop(reference(2022), Box::new(engine));
        let result = cal.run_campaign(2, 0.01).unwrap();

        assert_eq!(result.performance.skipped_iterations, 0);
        assert_eq!(result.performance.simulations_failed, 2);
        assert!((result.performance.mean_success_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_all_failures_skip_iterations() {
        let engine = |id: &str, _: &SimulationInputs| {
            Err::<HourlySeries, _>(SimulationError::EngineFailed {
                building: id.to_string(),
                reason: "exit code 1".to_string(),
            })
        };
        let mut cal = calibration_loop(reference(2022), Box::new(engine));
        let result = cal.run_campaign(3, 0.01).unwrap();

        assert_eq!(result.termination, Some(Termination::BudgetExhausted));
        assert_eq!(result.iterations_completed, 3);
        assert_eq!(result.performance.skipped_iterations, 3);
        assert!(result.best_score.is_none());
        assert!(cal.optimizer().observations().is_empty());
        assert!(result.history.iter().all(|s| s.is_skipped()));
    }

    #[test]
    fn test_invalid_population_weight_fails_setup() {
        let mut config = config();
        config.aggregation.mode = WeightMode::Population;
        let mut cal = CalibrationLoop::new(
            config,
            archetypes(),
            ReferencePopulation::from_counts([("detached", f64::NAN)]),
            TypeMapping::residential_default(),
            reference(2022),
            Box::new(setpoint_engine),
        )
        .unwrap();

        let err = cal.run_campaign(4, 0.01).unwrap_err();
        assert!(matches!(err, CampaignError::InvalidWeight { ref building, .. } if building == "B1"));
        assert!(matches!(
            cal.state(),
            CampaignState::Done(Termination::Failed(_))
        ));
        assert!(cal.history().is_empty());
    }

    #[test]
    fn test_duplicate_archetype_simulated_once() {
        let mut selected = archetypes();
        selected.push(Archetype::new("B1", "Single Detached"));
        let mut cal = CalibrationLoop::new(
            config(),
            selected,
            ReferencePopulation::default(),
            TypeMapping::residential_default(),
            reference(2022),
            Box::new(setpoint_engine),
        )
        .unwrap();

        let result = cal.run_campaign(1, 0.01).unwrap();
        assert_eq!(result.performance.simulations_run, 2);
    }

    #[test]
    fn test_invalid_threshold() {
        let mut cal = calibration_loop(reference(2022), Box::new(setpoint_engine));
        assert!(matches!(
            cal.run_campaign(3, f64::NAN),
            Err(CampaignError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_markdown_report() {
        let mut cal = calibration_loop(reference(2022), Box::new(setpoint_engine));
        let result = cal.run_campaign(2, 0.01).unwrap();
        let md = result.to_markdown();
        assert!(md.contains("# Calibration Campaign Report"));
        assert!(md.contains("**Outcome:** Budget exhausted"));
        assert!(md.contains("| heating_setpoint |"));

        let json = result.to_json().unwrap();
        let parsed: CampaignResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.iterations_completed, 2);
    }
}
