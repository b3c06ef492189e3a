use stockcal::aggregation::WeightMode;
use stockcal::campaign::{
    CalibrationLoop, CampaignJournal, CampaignState, SimulationInputs, Termination,
};
use stockcal::config::CalibrationConfig;
use stockcal::error::{CampaignError, SeriesError, SimulationError};
use stockcal::series::{HourlySeries, InMemoryReference, ReferenceSource};
use stockcal::stock::{Archetype, ReferencePopulation, TypeMapping};

fn selected() -> Vec<Archetype> {
    vec![
        Archetype::new("D-1", "Single Detached").with_attribute("floor_area", "150"),
        Archetype::new("D-2", "Single Detached").with_attribute("floor_area", "180"),
        Archetype::new("A-1", "Apartment").with_attribute("floor_area", "70"),
    ]
}

fn population() -> ReferencePopulation {
    ReferencePopulation::from_counts([("detached", 40.0), ("apartment", 20.0)])
}

fn base_config(seed: u64) -> CalibrationConfig {
    let mut config = CalibrationConfig::default();
    config.optimizer.seed = Some(seed);
    config.optimizer.candidates = 200;
    config
}

/// Stock of 60 buildings against a reference whose optimum is a 20 °C setpoint.
fn reference() -> Box<dyn ReferenceSource> {
    Box::new(InMemoryReference::new().with_year(2022, HourlySeries::constant(600.0)))
}

fn engine(_: &str, inputs: &SimulationInputs) -> Result<HourlySeries, SimulationError> {
    let setpoint = inputs.get("hvac_control.heating_setpoint").unwrap_or(0.0);
    Ok(HourlySeries::constant(setpoint / 2.0))
}

fn calibration(config: CalibrationConfig, reference: Box<dyn ReferenceSource>) -> CalibrationLoop {
    CalibrationLoop::new(
        config,
        selected(),
        population(),
        TypeMapping::residential_default(),
        reference,
        Box::new(engine),
    )
    .unwrap()
}

#[test]
fn test_budget_exhausted_campaign() {
    let mut cal = calibration(base_config(3), reference());
    let result = cal.run_campaign(6, 0.0).unwrap();

    assert_eq!(result.termination, Some(Termination::BudgetExhausted));
    assert_eq!(result.iterations_completed, 6);
    assert_eq!(result.performance.skipped_iterations, 0);
    assert!((result.performance.mean_success_rate - 1.0).abs() < 1e-12);

    let best = result.best_parameters.unwrap();
    let setpoint = best["heating_setpoint"];
    assert!((19.0..=21.0).contains(&setpoint));
    assert!(result.best_score.unwrap() >= 0.0);

    // every suggestion respects the bounds
    let space = cal.optimizer().space();
    for observation in cal.optimizer().observations() {
        assert!(space.contains(&observation.parameters));
    }
}

#[test]
fn test_constant_scores_converge() {
    let mut config = base_config(5);
    for parameter in &mut config.parameters {
        parameter.stability_threshold = Some(10.0);
    }
    let flat = |_: &str, _: &SimulationInputs| Ok::<_, SimulationError>(HourlySeries::constant(5.0));
    let mut cal = CalibrationLoop::new(
        config,
        selected(),
        population(),
        TypeMapping::residential_default(),
        reference(),
        Box::new(flat),
    )
    .unwrap();

    let result = cal.run_campaign(20, 0.01).unwrap();
    assert_eq!(result.termination, Some(Termination::Converged));
    assert_eq!(result.iterations_completed, 5);
}

#[test]
fn test_missing_reference_year() {
    let mut config = base_config(1);
    config.campaign.reference_year = 2023;
    let mut cal = calibration(config, reference());

    let err = cal.run_campaign(5, 0.01).unwrap_err();
    assert_eq!(
        err,
        CampaignError::ReferenceUnavailable(SeriesError::MissingYear(2023))
    );
    assert!(matches!(cal.state(), CampaignState::Done(Termination::Failed(_))));
}

#[test]
fn test_zero_reference_is_rejected() {
    let zero = Box::new(InMemoryReference::new().with_year(2022, HourlySeries::zeros()));
    let mut cal = calibration(base_config(1), zero);
    assert!(matches!(
        cal.run_campaign(5, 0.01),
        Err(CampaignError::InvalidReference(_))
    ));
}

#[test]
fn test_unmapped_stock_has_no_buildings() {
    let mut cal = CalibrationLoop::new(
        base_config(1),
        vec![Archetype::new("X", "Houseboat")],
        population(),
        TypeMapping::residential_default(),
        reference(),
        Box::new(engine),
    )
    .unwrap();
    assert_eq!(cal.run_campaign(3, 0.01), Err(CampaignError::NoBuildings));
}

#[test]
fn test_single_mode_weights_every_building_once() {
    let mut config = base_config(2);
    config.aggregation.mode = WeightMode::Single;
    let selected = vec![
        Archetype::new("X", "Houseboat"),
        Archetype::new("Y", "Houseboat"),
    ];
    let mut cal = CalibrationLoop::new(
        config,
        selected,
        ReferencePopulation::default(),
        TypeMapping::residential_default(),
        Box::new(InMemoryReference::new().with_year(2022, HourlySeries::constant(20.0))),
        Box::new(engine),
    )
    .unwrap();

    let result = cal.run_campaign(2, 0.01).unwrap();
    assert_eq!(result.performance.simulations_run, 4);
    assert_eq!(result.performance.skipped_iterations, 0);
}

#[test]
fn test_journal_resume_continues_numbering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("campaign.jsonl");

    let mut config = base_config(9);
    config.campaign.journal_path = Some(path.clone());

    let mut first = calibration(config.clone(), reference());
    let result = first.run_campaign(3, 0.0).unwrap();
    assert_eq!(result.iterations_completed, 3);

    let journal = CampaignJournal::open(&path).unwrap();
    let records = journal.read().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.iteration).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(records.iter().all(|r| r.aggregation.processed == 3));

    let mut second = calibration(config, reference());
    assert_eq!(second.resume_from(&journal).unwrap(), 3);
    assert_eq!(second.optimizer().observations().len(), 3);

    let result = second.run_campaign(5, 0.0).unwrap();
    assert_eq!(result.iterations_completed, 5);
    assert_eq!(result.resumed_iterations, 3);
    assert_eq!(result.history.len(), 2);
    assert_eq!(result.history[0].iteration, 4);
    assert!(result.best_score.unwrap() <= records.iter().map(|r| r.score).fold(f64::INFINITY, f64::min));

    let records = journal.read().unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[4].iteration, 5);
}

#[test]
fn test_all_buildings_fail() {
    let failing = |id: &str, _: &SimulationInputs| {
        Err::<HourlySeries, _>(SimulationError::TimedOut(id.to_string()))
    };
    let mut cal = CalibrationLoop::new(
        base_config(4),
        selected(),
        population(),
        TypeMapping::residential_default(),
        reference(),
        Box::new(failing),
    )
    .unwrap();

    let result = cal.run_campaign(2, 0.01).unwrap();
    assert_eq!(result.performance.skipped_iterations, 2);
    assert_eq!(result.performance.simulations_failed, 6);
    assert_eq!(result.performance.mean_success_rate, 0.0);
    assert!(result.best_score.is_none());
    assert!(cal.optimizer().observations().is_empty());
}
