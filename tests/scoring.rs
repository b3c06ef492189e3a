use std::collections::BTreeMap;
use stockcal::aggregation::{AggregationConfig, BuildingWeights, WeightedAggregator};
use stockcal::error::ScoringError;
use stockcal::series::{normalize_length, HourlySeries, HOURS_PER_YEAR};
use stockcal::stock::{Archetype, ReferencePopulation, TypeMapping};
use stockcal::validation::{objective, ObjectiveConfig, ValidationMetrics, ValidationScorer};

fn ramp(offset: f64) -> HourlySeries {
    HourlySeries::new((0..HOURS_PER_YEAR).map(|h| offset + (h % 24) as f64).collect()).unwrap()
}

#[test]
fn test_identical_constant_series() {
    let scorer =
        ValidationScorer::new(HourlySeries::constant(100.0), ObjectiveConfig::default()).unwrap();
    let card = scorer.score(&HourlySeries::constant(100.0)).unwrap();
    assert_eq!(card.metrics.rmse, 0.0);
    assert_eq!(card.metrics.ratio_of_means, 1.0);
    assert!(card.score.abs() < 1e-9);
}

#[test]
fn test_doubled_series_ratio_term() {
    let reference = ramp(50.0);
    let simulated =
        HourlySeries::new(reference.values().iter().map(|v| v * 2.0).collect()).unwrap();
    let scorer = ValidationScorer::new(reference, ObjectiveConfig::default()).unwrap();
    let card = scorer.score(&simulated).unwrap();

    assert!((card.metrics.ratio_of_means - 2.0).abs() < 1e-12);
    assert!((card.breakdown.ratio_term - 0.45).abs() < 1e-12);
}

#[test]
fn test_objective_monotone_in_rmse() {
    let reference = ramp(100.0);
    let config = ObjectiveConfig::default();
    let mut last = 0.0;
    for offset in [0.0, 1.0, 5.0, 20.0] {
        let simulated: Vec<f64> = reference.values().iter().map(|v| v + offset).collect();
        let metrics = ValidationMetrics::compute(reference.values(), &simulated).unwrap();
        let score = objective(&metrics, &config);
        assert!(score >= last);
        last = score;
    }
}

#[test]
fn test_zero_mean_reference() {
    assert_eq!(
        ValidationScorer::new(HourlySeries::zeros(), ObjectiveConfig::default()).unwrap_err(),
        ScoringError::ZeroReferenceMean
    );
}

#[test]
fn test_full_year_unchanged_by_normalization() {
    let values: Vec<f64> = (0..HOURS_PER_YEAR).map(|h| h as f64 * 0.5).collect();
    assert_eq!(normalize_length(values.clone()).unwrap(), values);
}

#[test]
fn test_weights_cover_population() {
    let selected = vec![
        Archetype::new("D-1", "Single Detached"),
        Archetype::new("D-2", "Mobile Home"),
        Archetype::new("S-1", "Double/Semi-detached"),
        Archetype::new("A-1", "Apartment"),
    ];
    let population =
        ReferencePopulation::from_counts([("detached", 900.0), ("semi_detached", 150.0), ("apartment", 450.0)]);

    let mut aggregator = WeightedAggregator::new(AggregationConfig::default());
    let weights = aggregator.compute_weights(&selected, &population, &TypeMapping::residential_default());

    assert!((weights.total() - 1500.0).abs() / 1500.0 < 0.01);
    assert_eq!(weights.get("D-1"), Some(450.0));
    assert_eq!(weights.get("A-1"), Some(450.0));
}

#[test]
fn test_aggregation_is_linear_over_disjoint_sets() {
    let aggregator = WeightedAggregator::new(AggregationConfig::default());
    let left = BuildingWeights::from_pairs([("a", 2.0), ("b", 3.0)]);
    let right = BuildingWeights::from_pairs([("c", 4.0)]);
    let both = BuildingWeights::from_pairs([("a", 2.0), ("b", 3.0), ("c", 4.0)]);

    let outputs = BTreeMap::from([
        ("a".to_string(), ramp(1.0)),
        ("b".to_string(), ramp(10.0)),
        ("c".to_string(), HourlySeries::constant(7.0)),
    ]);

    let l = aggregator.aggregate(&outputs, &left).unwrap();
    let r = aggregator.aggregate(&outputs, &right).unwrap();
    let all = aggregator.aggregate(&outputs, &both).unwrap();

    for h in 0..HOURS_PER_YEAR {
        let expected = l.series.values()[h] + r.series.values()[h];
        assert!((all.series.values()[h] - expected).abs() < 1e-9);
    }
    assert_eq!(all.metadata.processed, 3);
}
