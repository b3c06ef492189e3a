//! Hourly energy series on a fixed 8760-hour representative year.
//!
//! Simulated and metered series are compared position by position rather than
//! by calendar date, so every [`HourlySeries`] is normalized to exactly
//! [`HOURS_PER_YEAR`] values on construction:
//!
//! - shorter inputs are extended by repeating their last value,
//! - longer inputs are truncated.
//!
//! Hour `h` is mapped onto a synthetic non-leap calendar starting at midnight
//! on January 1st, which is what the seasonal masks in
//! [`crate::validation`] rely on.

pub mod loader;
pub mod stats;

use crate::error::SeriesError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use loader::{
    parse_timeseries_csv, parse_timeseries_file, read_column_csv, resample_to_hourly,
    CsvReferenceSource, InMemoryReference, ReferenceSource,
};
pub use stats::SeriesStatistics;

/// Number of hours in the representative (non-leap) year.
pub const HOURS_PER_YEAR: usize = 8760;

/// Days per month for a non-leap year.
const DAYS_IN_MONTH: [usize; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Electricity end uses carried alongside the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndUse {
    Total,
    Heating,
    Cooling,
    HotWater,
}

impl EndUse {
    /// All end uses in column order.
    pub const ALL: [EndUse; 4] = [
        EndUse::Total,
        EndUse::Heating,
        EndUse::Cooling,
        EndUse::HotWater,
    ];

    /// Column header used by the simulation engine's timeseries output.
    pub fn engine_column(&self) -> &'static str {
        match self {
            EndUse::Total => "Fuel Use: Electricity: Total",
            EndUse::Heating => "End Use: Electricity: Heating",
            EndUse::Cooling => "End Use: Electricity: Cooling",
            EndUse::HotWater => "End Use: Electricity: Hot Water",
        }
    }
}

impl fmt::Display for EndUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndUse::Total => write!(f, "total_electricity"),
            EndUse::Heating => write!(f, "heating"),
            EndUse::Cooling => write!(f, "cooling"),
            EndUse::HotWater => write!(f, "hot_water"),
        }
    }
}

/// Meteorological season of an hour, used for seasonal error decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    /// December, January, February
    Winter,
    /// June, July, August
    Summer,
    /// Spring and autumn months
    Shoulder,
}

impl Season {
    /// Returns the season of a calendar month (1-12).
    pub fn of_month(month: u32) -> Season {
        match month {
            12 | 1 | 2 => Season::Winter,
            6..=8 => Season::Summer,
            _ => Season::Shoulder,
        }
    }

    /// Returns the season of an hour of the representative year.
    pub fn of_hour(hour: usize) -> Season {
        Season::of_month(month_of_hour(hour))
    }
}

/// Converts an hour of year into `(month, day, hour_of_day)`.
///
/// Months and days are 1-based. Hours beyond the end of the year wrap around.
pub fn hour_to_date(hour: usize) -> (u32, u32, u32) {
    let hour = hour % HOURS_PER_YEAR;
    let mut day = hour / 24;
    let hour_of_day = (hour % 24) as u32;

    for (i, &days) in DAYS_IN_MONTH.iter().enumerate() {
        if day < days {
            return ((i + 1) as u32, (day + 1) as u32, hour_of_day);
        }
        day -= days;
    }

    (12, 31, hour_of_day)
}

/// Returns the calendar month (1-12) of an hour of the representative year.
pub fn month_of_hour(hour: usize) -> u32 {
    hour_to_date(hour).0
}

/// Normalizes a raw value sequence to exactly [`HOURS_PER_YEAR`] values.
///
/// A sequence that already has 8760 values is returned unchanged.
pub fn normalize_length(mut values: Vec<f64>) -> Result<Vec<f64>, SeriesError> {
    let last = *values.last().ok_or(SeriesError::Empty)?;

    if values.len() != HOURS_PER_YEAR {
        log::debug!(
            "Adjusting series length: {} -> {}",
            values.len(),
            HOURS_PER_YEAR
        );
        values.resize(HOURS_PER_YEAR, last);
    }

    Ok(values)
}

/// An 8760-hour electricity series with optional end-use breakdown (kWh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    total: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    heating: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cooling: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hot_water: Option<Vec<f64>>,
}

impl HourlySeries {
    /// Creates a series from total electricity values, normalizing the length.
    pub fn new(total: Vec<f64>) -> Result<Self, SeriesError> {
        Ok(HourlySeries {
            total: normalize_length(total)?,
            heating: None,
            cooling: None,
            hot_water: None,
        })
    }

    /// Creates a series with the same value at every hour.
    pub fn constant(value: f64) -> Self {
        HourlySeries {
            total: vec![value; HOURS_PER_YEAR],
            heating: None,
            cooling: None,
            hot_water: None,
        }
    }

    /// Creates an all-zero series, used as the accumulator for aggregation.
    pub fn zeros() -> Self {
        Self::constant(0.0)
    }

    /// Attaches (or replaces) an end-use column, normalizing its length.
    ///
    /// Passing [`EndUse::Total`] replaces the total column.
    pub fn with_end_use(mut self, end_use: EndUse, values: Vec<f64>) -> Result<Self, SeriesError> {
        let values = normalize_length(values)?;
        match end_use {
            EndUse::Total => self.total = values,
            EndUse::Heating => self.heating = Some(values),
            EndUse::Cooling => self.cooling = Some(values),
            EndUse::HotWater => self.hot_water = Some(values),
        }
        Ok(self)
    }

    /// Total electricity values.
    pub fn values(&self) -> &[f64] {
        &self.total
    }

    /// Values of one end use, if present.
    pub fn end_use(&self, end_use: EndUse) -> Option<&[f64]> {
        match end_use {
            EndUse::Total => Some(&self.total),
            EndUse::Heating => self.heating.as_deref(),
            EndUse::Cooling => self.cooling.as_deref(),
            EndUse::HotWater => self.hot_water.as_deref(),
        }
    }

    /// End uses present in this series, total first.
    pub fn end_uses(&self) -> Vec<EndUse> {
        EndUse::ALL
            .iter()
            .copied()
            .filter(|e| self.end_use(*e).is_some())
            .collect()
    }

    /// Always [`HOURS_PER_YEAR`].
    pub fn len(&self) -> usize {
        self.total.len()
    }

    /// Always false; a series cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    /// Annual total electricity (kWh).
    pub fn sum(&self) -> f64 {
        self.total.iter().sum()
    }

    /// Mean hourly total electricity (kWh).
    pub fn mean(&self) -> f64 {
        self.sum() / self.total.len() as f64
    }

    /// Adds `weight * other` to this series element-wise, column by column.
    ///
    /// End-use columns missing from `self` start from zero; columns missing
    /// from `other` are left untouched.
    pub fn accumulate(&mut self, other: &HourlySeries, weight: f64) {
        add_scaled(&mut self.total, &other.total, weight);
        accumulate_column(&mut self.heating, other.heating.as_deref(), weight);
        accumulate_column(&mut self.cooling, other.cooling.as_deref(), weight);
        accumulate_column(&mut self.hot_water, other.hot_water.as_deref(), weight);
    }

    /// Returns a copy of this series with every column multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> HourlySeries {
        let mut out = HourlySeries::zeros();
        out.accumulate(self, factor);
        out
    }

    /// Per end-use statistics.
    pub fn statistics(&self) -> Vec<(EndUse, SeriesStatistics)> {
        self.end_uses()
            .into_iter()
            .filter_map(|e| self.end_use(e).map(|v| (e, SeriesStatistics::of(v))))
            .collect()
    }
}

fn add_scaled(target: &mut [f64], source: &[f64], weight: f64) {
    for (t, s) in target.iter_mut().zip(source.iter()) {
        *t += s * weight;
    }
}

fn accumulate_column(target: &mut Option<Vec<f64>>, source: Option<&[f64]>, weight: f64) {
    if let Some(source) = source {
        let column = target.get_or_insert_with(|| vec![0.0; HOURS_PER_YEAR]);
        add_scaled(column, source, weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_to_date() {
        assert_eq!(hour_to_date(0), (1, 1, 0));
        assert_eq!(hour_to_date(25), (1, 2, 1));
        assert_eq!(hour_to_date(744), (2, 1, 0));
        assert_eq!(hour_to_date(1416), (3, 1, 0)); // 59 days
        assert_eq!(hour_to_date(8040), (12, 1, 0));
        assert_eq!(hour_to_date(8759), (12, 31, 23));
    }

    #[test]
    fn test_seasons() {
        assert_eq!(Season::of_hour(0), Season::Winter);
        assert_eq!(Season::of_hour(8759), Season::Winter);
        assert_eq!(Season::of_hour(4000), Season::Summer); // mid June
        assert_eq!(Season::of_hour(2500), Season::Shoulder); // April
        let winter = (0..HOURS_PER_YEAR)
            .filter(|&h| Season::of_hour(h) == Season::Winter)
            .count();
        assert_eq!(winter, (31 + 31 + 28) * 24);
        let summer = (0..HOURS_PER_YEAR)
            .filter(|&h| Season::of_hour(h) == Season::Summer)
            .count();
        assert_eq!(summer, (30 + 31 + 31) * 24);
    }

    #[test]
    fn test_normalize_pads_with_last_value() {
        let values = normalize_length(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(values.len(), HOURS_PER_YEAR);
        assert_eq!(&values[..3], &[1.0, 2.0, 3.0]);
        assert!(values[3..].iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_normalize_truncates() {
        let raw: Vec<f64> = (0..8784).map(|i| i as f64).collect();
        let values = normalize_length(raw).unwrap();
        assert_eq!(values.len(), HOURS_PER_YEAR);
        assert_eq!(values[8759], 8759.0);
    }

    #[test]
    fn test_normalize_is_identity_on_full_year() {
        let raw: Vec<f64> = (0..HOURS_PER_YEAR).map(|i| (i as f64).sin()).collect();
        let once = normalize_length(raw.clone()).unwrap();
        assert_eq!(once, raw);
        let twice = normalize_length(once.clone()).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_normalize_empty_fails() {
        assert_eq!(normalize_length(Vec::new()), Err(SeriesError::Empty));
        assert!(HourlySeries::new(Vec::new()).is_err());
    }

    #[test]
    fn test_accumulate_end_uses() {
        let a = HourlySeries::constant(2.0)
            .with_end_use(EndUse::Heating, vec![1.0])
            .unwrap();
        let b = HourlySeries::constant(4.0);

        let mut acc = HourlySeries::zeros();
        acc.accumulate(&a, 10.0);
        acc.accumulate(&b, 0.5);

        assert!(acc.values().iter().all(|&v| (v - 22.0).abs() < 1e-12));
        let heating = acc.end_use(EndUse::Heating).unwrap();
        assert!(heating.iter().all(|&v| (v - 10.0).abs() < 1e-12));
        assert!(acc.end_use(EndUse::Cooling).is_none());
        assert_eq!(acc.end_uses(), vec![EndUse::Total, EndUse::Heating]);
    }

    #[test]
    fn test_mean_and_sum() {
        let s = HourlySeries::constant(100.0);
        assert_eq!(s.len(), HOURS_PER_YEAR);
        assert!((s.mean() - 100.0).abs() < 1e-12);
        assert!((s.sum() - 876_000.0).abs() < 1e-6);
        assert!((s.scaled(2.0).mean() - 200.0).abs() < 1e-12);
    }

    #[test]
    fn test_end_use_display() {
        assert_eq!(EndUse::Total.to_string(), "total_electricity");
        assert_eq!(
            EndUse::Heating.engine_column(),
            "End Use: Electricity: Heating"
        );
    }
}
