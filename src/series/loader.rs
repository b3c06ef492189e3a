//! Loading hourly series from CSV files.
//!
//! Two formats are supported:
//!
//! - **Engine timeseries output**: a header row, one row of units, then one row
//!   per hour. Energy columns are looked up by name (see
//!   [`EndUse::engine_column`]). Only the total electricity column is required.
//! - **Metered reference data**: a timestamp column and a value column at any
//!   sub-hourly resolution. Samples are averaged into hourly bins and then laid
//!   onto the representative year.

use super::{EndUse, HourlySeries};
use crate::error::SeriesError;
use chrono::{NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Timestamp formats accepted in metered reference files.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A source of metered reference series, keyed by calendar year.
pub trait ReferenceSource {
    /// Loads the 8760-hour reference series for `year`.
    fn load(&self, year: i32) -> Result<HourlySeries, SeriesError>;
}

/// Reference series held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReference {
    series: BTreeMap<i32, HourlySeries>,
}

impl InMemoryReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the series for one year, replacing any previous one.
    pub fn with_year(mut self, year: i32, series: HourlySeries) -> Self {
        self.series.insert(year, series);
        self
    }
}

impl ReferenceSource for InMemoryReference {
    fn load(&self, year: i32) -> Result<HourlySeries, SeriesError> {
        self.series
            .get(&year)
            .cloned()
            .ok_or(SeriesError::MissingYear(year))
    }
}

/// Metered reference series read from one CSV file per year.
#[derive(Debug, Clone)]
pub struct CsvReferenceSource {
    files: BTreeMap<i32, PathBuf>,
    timestamp_column: String,
    value_column: String,
}

impl CsvReferenceSource {
    /// Creates a source reading the `timestamp` and `energy_kwh` columns.
    pub fn new() -> Self {
        CsvReferenceSource {
            files: BTreeMap::new(),
            timestamp_column: "timestamp".to_string(),
            value_column: "energy_kwh".to_string(),
        }
    }

    /// Sets the names of the timestamp and value columns.
    pub fn with_columns(mut self, timestamp: impl Into<String>, value: impl Into<String>) -> Self {
        self.timestamp_column = timestamp.into();
        self.value_column = value.into();
        self
    }

    /// Registers the file holding the data for `year`.
    pub fn with_year(mut self, year: i32, path: impl Into<PathBuf>) -> Self {
        self.files.insert(year, path.into());
        self
    }
}

impl Default for CsvReferenceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceSource for CsvReferenceSource {
    fn load(&self, year: i32) -> Result<HourlySeries, SeriesError> {
        let path = self.files.get(&year).ok_or(SeriesError::MissingYear(year))?;
        let file = File::open(path)
            .map_err(|e| SeriesError::Io(format!("{}: {}", path.display(), e)))?;

        let samples = read_column_csv(file, &self.timestamp_column, &self.value_column)?;
        let hourly = resample_to_hourly(&samples)?;
        let series = HourlySeries::new(hourly)?;

        let stats = series.statistics();
        if let Some((_, total)) = stats.first() {
            log::info!(
                "Reference {}: min {:.2} kWh, max {:.2} kWh, mean {:.2} kWh, annual {:.2} kWh",
                year,
                total.min,
                total.max,
                total.mean,
                total.total_annual
            );
        }

        Ok(series)
    }
}

/// Reads `(timestamp, value)` samples from a CSV with named columns.
///
/// Rows with an unparseable timestamp or value are rejected.
pub fn read_column_csv<R: Read>(
    reader: R,
    timestamp_column: &str,
    value_column: &str,
) -> Result<Vec<(NaiveDateTime, f64)>, SeriesError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| SeriesError::Parse(e.to_string()))?
        .clone();
    let ts_idx = column_index(&headers, timestamp_column)?;
    let value_idx = column_index(&headers, value_column)?;

    let mut samples = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| SeriesError::Parse(e.to_string()))?;
        let raw_ts = record.get(ts_idx).unwrap_or("");
        let raw_value = record.get(value_idx).unwrap_or("");

        let ts = parse_timestamp(raw_ts).ok_or_else(|| {
            SeriesError::Parse(format!("row {}: invalid timestamp '{}'", line + 2, raw_ts))
        })?;
        let value = parse_number(raw_value).ok_or_else(|| {
            SeriesError::Parse(format!("row {}: invalid value '{}'", line + 2, raw_value))
        })?;
        samples.push((ts, value));
    }

    if samples.is_empty() {
        return Err(SeriesError::Empty);
    }
    Ok(samples)
}

/// Averages sub-hourly samples into consecutive hourly bins.
///
/// Bins span every hour from the first to the last sample. An hour with no
/// samples repeats the previous hour's value.
pub fn resample_to_hourly(samples: &[(NaiveDateTime, f64)]) -> Result<Vec<f64>, SeriesError> {
    let mut bins: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
    for (ts, value) in samples {
        let hour = floor_to_hour(*ts)?;
        let bin = bins.entry(hour).or_insert((0.0, 0));
        bin.0 += value;
        bin.1 += 1;
    }

    let (first, last) = match (bins.keys().next(), bins.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(SeriesError::Empty),
    };

    let span = (last - first).num_hours() as usize + 1;
    let mut hourly = Vec::with_capacity(span);
    let mut previous = 0.0;
    let mut cursor = first;
    for _ in 0..span {
        let value = match bins.get(&cursor) {
            Some((sum, count)) => sum / *count as f64,
            None => previous,
        };
        hourly.push(value);
        previous = value;
        cursor += chrono::Duration::hours(1);
    }

    Ok(hourly)
}

/// Parses an engine timeseries CSV (header row, units row, hourly rows).
///
/// Unparseable numeric cells read as 0.0. Decimal commas are accepted.
pub fn parse_timeseries_csv<R: Read>(reader: R) -> Result<HourlySeries, SeriesError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| SeriesError::Parse(e.to_string()))?
        .clone();

    let columns: Vec<(EndUse, usize)> = EndUse::ALL
        .iter()
        .filter_map(|e| {
            headers
                .iter()
                .position(|h| h.trim() == e.engine_column())
                .map(|idx| (*e, idx))
        })
        .collect();

    if !columns.iter().any(|(e, _)| *e == EndUse::Total) {
        return Err(SeriesError::MissingColumn(
            EndUse::Total.engine_column().to_string(),
        ));
    }

    let mut values: BTreeMap<EndUse, Vec<f64>> = BTreeMap::new();
    // The first row after the header carries units.
    for record in rdr.records().skip(1) {
        let record = record.map_err(|e| SeriesError::Parse(e.to_string()))?;
        for (end_use, idx) in &columns {
            let value = record.get(*idx).and_then(parse_number).unwrap_or(0.0);
            values.entry(*end_use).or_default().push(value);
        }
    }

    let mut series = HourlySeries::new(values.remove(&EndUse::Total).unwrap_or_default())?;
    for (end_use, column) in values {
        series = series.with_end_use(end_use, column)?;
    }
    Ok(series)
}

/// Reads an engine timeseries CSV from disk.
pub fn parse_timeseries_file(path: impl AsRef<Path>) -> Result<HourlySeries, SeriesError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| SeriesError::Io(format!("{}: {}", path.display(), e)))?;
    parse_timeseries_csv(file)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, SeriesError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| SeriesError::MissingColumn(name.to_string()))
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn floor_to_hour(ts: NaiveDateTime) -> Result<NaiveDateTime, SeriesError> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .ok_or_else(|| SeriesError::Parse(format!("cannot truncate timestamp {}", ts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::HOURS_PER_YEAR;
    use std::io::Write;

    fn engine_csv(rows: usize) -> String {
        let mut out = String::from(
            "Time,Fuel Use: Electricity: Total,End Use: Electricity: Heating,End Use: Electricity: Cooling\n",
        );
        out.push_str(",kWh,kWh,kWh\n");
        for h in 0..rows {
            out.push_str(&format!("2000/01/01 {:02}:00:00,{}.5,1,0\n", h % 24, h));
        }
        out
    }

    #[test]
    fn test_parse_engine_output() {
        let series = parse_timeseries_csv(engine_csv(24).as_bytes()).unwrap();
        assert_eq!(series.len(), HOURS_PER_YEAR);
        assert_eq!(series.values()[0], 0.5);
        assert_eq!(series.values()[23], 23.5);
        // Padded with the last value
        assert_eq!(series.values()[8759], 23.5);
        assert!(series.end_use(EndUse::Heating).is_some());
        assert!(series.end_use(EndUse::Cooling).is_some());
        assert!(series.end_use(EndUse::HotWater).is_none());
    }

    #[test]
    fn test_parse_bad_cells_read_as_zero() {
        let csv = "Time,Fuel Use: Electricity: Total\n,kWh\nt0,1\nt1,oops\nt2,\"2,5\"\n";
        let series = parse_timeseries_csv(csv.as_bytes()).unwrap();
        assert_eq!(&series.values()[..3], &[1.0, 0.0, 2.5]);
    }

    #[test]
    fn test_parse_missing_total_column() {
        let csv = "Time,End Use: Electricity: Heating\n,kWh\nt0,1\n";
        let err = parse_timeseries_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, SeriesError::MissingColumn(_)));
    }

    #[test]
    fn test_parse_units_only_is_empty() {
        let csv = "Time,Fuel Use: Electricity: Total\n,kWh\n";
        assert_eq!(parse_timeseries_csv(csv.as_bytes()), Err(SeriesError::Empty));
    }

    #[test]
    fn test_resample_quarter_hours() {
        let csv = "timestamp,energy_kwh\n\
                   2022-01-01 00:00:00,1\n\
                   2022-01-01 00:15:00,2\n\
                   2022-01-01 00:30:00,3\n\
                   2022-01-01 00:45:00,4\n\
                   2022-01-01 01:00:00,10\n\
                   2022-01-01 03:00:00,20\n";
        let samples = read_column_csv(csv.as_bytes(), "timestamp", "energy_kwh").unwrap();
        let hourly = resample_to_hourly(&samples).unwrap();
        assert_eq!(hourly, vec![2.5, 10.0, 10.0, 20.0]);
    }

    #[test]
    fn test_read_column_rejects_bad_timestamp() {
        let csv = "timestamp,energy_kwh\nyesterday,1\n";
        let err = read_column_csv(csv.as_bytes(), "timestamp", "energy_kwh").unwrap_err();
        assert!(matches!(err, SeriesError::Parse(_)));
    }

    #[test]
    fn test_csv_reference_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Intervalle15Minutes,energie_sum_secteur").unwrap();
        for q in 0..8 {
            writeln!(file, "2022-01-01T{:02}:{:02},{}", q / 4, (q % 4) * 15, 4.0).unwrap();
        }

        let source = CsvReferenceSource::new()
            .with_columns("Intervalle15Minutes", "energie_sum_secteur")
            .with_year(2022, file.path());

        let series = source.load(2022).unwrap();
        assert_eq!(series.len(), HOURS_PER_YEAR);
        assert!((series.mean() - 4.0).abs() < 1e-12);

        assert_eq!(source.load(2021), Err(SeriesError::MissingYear(2021)));
    }

    #[test]
    fn test_in_memory_reference() {
        let source = InMemoryReference::new().with_year(2022, HourlySeries::constant(1.0));
        assert!(source.load(2022).is_ok());
        assert_eq!(source.load(2023), Err(SeriesError::MissingYear(2023)));
    }
}
