//! Building stock description: selected archetypes, the census population
//! they represent, and the mapping between archetype sub-types and census
//! classes.

use crate::error::StockError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A representative building selected for simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub id: String,
    /// Sub-type as recorded in the archetype database (e.g. "Single Detached")
    pub sub_type: String,
    /// Remaining descriptive fields, passed through to the input mapping.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Archetype {
    pub fn new(id: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Archetype {
            id: id.into(),
            sub_type: sub_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Maps archetype sub-types onto census building classes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TypeMapping {
    classes: BTreeMap<String, String>,
}

impl TypeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from `class -> [sub_type, ...]` groups.
    pub fn from_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        let mut mapping = TypeMapping::new();
        for (class, sub_types) in groups {
            let class = class.into();
            for sub_type in sub_types {
                mapping.classes.insert(sub_type.into(), class.clone());
            }
        }
        mapping
    }

    /// Residential sub-types grouped into five census classes.
    pub fn residential_default() -> Self {
        Self::from_groups([
            (
                "detached",
                vec![
                    "Single Detached",
                    "Detached Duplex",
                    "Detached Triplex",
                    "Mobile Home",
                ],
            ),
            ("semi_detached", vec!["Double/Semi-detached"]),
            ("row_end", vec!["Row house, end unit"]),
            ("row_middle", vec!["Row house, middle unit"]),
            ("apartment", vec!["Apartment"]),
        ])
    }

    pub fn insert(&mut self, sub_type: impl Into<String>, class: impl Into<String>) {
        self.classes.insert(sub_type.into(), class.into());
    }

    pub fn class_of(&self, sub_type: &str) -> Option<&str> {
        self.classes.get(sub_type).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Building counts per census class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferencePopulation {
    counts: BTreeMap<String, f64>,
}

impl ReferencePopulation {
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        ReferencePopulation {
            counts: counts.into_iter().map(|(c, n)| (c.into(), n)).collect(),
        }
    }

    /// Counts one building per class label.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label.into()).or_insert(0.0) += 1.0;
        }
        ReferencePopulation { counts }
    }

    /// Reads a population table.
    ///
    /// With `count_column` each row holds a class and its count; without it
    /// each row is one building and rows are counted per class.
    pub fn from_csv<R: Read>(
        reader: R,
        class_column: &str,
        count_column: Option<&str>,
    ) -> Result<Self, StockError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| StockError::Parse(e.to_string()))?
            .clone();
        let class_idx = column_index(&headers, class_column)?;
        let count_idx = count_column
            .map(|c| column_index(&headers, c))
            .transpose()?;

        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        for record in rdr.records() {
            let record = record.map_err(|e| StockError::Parse(e.to_string()))?;
            let class = record.get(class_idx).unwrap_or("").to_string();
            let count = match count_idx {
                Some(idx) => {
                    let raw = record.get(idx).unwrap_or("");
                    match raw.parse::<f64>() {
                        Ok(n) if n.is_finite() && n >= 0.0 => n,
                        _ => {
                            return Err(StockError::Parse(format!(
                                "invalid count '{}' for class '{}'",
                                raw, class
                            )))
                        }
                    }
                }
                None => 1.0,
            };
            *counts.entry(class).or_insert(0.0) += count;
        }

        Ok(ReferencePopulation { counts })
    }

    pub fn from_file(
        path: impl AsRef<Path>,
        class_column: &str,
        count_column: Option<&str>,
    ) -> Result<Self, StockError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| StockError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_csv(file, class_column, count_column)
    }

    pub fn count(&self, class: &str) -> f64 {
        self.counts.get(class).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.counts.values().sum()
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, f64)> {
        self.counts.iter().map(|(c, n)| (c.as_str(), *n))
    }
}

/// Reads selected archetypes from a CSV. Columns other than the id and
/// sub-type columns become attributes.
pub fn load_archetypes_csv<R: Read>(
    reader: R,
    id_column: &str,
    sub_type_column: &str,
) -> Result<Vec<Archetype>, StockError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| StockError::Parse(e.to_string()))?
        .clone();
    let id_idx = column_index(&headers, id_column)?;
    let sub_type_idx = column_index(&headers, sub_type_column)?;

    let mut archetypes = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| StockError::Parse(e.to_string()))?;
        let mut archetype = Archetype::new(
            record.get(id_idx).unwrap_or(""),
            record.get(sub_type_idx).unwrap_or(""),
        );
        for (idx, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
            if idx != id_idx && idx != sub_type_idx {
                archetype.attributes.insert(header.to_string(), value.to_string());
            }
        }
        archetypes.push(archetype);
    }

    Ok(archetypes)
}

pub fn load_archetypes_file(
    path: impl AsRef<Path>,
    id_column: &str,
    sub_type_column: &str,
) -> Result<Vec<Archetype>, StockError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| StockError::Io(format!("{}: {}", path.display(), e)))?;
    load_archetypes_csv(file, id_column, sub_type_column)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, StockError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| StockError::MissingColumn(name.to_string()))
}
