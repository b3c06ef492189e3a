//! Append-only JSON-lines log of completed iterations.

use crate::aggregation::AggregationMetadata;
use crate::error::CampaignError;
use crate::sensitivity::ParameterImpact;
use crate::validation::{ObjectiveBreakdown, ValidationMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One completed iteration, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub timestamp: DateTime<Utc>,
    pub parameters: BTreeMap<String, f64>,
    pub score: f64,
    pub metrics: ValidationMetrics,
    pub breakdown: ObjectiveBreakdown,
    pub aggregation: AggregationMetadata,
    #[serde(default)]
    pub sensitivity: Vec<ParameterImpact>,
}

#[derive(Debug, Clone)]
pub struct CampaignJournal {
    path: PathBuf,
}

impl CampaignJournal {
    /// Opens (creating if needed) the journal at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CampaignError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CampaignError::Journal(format!("{}: {}", parent.display(), e)))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CampaignError::Journal(format!("{}: {}", path.display(), e)))?;
        Ok(CampaignJournal { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single line.
    pub fn append(&self, record: &IterationRecord) -> Result<(), CampaignError> {
        let line =
            serde_json::to_string(record).map_err(|e| CampaignError::Journal(e.to_string()))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| CampaignError::Journal(format!("{}: {}", self.path.display(), e)))?;
        writeln!(file, "{}", line).map_err(|e| CampaignError::Journal(e.to_string()))?;
        file.flush().map_err(|e| CampaignError::Journal(e.to_string()))
    }

    /// Reads all records. Unparseable lines, such as a line cut short by a
    /// crash, are skipped with a warning.
    pub fn read(&self) -> Result<Vec<IterationRecord>, CampaignError> {
        Self::read_path(&self.path)
    }

    pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<IterationRecord>, CampaignError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| CampaignError::Journal(format!("{}: {}", path.display(), e)))?;

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| CampaignError::Journal(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IterationRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!(
                    "Skipping journal line {} of {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }
}
