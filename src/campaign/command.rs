//! Simulation engine backed by an external program.
//!
//! For every building a working directory `<work_dir>/<building>` is created,
//! the inputs are written to `inputs.json`, and the program is started with its
//! argument template expanded:
//!
//! | Placeholder  | Replaced by                          |
//! |--------------|--------------------------------------|
//! | `{building}` | building id                          |
//! | `{params}`   | path of the written `inputs.json`    |
//! | `{output}`   | path where the timeseries CSV is expected |
//!
//! The output CSV is read with [`parse_timeseries_file`].

use super::collaborators::{SimulationEngine, SimulationInputs};
use crate::error::SimulationError;
use crate::series::{parse_timeseries_file, HourlySeries};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    work_dir: PathBuf,
    timeout: Option<Duration>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        CommandEngine {
            program: program.into(),
            args: vec![
                "{params}".to_string(),
                "{output}".to_string(),
            ],
            work_dir: work_dir.into(),
            timeout: None,
        }
    }

    /// Replaces the argument template.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Working directory of one building. Distinct ids always get distinct
    /// directories below `work_dir`.
    fn building_dir(&self, building_id: &str) -> Result<PathBuf, SimulationError> {
        if building_id.is_empty() {
            return Err(SimulationError::InvalidInputs {
                building: building_id.to_string(),
                reason: "empty building id".to_string(),
            });
        }
        Ok(self.work_dir.join(dir_name(building_id)))
    }

    fn expand(&self, building_id: &str, params: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{building}", building_id)
                    .replace("{params}", &params.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

/// Escapes a building id into a single path component.
///
/// ASCII letters, digits, `-` and non-leading `.` are kept; every other
/// character becomes `_<hex>_`. The mapping is injective and never yields
/// `.` or `..`.
fn dir_name(building_id: &str) -> String {
    let mut name = String::with_capacity(building_id.len());
    for (i, c) in building_id.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '-' || (c == '.' && i > 0) {
            name.push(c);
        } else {
            name.push_str(&format!("_{:x}_", c as u32));
        }
    }
    name
}

impl SimulationEngine for CommandEngine {
    fn simulate(
        &self,
        building_id: &str,
        inputs: &SimulationInputs,
    ) -> Result<HourlySeries, SimulationError> {
        let failed = |reason: String| SimulationError::EngineFailed {
            building: building_id.to_string(),
            reason,
        };

        let dir = self.building_dir(building_id)?;
        std::fs::create_dir_all(&dir).map_err(|e| failed(format!("{}: {}", dir.display(), e)))?;

        let params = dir.join("inputs.json");
        let output = dir.join("timeseries.csv");
        if output.exists() {
            std::fs::remove_file(&output).map_err(|e| failed(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(inputs).map_err(|e| SimulationError::InvalidInputs {
            building: building_id.to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&params, json).map_err(|e| failed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(self.expand(building_id, &params, &output))
            .current_dir(&dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| failed(format!("cannot start {}: {}", self.program.display(), e)))?;

        let start = Instant::now();
        let status = loop {
            match child.try_wait().map_err(|e| failed(e.to_string()))? {
                Some(status) => break status,
                None => {
                    if self.timeout.is_some_and(|t| start.elapsed() > t) {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SimulationError::TimedOut(building_id.to_string()));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        };

        if !status.success() {
            return Err(failed(format!("exited with {}", status)));
        }
        if !output.exists() {
            return Err(SimulationError::MissingOutput(building_id.to_string()));
        }

        log::debug!(
            "Simulated {} in {:.1}s",
            building_id,
            start.elapsed().as_secs_f64()
        );

        parse_timeseries_file(&output).map_err(|source| SimulationError::MalformedOutput {
            building: building_id.to_string(),
            source,
        })
    }
}
