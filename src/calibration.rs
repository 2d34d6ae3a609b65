use crate::error::{AnalysisError, Result};
use crate::normalize::Reading;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Linear correction for one logger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub slope: f64,
    pub intercept: f64,
}

impl Calibration {
    /// `(raw - intercept) * slope`, rounded to the two decimals the loggers
    /// resolve. The rounded value is the reading every statistic sees.
    pub fn apply(&self, raw: f64) -> f64 {
        round2((raw - self.intercept) * self.slope)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable {
    coefficients: HashMap<String, Calibration>,
}

impl CalibrationTable {
    pub fn new(coefficients: HashMap<String, Calibration>) -> Self {
        Self { coefficients }
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn get(&self, subject: &str) -> Result<&Calibration> {
        self.coefficients
            .get(subject)
            .ok_or_else(|| AnalysisError::MissingCalibration(subject.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct CalibrationOutcome {
    pub readings: Vec<Reading>,
    /// Subjects dropped because no coefficients were configured for them.
    pub uncalibrated: BTreeSet<String>,
}

/// Calibrates every reading whose subject has coefficients. Subjects without
/// coefficients are dropped as a whole; the others are unaffected.
pub fn calibrate(readings: Vec<Reading>, table: &CalibrationTable) -> CalibrationOutcome {
    let mut outcome = CalibrationOutcome::default();
    let mut per_subject: BTreeMap<String, usize> = BTreeMap::new();

    for mut reading in readings {
        let coefficients = match table.get(&reading.subject) {
            Ok(c) => c,
            Err(e) => {
                if outcome.uncalibrated.insert(reading.subject.clone()) {
                    error!("Dropping subject {}: {}", reading.subject, e);
                }
                continue;
            }
        };
        reading.value = reading.value.map(|raw| coefficients.apply(raw));
        *per_subject.entry(reading.subject.clone()).or_insert(0) += 1;
        outcome.readings.push(reading);
    }

    for (subject, count) in &per_subject {
        debug!("Calibrated {} readings for subject {}", count, subject);
    }
    outcome
}
