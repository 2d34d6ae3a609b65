use crate::error::{AnalysisError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SECONDS_PER_DAY: u32 = 86_400;

// Bare clock formats seen across logger exports, most specific first.
const CLOCK_FORMATS: &[&str] = &[
    "%H:%M:%S",
    "%H:%M:%S%.f",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M %p",
];

// Two-digit-year forms must precede four-digit ones, `%Y` happily reads "14".
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const MISSING_MARKERS: &[&str] = &["", "nan", "na", "n/a", "-", "--"];

/// Clock time as whole seconds since local midnight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SecondsOfDay(u32);

impl SecondsOfDay {
    pub fn new(seconds: u32) -> Result<Self> {
        if seconds >= SECONDS_PER_DAY {
            return Err(AnalysisError::ClockOutOfRange(seconds));
        }
        Ok(Self(seconds))
    }

    /// Clamps to the last second of the day instead of failing.
    pub const fn saturating(seconds: u32) -> Self {
        if seconds >= SECONDS_PER_DAY {
            Self(SECONDS_PER_DAY - 1)
        } else {
            Self(seconds)
        }
    }

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Result<Self> {
        if minutes >= 60 || seconds >= 60 {
            return Err(AnalysisError::MalformedTimestamp(format!(
                "{}:{}:{}",
                hours, minutes, seconds
            )));
        }
        Self::new(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn as_secs(self) -> u32 {
        self.0
    }

    /// Fractional hours since midnight, the x-axis unit used for daily plots.
    pub fn as_hours(self) -> f64 {
        self.0 as f64 / 3600.0
    }
}

impl From<NaiveTime> for SecondsOfDay {
    fn from(time: NaiveTime) -> Self {
        // num_seconds_from_midnight folds leap seconds into 23:59:59
        Self(time.num_seconds_from_midnight().min(SECONDS_PER_DAY - 1))
    }
}

impl fmt::Display for SecondsOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

impl FromStr for SecondsOfDay {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        parse_timestamp(s).map(|(_, time)| time)
    }
}

impl TryFrom<String> for SecondsOfDay {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SecondsOfDay> for String {
    fn from(value: SecondsOfDay) -> Self {
        value.to_string()
    }
}

/// Parses a logger clock cell. Full date-times also yield their calendar date.
pub fn parse_timestamp(text: &str) -> Result<(Option<NaiveDate>, SecondsOfDay)> {
    let trimmed = text.trim().trim_matches('"').trim();

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok((Some(dt.date()), SecondsOfDay::from(dt.time())));
        }
    }

    for format in CLOCK_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, format) {
            return Ok((None, SecondsOfDay::from(time)));
        }
    }

    Err(AnalysisError::MalformedTimestamp(text.to_string()))
}

/// Parses a temperature cell. Missing markers map to `None`.
pub fn parse_value(text: &str) -> Result<Option<f64>> {
    let trimmed = text.trim().trim_matches('"').trim();
    if MISSING_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(AnalysisError::MalformedValue(text.to_string())),
    }
}

/// One cell pair exactly as the export layer found it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub subject: String,
    /// Calendar date assigned by the loader; overridden by a date embedded
    /// in the clock cell.
    pub date: NaiveDate,
    pub clock: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub subject: String,
    pub date: NaiveDate,
    pub time: SecondsOfDay,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub subject: String,
    pub date: NaiveDate,
    pub clock: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone)]
pub struct NormalizeReport {
    pub accepted: usize,
    pub missing: usize,
    pub rejections: Vec<Rejection>,
}

impl NormalizeReport {
    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }
}

fn normalize_one(raw: &RawReading) -> Result<Reading> {
    let (date, time) = parse_timestamp(&raw.clock)?;
    let value = parse_value(&raw.value)?;
    Ok(Reading {
        subject: raw.subject.clone(),
        date: date.unwrap_or(raw.date),
        time,
        value,
    })
}

/// Converts raw cells into readings. A malformed cell rejects only its own
/// reading; the run continues.
pub fn normalize<I>(raw: I) -> (Vec<Reading>, NormalizeReport)
where
    I: IntoIterator<Item = RawReading>,
{
    let mut readings = Vec::new();
    let mut report = NormalizeReport::default();

    for item in raw {
        match normalize_one(&item) {
            Ok(reading) => {
                if reading.value.is_none() {
                    report.missing += 1;
                }
                report.accepted += 1;
                readings.push(reading);
            }
            Err(e) => {
                warn!(
                    "Rejecting reading for subject {} on {}: {}",
                    item.subject, item.date, e
                );
                report.rejections.push(Rejection {
                    subject: item.subject,
                    date: item.date,
                    clock: item.clock,
                    value: item.value,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(
        "Normalized {} readings ({} missing, {} rejected)",
        report.accepted,
        report.missing,
        report.rejected()
    );
    (readings, report)
}
