//! Error types for the analysis core.

use chrono::NaiveDate;
use thiserror::Error;

use crate::cycles::CycleLabel;

/// Result type alias
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Clock value that none of the known logger formats accept
    #[error("malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    /// Temperature cell that is neither a number nor a missing marker
    #[error("malformed value: {0:?}")]
    MalformedValue(String),

    #[error("seconds-of-day out of range: {0} (must be below 86400)")]
    ClockOutOfRange(u32),

    #[error("window size must be a positive integer, got {0}")]
    InvalidWindow(usize),

    #[error("light cycle start {start} is after light cycle end {end}")]
    InvertedLightCycle { start: String, end: String },

    #[error("no calibration coefficients for subject {0}")]
    MissingCalibration(String),

    #[error("subject {subject} has two readings at {time} on {date}")]
    DuplicateTimestamp {
        subject: String,
        date: NaiveDate,
        time: String,
    },

    /// Positional aggregation requires every subject to contribute the same
    /// number of readings to a bucket.
    #[error("cannot align subjects for {day} {cycle}: reading counts differ ({counts})")]
    AggregateMismatch {
        day: NaiveDate,
        cycle: CycleLabel,
        counts: String,
    },

    #[error("subject {subject} belongs to both {first} and {second}")]
    OverlappingGroups {
        subject: String,
        first: String,
        second: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_bucket_and_counts() {
        let err = AnalysisError::AggregateMismatch {
            day: NaiveDate::from_ymd_opt(2014, 8, 12).unwrap(),
            cycle: CycleLabel::Dark,
            counts: "2=3, 4=2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot align subjects for 2014-08-12 Dark: reading counts differ (2=3, 4=2)"
        );
    }

    #[test]
    fn window_message_is_actionable() {
        assert_eq!(
            AnalysisError::InvalidWindow(0).to_string(),
            "window size must be a positive integer, got 0"
        );
    }
}
