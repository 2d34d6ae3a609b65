use crate::error::{AnalysisError, Result};
use crate::normalize::{Reading, SecondsOfDay};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// The two phases of a logical day. Light sorts first because it starts the
/// logical day.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum CycleLabel {
    Light,
    Dark,
}

impl CycleLabel {
    pub const ALL: [CycleLabel; 2] = [CycleLabel::Light, CycleLabel::Dark];
}

impl fmt::Display for CycleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleLabel::Light => write!(f, "Light"),
            CycleLabel::Dark => write!(f, "Dark"),
        }
    }
}

impl FromStr for CycleLabel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.trim_end_matches(" cycle") {
            "light" => Ok(CycleLabel::Light),
            "dark" => Ok(CycleLabel::Dark),
            _ => Err(format!("Invalid cycle: {}. Use Light or Dark", s)),
        }
    }
}

/// Where a clock time falls relative to the light period.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    /// Before `start`, i.e. after midnight.
    EarlyMorning,
    Light,
    /// After `end`, before midnight.
    LateEvening,
}

/// Inclusive light-period bounds in seconds of day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightCycle {
    pub start: SecondsOfDay,
    pub end: SecondsOfDay,
}

impl Default for LightCycle {
    fn default() -> Self {
        Self {
            start: SecondsOfDay::saturating(6 * 3600),
            end: SecondsOfDay::saturating(18 * 3600 - 1),
        }
    }
}

impl LightCycle {
    pub fn new(start: SecondsOfDay, end: SecondsOfDay) -> Result<Self> {
        let cycle = Self { start, end };
        cycle.validate()?;
        Ok(cycle)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(AnalysisError::InvertedLightCycle {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        Ok(())
    }

    pub fn phase(&self, time: SecondsOfDay) -> Phase {
        if time < self.start {
            Phase::EarlyMorning
        } else if time > self.end {
            Phase::LateEvening
        } else {
            Phase::Light
        }
    }

    pub fn classify(&self, time: SecondsOfDay) -> CycleLabel {
        match self.phase(time) {
            Phase::Light => CycleLabel::Light,
            Phase::EarlyMorning | Phase::LateEvening => CycleLabel::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: SecondsOfDay,
    pub value: Option<f64>,
}

/// Readings grouped by calendar day and subject, each list sorted by time.
#[derive(Debug, Default, Clone)]
pub struct CalendarRecording {
    days: BTreeMap<NaiveDate, BTreeMap<String, Vec<Sample>>>,
}

impl CalendarRecording {
    /// Groups readings by calendar day and subject. Two readings for one
    /// subject at the same time on the same day are an error.
    pub fn from_readings<I>(readings: I) -> Result<Self>
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut days: BTreeMap<NaiveDate, BTreeMap<String, Vec<Sample>>> = BTreeMap::new();
        for reading in readings {
            days.entry(reading.date)
                .or_default()
                .entry(reading.subject)
                .or_default()
                .push(Sample {
                    time: reading.time,
                    value: reading.value,
                });
        }

        for (date, subjects) in days.iter_mut() {
            for (subject, samples) in subjects.iter_mut() {
                samples.sort_by_key(|s| s.time);
                if let Some(pair) = samples.windows(2).find(|w| w[0].time == w[1].time) {
                    return Err(AnalysisError::DuplicateTimestamp {
                        subject: subject.clone(),
                        date: *date,
                        time: pair[0].time.to_string(),
                    });
                }
            }
        }

        Ok(Self { days })
    }

    pub fn days(&self) -> impl Iterator<Item = &NaiveDate> {
        self.days.keys()
    }

    pub fn samples(&self, date: NaiveDate, subject: &str) -> &[Sample] {
        self.days
            .get(&date)
            .and_then(|subjects| subjects.get(subject))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Day → subject → cycle table, stored flat under the composite key.
/// Built once by [`reassign_days`]; read-only afterwards.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExperimentSeries {
    buckets: BTreeMap<(NaiveDate, String, CycleLabel), Vec<Sample>>,
}

impl ExperimentSeries {
    fn push(&mut self, day: NaiveDate, subject: &str, cycle: CycleLabel, sample: Sample) {
        self.buckets
            .entry((day, subject.to_string(), cycle))
            .or_default()
            .push(sample);
    }

    fn prepend(&mut self, day: NaiveDate, subject: &str, cycle: CycleLabel, samples: Vec<Sample>) {
        let bucket = self
            .buckets
            .entry((day, subject.to_string(), cycle))
            .or_default();
        let already_placed = std::mem::replace(bucket, samples);
        bucket.extend(already_placed);
    }

    /// Logical days present, in chronological order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let days: BTreeSet<NaiveDate> = self.buckets.keys().map(|(d, _, _)| *d).collect();
        days.into_iter().collect()
    }

    pub fn subjects(&self) -> Vec<String> {
        let subjects: BTreeSet<&String> = self.buckets.keys().map(|(_, s, _)| s).collect();
        subjects.into_iter().cloned().collect()
    }

    /// All samples of a bucket, missing values included. Absent buckets are
    /// empty.
    pub fn bucket(&self, day: NaiveDate, subject: &str, cycle: CycleLabel) -> &[Sample] {
        self.buckets
            .get(&(day, subject.to_string(), cycle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Present values of a bucket in chronological order.
    pub fn values(&self, day: NaiveDate, subject: &str, cycle: CycleLabel) -> Vec<f64> {
        self.bucket(day, subject, cycle)
            .iter()
            .filter_map(|s| s.value)
            .collect()
    }

    pub fn times(&self, day: NaiveDate, subject: &str, cycle: CycleLabel) -> Vec<SecondsOfDay> {
        self.bucket(day, subject, cycle)
            .iter()
            .map(|s| s.time)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &str, CycleLabel, &[Sample])> {
        self.buckets
            .iter()
            .map(|((d, s, c), samples)| (*d, s.as_str(), *c, samples.as_slice()))
    }

    /// Copy without missing values; buckets left empty disappear.
    pub fn without_missing(&self) -> ExperimentSeries {
        let buckets = self
            .buckets
            .iter()
            .filter_map(|(key, samples)| {
                let kept: Vec<Sample> = samples
                    .iter()
                    .filter(|s| s.value.is_some())
                    .copied()
                    .collect();
                (!kept.is_empty()).then(|| (key.clone(), kept))
            })
            .collect();
        ExperimentSeries { buckets }
    }

    pub fn reading_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Moves each reading into its logical day and cycle.
///
/// A logical day's Dark bucket holds that evening's readings after the light
/// period, followed by the next calendar day's readings before the light
/// period starts. Post-midnight readings of the first calendar day stay on
/// that day since nothing precedes it; late-evening readings of the last day
/// are kept without a partner.
pub fn reassign_days(recording: &CalendarRecording, light: &LightCycle) -> ExperimentSeries {
    let mut series = ExperimentSeries::default();
    let mut previous: Option<NaiveDate> = None;

    for (&day, subjects) in &recording.days {
        if let Some(prev) = previous {
            let gap = (day - prev).num_days();
            if gap > 1 {
                warn!(
                    "{} day gap before {}; early readings join the Dark cycle of {}",
                    gap - 1,
                    day,
                    prev
                );
            }
        }
        let dark_target = previous.unwrap_or(day);

        for (subject, samples) in subjects {
            let mut late_evening = Vec::new();
            for sample in samples {
                match light.phase(sample.time) {
                    Phase::Light => series.push(day, subject, CycleLabel::Light, *sample),
                    Phase::LateEvening => late_evening.push(*sample),
                    Phase::EarlyMorning => {
                        series.push(dark_target, subject, CycleLabel::Dark, *sample)
                    }
                }
            }
            if !late_evening.is_empty() {
                series.prepend(day, subject, CycleLabel::Dark, late_evening);
            }
        }
        previous = Some(day);
    }

    debug!(
        "Reassigned {} readings into {} logical days",
        series.reading_count(),
        series.days().len()
    );
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 8, 10 + n).unwrap()
    }

    fn at(h: u32, m: u32) -> SecondsOfDay {
        SecondsOfDay::from_hms(h, m, 0).unwrap()
    }

    fn reading(subject: &str, d: u32, h: u32, m: u32, value: f64) -> Reading {
        Reading {
            subject: subject.to_string(),
            date: day(d),
            time: at(h, m),
            value: Some(value),
        }
    }

    fn six_to_six() -> LightCycle {
        LightCycle::new(at(6, 0), at(18, 0)).unwrap()
    }

    fn reassign(readings: Vec<Reading>) -> ExperimentSeries {
        let recording = CalendarRecording::from_readings(readings).unwrap();
        reassign_days(&recording, &six_to_six())
    }

    #[test]
    fn light_bounds_are_inclusive() {
        let light = six_to_six();
        assert_eq!(light.classify(at(6, 0)), CycleLabel::Light);
        assert_eq!(light.classify(at(18, 0)), CycleLabel::Light);
        assert_eq!(light.classify(SecondsOfDay::new(18 * 3600 + 1).unwrap()), CycleLabel::Dark);
        assert_eq!(light.classify(SecondsOfDay::new(6 * 3600 - 1).unwrap()), CycleLabel::Dark);
        assert_eq!(light.phase(at(2, 0)), Phase::EarlyMorning);
        assert_eq!(light.phase(at(23, 30)), Phase::LateEvening);
    }

    #[test]
    fn default_cycle_matches_six_to_six_second_resolution() {
        let light = LightCycle::default();
        assert_eq!(light.start.to_string(), "06:00:00");
        assert_eq!(light.end.to_string(), "17:59:59");
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(matches!(
            LightCycle::new(at(18, 0), at(6, 0)),
            Err(AnalysisError::InvertedLightCycle { .. })
        ));
    }

    #[test]
    fn cycle_labels_parse_from_legacy_names() {
        assert_eq!("Dark Cycle".parse::<CycleLabel>(), Ok(CycleLabel::Dark));
        assert_eq!("light".parse::<CycleLabel>(), Ok(CycleLabel::Light));
        assert!("dusk".parse::<CycleLabel>().is_err());
    }

    #[test]
    fn three_day_boundary_reassignment() {
        let series = reassign(vec![
            reading("1", 1, 2, 0, 1.0),
            reading("1", 1, 12, 0, 2.0),
            reading("1", 1, 23, 30, 3.0),
            reading("1", 2, 2, 0, 4.0),
            reading("1", 2, 12, 0, 5.0),
            reading("1", 2, 20, 0, 6.0),
            reading("1", 3, 3, 0, 7.0),
            reading("1", 3, 12, 0, 8.0),
            reading("1", 3, 22, 0, 9.0),
        ]);

        assert_eq!(series.values(day(1), "1", CycleLabel::Light), vec![2.0]);
        // own late evening first, then first-day early morning, then next
        // calendar day's early morning
        assert_eq!(
            series.values(day(1), "1", CycleLabel::Dark),
            vec![3.0, 1.0, 4.0]
        );
        assert_eq!(series.values(day(2), "1", CycleLabel::Light), vec![5.0]);
        assert_eq!(series.values(day(2), "1", CycleLabel::Dark), vec![6.0, 7.0]);
        assert_eq!(series.values(day(3), "1", CycleLabel::Light), vec![8.0]);
        // last day's late evening has no partner and is kept
        assert_eq!(series.values(day(3), "1", CycleLabel::Dark), vec![9.0]);
        assert_eq!(series.reading_count(), 9);
    }

    #[test]
    fn late_evening_precedes_next_day_early_morning() {
        let series = reassign(vec![
            reading("1", 1, 12, 0, 1.0),
            reading("1", 1, 19, 0, 2.0),
            reading("1", 1, 23, 30, 3.0),
            reading("1", 2, 0, 30, 4.0),
            reading("1", 2, 5, 59, 5.0),
        ]);
        assert_eq!(
            series.times(day(1), "1", CycleLabel::Dark),
            vec![at(19, 0), at(23, 30), at(0, 30), at(5, 59)]
        );
        assert!(series.bucket(day(2), "1", CycleLabel::Dark).is_empty());
        assert!(series.bucket(day(2), "1", CycleLabel::Light).is_empty());
    }

    #[test]
    fn first_day_only_early_readings_stay_on_first_day() {
        let series = reassign(vec![reading("1", 1, 2, 0, 36.5), reading("1", 1, 4, 0, 36.4)]);
        assert_eq!(series.days(), vec![day(1)]);
        assert_eq!(
            series.values(day(1), "1", CycleLabel::Dark),
            vec![36.5, 36.4]
        );
    }

    #[test]
    fn subject_absent_on_a_day_has_no_buckets_there() {
        let series = reassign(vec![
            reading("a", 1, 12, 0, 1.0),
            reading("b", 1, 12, 0, 1.5),
            reading("b", 2, 12, 0, 2.5),
            reading("a", 3, 3, 0, 3.0),
        ]);

        assert!(series.bucket(day(2), "a", CycleLabel::Light).is_empty());
        // predecessor is the previous calendar day of the dataset, even when
        // subject a recorded nothing on it
        assert_eq!(series.values(day(2), "a", CycleLabel::Dark), vec![3.0]);
        assert_eq!(series.values(day(2), "b", CycleLabel::Light), vec![2.5]);
        assert_eq!(series.subjects(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn calendar_gap_uses_previous_recorded_day() {
        let series = reassign(vec![
            reading("1", 1, 20, 0, 1.0),
            reading("1", 3, 1, 0, 2.0),
        ]);
        assert_eq!(series.values(day(1), "1", CycleLabel::Dark), vec![1.0, 2.0]);
        assert_eq!(series.days(), vec![day(1)]);
    }

    #[test]
    fn unsorted_input_is_ordered_and_duplicates_rejected() {
        let series = reassign(vec![
            reading("1", 1, 14, 0, 2.0),
            reading("1", 1, 9, 0, 1.0),
        ]);
        assert_eq!(series.values(day(1), "1", CycleLabel::Light), vec![1.0, 2.0]);

        let err = CalendarRecording::from_readings(vec![
            reading("1", 1, 9, 0, 1.0),
            reading("1", 1, 9, 0, 1.1),
        ])
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn missing_values_keep_positions_until_filtered() {
        let mut readings = vec![reading("1", 1, 12, 0, 1.0), reading("1", 1, 13, 0, 2.0)];
        readings[0].value = None;
        readings.push(Reading {
            value: None,
            ..reading("1", 1, 20, 0, 0.0)
        });
        let series = reassign(readings);

        assert_eq!(series.bucket(day(1), "1", CycleLabel::Light).len(), 2);
        assert_eq!(series.values(day(1), "1", CycleLabel::Light), vec![2.0]);

        let present = series.without_missing();
        assert_eq!(present.bucket(day(1), "1", CycleLabel::Light).len(), 1);
        assert!(present.bucket(day(1), "1", CycleLabel::Dark).is_empty());
        assert_eq!(present.reading_count(), 1);
    }
}
