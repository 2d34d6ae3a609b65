use crate::cycles::{CycleLabel, ExperimentSeries};
use crate::error::{AnalysisError, Result};
use crate::normalize::SecondsOfDay;
use crate::stats;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reduction {
    Mean,
    PopulationStdev,
}

impl Reduction {
    pub const ALL: [Reduction; 2] = [Reduction::Mean, Reduction::PopulationStdev];

    fn reduce(self, values: &[f64]) -> Option<f64> {
        match self {
            Reduction::Mean => stats::mean(values),
            Reduction::PopulationStdev => stats::population_stdev(values),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Mean => write!(f, "mean"),
            Reduction::PopulationStdev => write!(f, "stdev"),
        }
    }
}

/// A (day, cycle) pair left out of aggregation, e.g. an incomplete final
/// cycle or the cycle in which treatment was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExcludedBucket {
    pub day: NaiveDate,
    pub cycle: CycleLabel,
}

/// Which buckets an aggregate walks, in order: every listed day, and within
/// each day every listed cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    pub days: Vec<NaiveDate>,
    pub cycles: Vec<CycleLabel>,
    pub excluded: Vec<ExcludedBucket>,
}

impl Selection {
    pub fn new(days: Vec<NaiveDate>, cycles: Vec<CycleLabel>) -> Self {
        Self {
            days,
            cycles,
            excluded: Vec::new(),
        }
    }

    pub fn excluding(mut self, excluded: &[ExcludedBucket]) -> Self {
        self.excluded.extend_from_slice(excluded);
        self
    }

    pub fn buckets(&self) -> impl Iterator<Item = (NaiveDate, CycleLabel)> + '_ {
        self.days.iter().flat_map(move |&day| {
            self.cycles
                .iter()
                .filter(move |&&cycle| !self.excluded.contains(&ExcludedBucket { day, cycle }))
                .map(move |&cycle| (day, cycle))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregatePoint {
    /// Running position across the selection, starting at 1.
    pub index: usize,
    /// `None` when every subject is missing a value at this position.
    pub value: Option<f64>,
    pub contributors: usize,
}

/// Lines subjects up position by position. Entry `k` of each returned row
/// holds the `k`-th reading of every subject for one bucket, missing values
/// included. Subjects must agree on the reading count of every selected
/// bucket; a subject without the bucket counts as zero readings.
pub fn align(
    series: &ExperimentSeries,
    selection: &Selection,
    subjects: &[String],
) -> Result<Vec<(usize, Vec<Option<f64>>)>> {
    let mut rows = Vec::new();
    let mut index = 0;

    for (day, cycle) in selection.buckets() {
        let buckets: Vec<_> = subjects
            .iter()
            .map(|s| series.bucket(day, s, cycle))
            .collect();
        let Some(first) = buckets.first() else {
            continue;
        };
        let len = first.len();

        if buckets.iter().any(|b| b.len() != len) {
            let counts = subjects
                .iter()
                .zip(&buckets)
                .map(|(s, b)| format!("{}={}", s, b.len()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AnalysisError::AggregateMismatch { day, cycle, counts });
        }

        for k in 0..len {
            index += 1;
            rows.push((index, buckets.iter().map(|b| b[k].value).collect()));
        }
    }

    debug!(
        "Aligned {} subjects into {} positions",
        subjects.len(),
        rows.len()
    );
    Ok(rows)
}

/// Cross-subject reduction at every aligned position.
pub fn aggregate(
    series: &ExperimentSeries,
    selection: &Selection,
    subjects: &[String],
    reduction: Reduction,
) -> Result<Vec<AggregatePoint>> {
    Ok(align(series, selection, subjects)?
        .into_iter()
        .map(|(index, values)| {
            let present: Vec<f64> = values.into_iter().flatten().collect();
            AggregatePoint {
                index,
                value: reduction.reduce(&present),
                contributors: present.len(),
            }
        })
        .collect())
}

/// Keeps every `step`-th point starting with the first; a step of 0 is
/// treated as 1.
pub fn every_nth<T: Clone>(points: &[T], step: usize) -> Vec<T> {
    points.iter().step_by(step.max(1)).cloned().collect()
}

/// Logical days either side of the treatment start.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreatmentWindows {
    /// Last `pre_days` days strictly before the start date.
    pub pre: Vec<NaiveDate>,
    /// Last `post_days` days on or after the start date.
    pub post: Vec<NaiveDate>,
}

pub fn treatment_windows(
    days: &[NaiveDate],
    start: NaiveDate,
    pre_days: usize,
    post_days: usize,
) -> TreatmentWindows {
    let (before, after): (Vec<NaiveDate>, Vec<NaiveDate>) =
        days.iter().copied().partition(|day| *day < start);
    TreatmentWindows {
        pre: last_n(before, pre_days),
        post: last_n(after, post_days),
    }
}

fn last_n(mut days: Vec<NaiveDate>, n: usize) -> Vec<NaiveDate> {
    days.sort();
    let skip = days.len().saturating_sub(n);
    days.split_off(skip)
}

/// Per logical day, the mean over every subject and cycle of the readings
/// taken at the same clock time, ordered by clock time.
pub fn daily_time_averages(
    series: &ExperimentSeries,
) -> BTreeMap<NaiveDate, Vec<(SecondsOfDay, f64)>> {
    let mut by_day: BTreeMap<NaiveDate, BTreeMap<SecondsOfDay, Vec<f64>>> = BTreeMap::new();
    for (day, _subject, _cycle, samples) in series.iter() {
        let times = by_day.entry(day).or_default();
        for sample in samples {
            if let Some(value) = sample.value {
                times.entry(sample.time).or_default().push(value);
            }
        }
    }

    by_day
        .into_iter()
        .map(|(day, times)| {
            let averages = times
                .into_iter()
                .filter_map(|(time, values)| stats::mean(&values).map(|m| (time, m)))
                .collect();
            (day, averages)
        })
        .collect()
}
