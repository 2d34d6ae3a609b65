use crate::aggregate::ExcludedBucket;
use crate::cycles::{CycleLabel, ExperimentSeries};
use crate::error::Result;
use crate::moving;
use crate::stats;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

pub const NO_DATA: &str = "no data";

/// Descriptive statistics of one bucket. An empty bucket is `NoData`, never
/// a zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum BucketSummary {
    Stats {
        n: usize,
        mean: f64,
        sem: f64,
        stdev: f64,
    },
    NoData,
}

impl BucketSummary {
    pub fn from_values(values: &[f64]) -> Self {
        match (
            stats::mean(values),
            stats::standard_error(values),
            stats::population_stdev(values),
        ) {
            (Some(mean), Some(sem), Some(stdev)) => BucketSummary::Stats {
                n: values.len(),
                mean,
                sem,
                stdev,
            },
            _ => BucketSummary::NoData,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        match self {
            BucketSummary::Stats { mean, .. } => Some(*mean),
            BucketSummary::NoData => None,
        }
    }
}

impl fmt::Display for BucketSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketSummary::Stats {
                mean, sem, stdev, ..
            } => write!(f, "Mean: {} STD error: {} STD dev: {}", mean, sem, stdev),
            BucketSummary::NoData => write!(f, "{}", NO_DATA),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub day: NaiveDate,
    pub subject: String,
    pub cycle: CycleLabel,
    pub summary: BucketSummary,
}

/// One row per (day, subject, cycle) over the full cross product, so buckets
/// without readings show up as `NoData`.
pub fn summarize(
    series: &ExperimentSeries,
    days: &[NaiveDate],
    subjects: &[String],
    cycles: &[CycleLabel],
) -> Vec<SummaryRow> {
    let mut rows = Vec::with_capacity(days.len() * subjects.len() * cycles.len());
    for &day in days {
        for subject in subjects {
            for &cycle in cycles {
                rows.push(SummaryRow {
                    day,
                    subject: subject.clone(),
                    cycle,
                    summary: BucketSummary::from_values(&series.values(day, subject, cycle)),
                });
            }
        }
    }
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingStdevMean {
    pub subject: String,
    pub cycle: CycleLabel,
    /// Days averaged for this cycle; excluded buckets are passed over.
    pub days: Vec<NaiveDate>,
    /// `None` when no finite moving-stdev value was available.
    pub mean: Option<f64>,
}

/// The last `count` of `days` whose `cycle` bucket is not excluded.
pub fn last_included_days(
    days: &[NaiveDate],
    cycle: CycleLabel,
    count: usize,
    excluded: &[ExcludedBucket],
) -> Vec<NaiveDate> {
    let mut picked: Vec<NaiveDate> = days
        .iter()
        .rev()
        .copied()
        .filter(|&day| !excluded.contains(&ExcludedBucket { day, cycle }))
        .take(count)
        .collect();
    picked.reverse();
    picked
}

/// Average moving standard deviation per subject and cycle over the last
/// `last_days` complete cycles of each label. Each day's bucket is windowed
/// on its own before the values are pooled; single-value windows (`NaN`)
/// are left out of the average.
pub fn moving_stdev_means(
    series: &ExperimentSeries,
    subjects: &[String],
    days: &[NaiveDate],
    last_days: usize,
    excluded: &[ExcludedBucket],
    window: usize,
) -> Result<Vec<MovingStdevMean>> {
    let mut out = Vec::new();
    for subject in subjects {
        for cycle in CycleLabel::ALL {
            let cycle_days = last_included_days(days, cycle, last_days, excluded);
            let mut pooled = Vec::new();
            for &day in &cycle_days {
                let values = series.values(day, subject, cycle);
                pooled.extend(
                    moving::moving_stdev(&values, window)?
                        .into_iter()
                        .filter(|v| v.is_finite()),
                );
            }
            out.push(MovingStdevMean {
                subject: subject.clone(),
                cycle,
                days: cycle_days,
                mean: stats::mean(&pooled),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::{reassign_days, CalendarRecording, LightCycle};
    use crate::normalize::{Reading, SecondsOfDay};

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 8, 10 + n).unwrap()
    }

    fn series_from(values: &[(u32, u32, f64)]) -> ExperimentSeries {
        let readings = values.iter().map(|&(d, hour, value)| Reading {
            subject: "2".to_string(),
            date: day(d),
            time: SecondsOfDay::from_hms(hour, 0, 0).unwrap(),
            value: Some(value),
        });
        let recording = CalendarRecording::from_readings(readings).unwrap();
        reassign_days(&recording, &LightCycle::default())
    }

    #[test]
    fn stats_use_population_stdev_and_sem() {
        let summary = BucketSummary::from_values(&[36.0, 37.0, 38.0, 39.0]);
        match summary {
            BucketSummary::Stats { n, mean, sem, stdev } => {
                assert_eq!(n, 4);
                assert_eq!(mean, 37.5);
                let expected_sd = 1.25f64.sqrt();
                assert!((stdev - expected_sd).abs() < 1e-12);
                assert!((sem - expected_sd / 2.0).abs() < 1e-12);
            }
            BucketSummary::NoData => panic!("expected stats"),
        }
    }

    #[test]
    fn empty_bucket_is_no_data_not_zero() {
        let summary = BucketSummary::from_values(&[]);
        assert_eq!(summary, BucketSummary::NoData);
        assert_eq!(summary.mean(), None);
        assert_eq!(summary.to_string(), "no data");
    }

    #[test]
    fn summarize_covers_the_full_cross_product() {
        let series = series_from(&[(1, 12, 36.5), (1, 13, 36.7)]);
        let rows = summarize(
            &series,
            &[day(1), day(2)],
            &["2".to_string()],
            &CycleLabel::ALL,
        );

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].cycle, CycleLabel::Light);
        assert!((rows[0].summary.mean().unwrap() - 36.6).abs() < 1e-12);
        assert_eq!(rows[1].summary, BucketSummary::NoData);
        assert_eq!(rows[2].summary, BucketSummary::NoData);
        assert_eq!(rows[3].summary, BucketSummary::NoData);
    }

    #[test]
    fn moving_stdev_means_pool_days_and_skip_nan() {
        let series = series_from(&[
            (1, 12, 1.0),
            (1, 13, 3.0),
            (2, 12, 5.0),
            (2, 13, 5.0),
            (2, 20, 9.0),
        ]);
        let means =
            moving_stdev_means(&series, &["2".to_string()], &[day(1), day(2)], 2, &[], 3).unwrap();

        let light = &means[0];
        assert_eq!(light.cycle, CycleLabel::Light);
        // day 1 windows: [1, 3] twice -> sqrt(2); day 2 windows: [5, 5] -> 0
        let expected = (2f64.sqrt() * 2.0) / 4.0;
        assert!((light.mean.unwrap() - expected).abs() < 1e-12);

        // day 2 Dark holds one reading whose window is NaN, day 1 Dark is empty
        let dark = &means[1];
        assert_eq!(dark.cycle, CycleLabel::Dark);
        assert_eq!(dark.mean, None);
    }

    #[test]
    fn moving_stdev_means_skip_excluded_final_cycle() {
        let series = series_from(&[
            (1, 12, 1.0),
            (1, 13, 3.0),
            (2, 12, 5.0),
            (2, 13, 7.0),
            (2, 20, 36.0),
            (2, 21, 36.0),
            (3, 12, 2.0),
            (3, 13, 50.0),
            (3, 14, 2.0),
            (3, 20, 36.0),
            (3, 21, 38.0),
        ]);
        let days = [day(1), day(2), day(3)];
        let excluded = [ExcludedBucket {
            day: day(3),
            cycle: CycleLabel::Light,
        }];
        let means = moving_stdev_means(&series, &["2".to_string()], &days, 2, &excluded, 3).unwrap();

        let light = &means[0];
        assert_eq!(light.days, vec![day(1), day(2)]);
        // every window holds both readings of its day: sqrt(2) each
        assert!((light.mean.unwrap() - 2f64.sqrt()).abs() < 1e-12);

        let dark = &means[1];
        assert_eq!(dark.days, vec![day(2), day(3)]);
        // day 2 Dark is flat, day 3 Dark is [36, 38]
        let expected = (2.0 * 2f64.sqrt()) / 4.0;
        assert!((dark.mean.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn last_included_days_fall_back_past_exclusions() {
        let days = [day(1), day(2), day(3)];
        let excluded = [ExcludedBucket {
            day: day(3),
            cycle: CycleLabel::Light,
        }];
        assert_eq!(
            last_included_days(&days, CycleLabel::Light, 2, &excluded),
            vec![day(1), day(2)]
        );
        assert_eq!(
            last_included_days(&days, CycleLabel::Dark, 5, &excluded),
            days.to_vec()
        );
    }
}
